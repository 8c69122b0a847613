//! Configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Payment relay (required)
//! - `RELAY_BASE_URL` - Public URL of the site, used for checkout return URLs
//! - `STRIPE_SECRET_KEY` - Payment provider secret key
//!
//! ## Payment relay (optional)
//! - `RELAY_HOST` - Bind address (default: 127.0.0.1)
//! - `PORT` - Listen port (default: 4242)
//! - `RELAY_STATIC_DIR` - Directory of static site files (default: .)
//! - `STRIPE_API_BASE` - Payment provider API base (default: <https://api.stripe.com>)
//! - `CHECKOUT_CURRENCY` - ISO 4217 currency code, lowercase (default: egp)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name
//! - `SENTRY_SAMPLE_RATE` - Error sample rate 0.0-1.0 (default: 1.0)
//! - `SENTRY_TRACES_SAMPLE_RATE` - Trace sample rate 0.0-1.0 (default: 0.0)
//!
//! ## Cart sync
//! - `FIRESTORE_PROJECT_ID` - Firestore project (remote sync disabled when unset)
//! - `FIRESTORE_API_KEY` - Web API key sent with document requests
//! - `FIRESTORE_BASE_URL` - REST base (default: <https://firestore.googleapis.com/v1>)
//!
//! ## Geocoding
//! - `NOMINATIM_BASE_URL` - Reverse geocoder (default: <https://nominatim.openstreetmap.org>)
//! - `IPAPI_BASE_URL` - IP location lookup (default: <https://ipapi.co>)
//! - `GEOCODER_USER_AGENT` - User agent sent to the geocoders

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;
use url::Url;

const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Default timeout for outbound HTTP calls.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Payment relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL of the site
    pub base_url: Url,
    /// Directory served as static files
    pub static_dir: PathBuf,
    /// Payment provider configuration
    pub stripe: StripeConfig,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
    /// Fraction of errors sent to Sentry
    pub sentry_sample_rate: f32,
    /// Fraction of transactions traced
    pub sentry_traces_sample_rate: f32,
}

/// Payment provider configuration.
///
/// Implements `Debug` manually to redact the secret key.
#[derive(Clone)]
pub struct StripeConfig {
    /// Secret API key (server-side only)
    pub secret_key: SecretString,
    /// API base URL
    pub api_base: String,
    /// Lowercase ISO 4217 currency code for line items
    pub currency: String,
    /// Timeout for provider calls
    pub request_timeout: Duration,
}

impl std::fmt::Debug for StripeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeConfig")
            .field("secret_key", &"[REDACTED]")
            .field("api_base", &self.api_base)
            .field("currency", &self.currency)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

/// Firestore remote store configuration.
///
/// Implements `Debug` manually to redact the API key.
#[derive(Clone)]
pub struct FirestoreConfig {
    /// Google Cloud project id
    pub project_id: String,
    /// Web API key, if the project requires one
    pub api_key: Option<SecretString>,
    /// REST API base URL
    pub base_url: String,
    /// Collection holding one document per user
    pub collection: String,
    /// Timeout for document requests
    pub request_timeout: Duration,
}

impl std::fmt::Debug for FirestoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FirestoreConfig")
            .field("project_id", &self.project_id)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("base_url", &self.base_url)
            .field("collection", &self.collection)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

/// Geocoding endpoints.
#[derive(Debug, Clone)]
pub struct GeocodingConfig {
    /// Nominatim base URL for reverse geocoding
    pub nominatim_base_url: String,
    /// ipapi base URL for approximate IP location
    pub ipapi_base_url: String,
    /// User agent sent with every request (Nominatim requires one)
    pub user_agent: String,
    /// Timeout for geocoding calls
    pub request_timeout: Duration,
}

impl Default for GeocodingConfig {
    fn default() -> Self {
        Self {
            nominatim_base_url: "https://nominatim.openstreetmap.org".to_string(),
            ipapi_base_url: "https://ipapi.co".to_string(),
            user_agent: concat!("nogalim-storefront/", env!("CARGO_PKG_VERSION")).to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl RelayConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if the payment provider key fails validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let host = get_env_or_default("RELAY_HOST", "127.0.0.1")
            .parse::<IpAddr>()
            .map_err(|e| ConfigError::InvalidEnvVar("RELAY_HOST".to_string(), e.to_string()))?;
        let port = get_env_or_default("PORT", "4242")
            .parse::<u16>()
            .map_err(|e| ConfigError::InvalidEnvVar("PORT".to_string(), e.to_string()))?;
        let base_url = parse_url("RELAY_BASE_URL", &get_required_env("RELAY_BASE_URL")?)?;
        let static_dir = PathBuf::from(get_env_or_default("RELAY_STATIC_DIR", "."));

        let stripe = StripeConfig::from_env()?;

        Ok(Self {
            host,
            port,
            base_url,
            static_dir,
            stripe,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
            sentry_sample_rate: get_rate("SENTRY_SAMPLE_RATE", 1.0)?,
            sentry_traces_sample_rate: get_rate("SENTRY_TRACES_SAMPLE_RATE", 0.0)?,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Absolute URL of a page on the public site.
    ///
    /// # Errors
    ///
    /// Returns an error if `path` cannot be joined onto the base URL.
    pub fn page_url(&self, path: &str) -> Result<Url, url::ParseError> {
        self.base_url.join(path)
    }
}

impl StripeConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            secret_key: get_validated_secret("STRIPE_SECRET_KEY")?,
            api_base: get_env_or_default("STRIPE_API_BASE", "https://api.stripe.com"),
            currency: get_env_or_default("CHECKOUT_CURRENCY", "egp").to_lowercase(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        })
    }
}

impl FirestoreConfig {
    /// Configuration for a project with default endpoints and no API key.
    #[must_use]
    pub fn for_project(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            api_key: None,
            base_url: "https://firestore.googleapis.com/v1".to_string(),
            collection: "users".to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Use an API key for document requests.
    #[must_use]
    pub fn with_api_key(mut self, api_key: SecretString) -> Self {
        self.api_key = Some(api_key);
        self
    }

    /// Point the client at a different REST base (emulator, tests).
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Load from environment variables.
    ///
    /// Returns `None` when `FIRESTORE_PROJECT_ID` is unset, meaning remote
    /// sync is disabled.
    #[must_use]
    pub fn from_env() -> Option<Self> {
        let _ = dotenvy::dotenv();

        let mut config = Self::for_project(get_optional_env("FIRESTORE_PROJECT_ID")?);
        config.api_key = get_optional_env("FIRESTORE_API_KEY").map(SecretString::from);
        if let Some(base_url) = get_optional_env("FIRESTORE_BASE_URL") {
            config.base_url = base_url;
        }
        Some(config)
    }
}

impl GeocodingConfig {
    /// Load from environment variables, falling back to public endpoints.
    #[must_use]
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();

        let defaults = Self::default();
        Self {
            nominatim_base_url: get_optional_env("NOMINATIM_BASE_URL")
                .unwrap_or(defaults.nominatim_base_url),
            ipapi_base_url: get_optional_env("IPAPI_BASE_URL").unwrap_or(defaults.ipapi_base_url),
            user_agent: get_optional_env("GEOCODER_USER_AGENT").unwrap_or(defaults.user_agent),
            request_timeout: defaults.request_timeout,
        }
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an optional environment variable. Empty values count as unset.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an absolute URL.
fn parse_url(key: &str, value: &str) -> Result<Url, ConfigError> {
    Url::parse(value).map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// Parse a sample rate between 0.0 and 1.0.
fn get_rate(key: &str, default: f32) -> Result<f32, ConfigError> {
    let Some(raw) = get_optional_env(key) else {
        return Ok(default);
    };
    let rate = raw
        .parse::<f32>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))?;
    if !(0.0..=1.0).contains(&rate) {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            format!("must be between 0.0 and 1.0 (got {rate})"),
        ));
    }
    Ok(rate)
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.len() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use the key issued by the provider."
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn relay_config() -> RelayConfig {
        RelayConfig {
            host: "127.0.0.1".parse().unwrap(),
            port: 4242,
            base_url: Url::parse("https://shop.nogalim.test").unwrap(),
            static_dir: PathBuf::from("."),
            stripe: StripeConfig {
                secret_key: SecretString::from("sk_test_51HqLyjWDarjtT1zdp7dc"),
                api_base: "https://api.stripe.com".to_string(),
                currency: "egp".to_string(),
                request_timeout: DEFAULT_REQUEST_TIMEOUT,
            },
            sentry_dsn: None,
            sentry_environment: None,
            sentry_sample_rate: 1.0,
            sentry_traces_sample_rate: 0.0,
        }
    }

    #[test]
    fn test_shannon_entropy_empty() {
        assert!((shannon_entropy("") - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_shannon_entropy_two_chars() {
        // "ab" has entropy of 1 bit per char (50% a, 50% b)
        let entropy = shannon_entropy("ab");
        assert!((entropy - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_validate_secret_strength_placeholder() {
        let result = validate_secret_strength("sk_test_your-key-here", "STRIPE_SECRET_KEY");
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn test_validate_secret_strength_low_entropy() {
        let result = validate_secret_strength("aaaaaaaaaaaaaaaaaaaaaaaa", "STRIPE_SECRET_KEY");
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn test_validate_secret_strength_provider_key() {
        let result =
            validate_secret_strength("sk_test_51HqLyjWDarjtT1zdp7dcXyZ0", "STRIPE_SECRET_KEY");
        assert!(result.is_ok());
    }

    #[test]
    fn test_socket_addr() {
        let addr = relay_config().socket_addr();
        assert_eq!(addr.ip().to_string(), "127.0.0.1");
        assert_eq!(addr.port(), 4242);
    }

    #[test]
    fn test_page_url() {
        let config = relay_config();
        assert_eq!(
            config.page_url("/success.html").unwrap().as_str(),
            "https://shop.nogalim.test/success.html"
        );
    }

    #[test]
    fn test_stripe_config_debug_redacts_secret() {
        let debug_output = format!("{:?}", relay_config().stripe);
        assert!(debug_output.contains("[REDACTED]"));
        assert!(debug_output.contains("egp"));
        assert!(!debug_output.contains("sk_test_51HqLyjWDarjtT1zdp7dc"));
    }

    #[test]
    fn test_firestore_config_debug_redacts_key() {
        let config = FirestoreConfig::for_project("nogalim-58121")
            .with_api_key(SecretString::from("AIzaSyExampleOnlyKey"));
        let debug_output = format!("{config:?}");
        assert!(debug_output.contains("nogalim-58121"));
        assert!(!debug_output.contains("AIzaSyExampleOnlyKey"));
    }
}
