//! Address detection for the checkout form.
//!
//! A precise position from the device is reverse geocoded through
//! Nominatim. When no position is available, or reverse geocoding fails, the
//! approximate address of the caller's IP is used instead. Detection never
//! fails outright: the worst case is no address and a message asking for
//! manual input.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use nogalim_core::{CheckoutDetails, Location};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, instrument};
use url::Url;

use crate::config::GeocodingConfig;

/// Nominatim detail level: building.
const REVERSE_ZOOM: &str = "18";

/// Decimal places kept in reverse-geocoding cache keys (about a metre).
const CACHE_KEY_PRECISION: f64 = 100_000.0;

/// Errors that can occur while looking up an address.
#[derive(Debug, Error)]
pub enum GeocodeError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with an error status.
    #[error("Geocoding API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// The service answered without a usable address.
    #[error("No address returned")]
    NoAddress,

    /// A request URL could not be built.
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

/// Address lookups used by [`detect_address`].
pub trait Geocoder: Send + Sync {
    /// Address at a precise location.
    fn reverse(
        &self,
        location: Location,
    ) -> impl Future<Output = Result<String, GeocodeError>> + Send;

    /// Approximate address of the caller, from their IP.
    fn approximate(&self) -> impl Future<Output = Result<String, GeocodeError>> + Send;
}

// =============================================================================
// HTTP Client
// =============================================================================

/// Geocoder backed by Nominatim and ipapi.co.
///
/// Reverse lookups are cached for an hour, keyed by coordinates rounded to
/// five decimal places.
#[derive(Clone)]
pub struct GeocodingClient {
    inner: Arc<GeocodingClientInner>,
}

struct GeocodingClientInner {
    client: reqwest::Client,
    nominatim_base_url: String,
    ipapi_base_url: String,
    cache: Cache<(i64, i64), String>,
}

impl std::fmt::Debug for GeocodingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeocodingClient")
            .field("nominatim_base_url", &self.inner.nominatim_base_url)
            .field("ipapi_base_url", &self.inner.ipapi_base_url)
            .finish_non_exhaustive()
    }
}

impl GeocodingClient {
    /// Create a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(config: &GeocodingConfig) -> Result<Self, GeocodeError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.request_timeout)
            .build()?;

        let cache = Cache::builder()
            .max_capacity(1000)
            .time_to_live(Duration::from_secs(3600))
            .build();

        Ok(Self {
            inner: Arc::new(GeocodingClientInner {
                client,
                nominatim_base_url: config.nominatim_base_url.trim_end_matches('/').to_string(),
                ipapi_base_url: config.ipapi_base_url.trim_end_matches('/').to_string(),
                cache,
            }),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: Url) -> Result<T, GeocodeError> {
        let response = self.inner.client.get(url).send().await?;
        let status = response.status();

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(GeocodeError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json().await?)
    }
}

impl Geocoder for GeocodingClient {
    #[instrument(skip(self))]
    async fn reverse(&self, location: Location) -> Result<String, GeocodeError> {
        let key = cache_key(location);
        if let Some(address) = self.inner.cache.get(&key).await {
            debug!("Cache hit for reverse geocode");
            return Ok(address);
        }

        let lat = location.lat.to_string();
        let lon = location.lon.to_string();
        let url = Url::parse_with_params(
            &format!("{}/reverse", self.inner.nominatim_base_url),
            [
                ("format", "jsonv2"),
                ("lat", lat.as_str()),
                ("lon", lon.as_str()),
                ("zoom", REVERSE_ZOOM),
                ("addressdetails", "1"),
            ],
        )?;

        let body: NominatimReverse = self.get_json(url).await?;
        let address = body.into_address().ok_or(GeocodeError::NoAddress)?;

        self.inner.cache.insert(key, address.clone()).await;
        Ok(address)
    }

    #[instrument(skip(self))]
    async fn approximate(&self) -> Result<String, GeocodeError> {
        let url = Url::parse(&format!("{}/json/", self.inner.ipapi_base_url))?;
        let body: IpApiLocation = self.get_json(url).await?;
        body.into_address().ok_or(GeocodeError::NoAddress)
    }
}

#[allow(clippy::cast_possible_truncation)]
fn cache_key(location: Location) -> (i64, i64) {
    (
        (location.lat * CACHE_KEY_PRECISION).round() as i64,
        (location.lon * CACHE_KEY_PRECISION).round() as i64,
    )
}

/// Join the non-empty parts with `", "`, or `None` if all are empty.
fn join_parts<'a>(parts: impl IntoIterator<Item = Option<&'a str>>) -> Option<String> {
    let parts: Vec<&str> = parts
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(", "))
    }
}

/// Nominatim `/reverse` response.
#[derive(Debug, Deserialize)]
struct NominatimReverse {
    display_name: Option<String>,
    address: Option<NominatimAddress>,
}

#[derive(Debug, Default, Deserialize)]
struct NominatimAddress {
    road: Option<String>,
    house_number: Option<String>,
    suburb: Option<String>,
    city: Option<String>,
    state: Option<String>,
    country: Option<String>,
}

impl NominatimReverse {
    fn into_address(self) -> Option<String> {
        if let Some(name) = self.display_name.filter(|n| !n.trim().is_empty()) {
            return Some(name);
        }
        let a = self.address?;
        join_parts([
            a.road.as_deref(),
            a.house_number.as_deref(),
            a.suburb.as_deref(),
            a.city.as_deref(),
            a.state.as_deref(),
            a.country.as_deref(),
        ])
    }
}

/// ipapi.co `/json/` response.
#[derive(Debug, Deserialize)]
struct IpApiLocation {
    city: Option<String>,
    region: Option<String>,
    country_name: Option<String>,
}

impl IpApiLocation {
    fn into_address(self) -> Option<String> {
        join_parts([
            self.city.as_deref(),
            self.region.as_deref(),
            self.country_name.as_deref(),
        ])
    }
}

// =============================================================================
// Detection Flow
// =============================================================================

/// Why the device could not provide a precise position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionError {
    /// The device has no geolocation support.
    Unsupported,
    /// The user refused the permission prompt.
    PermissionDenied,
    /// No fix arrived in time.
    Timeout,
    /// Any other positioning failure.
    Unavailable,
}

impl PositionError {
    /// Message shown while falling back to the IP lookup.
    #[must_use]
    pub const fn advisory(self) -> &'static str {
        match self {
            Self::Unsupported => "Geolocation not supported, using IP fallback...",
            Self::PermissionDenied => "Permission denied, attempting IP-based fallback...",
            Self::Timeout => "Location timed out, trying IP fallback...",
            Self::Unavailable => "Unable to get precise location, using IP fallback...",
        }
    }
}

/// Where a detected address came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressSource {
    /// Reverse geocoded from a device position.
    Precise,
    /// Looked up from the caller's IP.
    Approximate,
}

/// Result of [`detect_address`].
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    /// The address to fill in, if one was found.
    pub address: Option<String>,
    /// The device position, kept even when reverse geocoding failed.
    pub location: Option<Location>,
    /// Where the address came from.
    pub source: Option<AddressSource>,
    /// Status lines in the order they were shown. The last one is current.
    pub messages: Vec<String>,
}

impl Detection {
    /// The current status line.
    #[must_use]
    pub fn message(&self) -> &str {
        self.messages.last().map_or("", String::as_str)
    }

    /// Status line to pass to [`crate::CheckoutDetailsStore::save`], or
    /// `None` if nothing was detected and nothing should be saved.
    #[must_use]
    pub const fn save_note(&self) -> Option<&'static str> {
        match self.source {
            Some(AddressSource::Precise) => Some("Location detected and saved."),
            Some(AddressSource::Approximate) => Some("Saved approximate address from IP."),
            None => None,
        }
    }

    /// Copy the detected address and position into checkout details.
    pub fn apply_to(&self, details: &mut CheckoutDetails) {
        if let Some(address) = &self.address {
            details.address.clone_from(address);
        }
        if self.location.is_some() {
            details.set_location(self.location);
        }
    }

    fn push(&mut self, message: &str) {
        self.messages.push(message.to_string());
    }
}

/// Find an address for the checkout form.
///
/// `position` is what the device reported. A valid position is reverse
/// geocoded; any positioning error, an out-of-range position or a failed
/// reverse lookup falls back to the IP lookup.
#[instrument(skip(geocoder))]
pub async fn detect_address<G: Geocoder>(
    geocoder: &G,
    position: Result<Location, PositionError>,
) -> Detection {
    let mut detection = Detection {
        address: None,
        location: None,
        source: None,
        messages: Vec::new(),
    };

    let location = match position {
        Ok(location) if location.is_valid() => location,
        Ok(location) => {
            tracing::warn!(lat = location.lat, lon = location.lon, "Ignoring out-of-range position");
            detection.push(PositionError::Unavailable.advisory());
            return ip_fallback(geocoder, detection).await;
        }
        Err(e) => {
            tracing::warn!(error = ?e, "Geolocation failed");
            detection.push(e.advisory());
            return ip_fallback(geocoder, detection).await;
        }
    };

    detection.location = Some(location);
    detection.push("Reverse-geocoding coordinates...");

    match geocoder.reverse(location).await {
        Ok(address) => {
            detection.address = Some(address);
            detection.source = Some(AddressSource::Precise);
            detection.push("Location detected and filled.");
            detection
        }
        Err(e) => {
            tracing::warn!(error = %e, "Reverse geocode failed, trying IP fallback");
            ip_fallback(geocoder, detection).await
        }
    }
}

async fn ip_fallback<G: Geocoder>(geocoder: &G, mut detection: Detection) -> Detection {
    detection.push("Using IP-based location fallback...");

    match geocoder.approximate().await {
        Ok(address) => {
            detection.address = Some(address);
            detection.source = Some(AddressSource::Approximate);
            detection.push("Filled approximate address from IP.");
        }
        Err(e) => {
            tracing::error!(error = %e, "IP fallback failed");
            detection.push("Could not determine location (try manual input).");
        }
    }
    detection
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[derive(Default)]
    struct FakeGeocoder {
        reverse: Option<String>,
        approximate: Option<String>,
        reverse_calls: AtomicUsize,
        approximate_calls: AtomicUsize,
    }

    impl Geocoder for FakeGeocoder {
        async fn reverse(&self, _location: Location) -> Result<String, GeocodeError> {
            self.reverse_calls.fetch_add(1, Ordering::SeqCst);
            self.reverse.clone().ok_or(GeocodeError::NoAddress)
        }

        async fn approximate(&self) -> Result<String, GeocodeError> {
            self.approximate_calls.fetch_add(1, Ordering::SeqCst);
            self.approximate.clone().ok_or(GeocodeError::NoAddress)
        }
    }

    const CAIRO: Location = Location::new(30.0444, 31.2357);

    #[tokio::test]
    async fn test_precise_position_is_reverse_geocoded() {
        let geocoder = FakeGeocoder {
            reverse: Some("Tahrir Square, Cairo".into()),
            approximate: Some("Cairo, Egypt".into()),
            ..FakeGeocoder::default()
        };

        let detection = detect_address(&geocoder, Ok(CAIRO)).await;
        assert_eq!(detection.address.as_deref(), Some("Tahrir Square, Cairo"));
        assert_eq!(detection.source, Some(AddressSource::Precise));
        assert_eq!(detection.location, Some(CAIRO));
        assert_eq!(detection.message(), "Location detected and filled.");
        assert_eq!(geocoder.approximate_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_reverse_failure_falls_back_to_ip_and_keeps_position() {
        let geocoder = FakeGeocoder {
            approximate: Some("Cairo, Cairo Governorate, Egypt".into()),
            ..FakeGeocoder::default()
        };

        let detection = detect_address(&geocoder, Ok(CAIRO)).await;
        assert_eq!(detection.source, Some(AddressSource::Approximate));
        assert_eq!(detection.location, Some(CAIRO));
        assert_eq!(detection.save_note(), Some("Saved approximate address from IP."));
    }

    #[tokio::test]
    async fn test_position_errors_use_ip_fallback() {
        for error in [
            PositionError::Unsupported,
            PositionError::PermissionDenied,
            PositionError::Timeout,
            PositionError::Unavailable,
        ] {
            let geocoder = FakeGeocoder {
                reverse: Some("unused".into()),
                approximate: Some("Giza, Egypt".into()),
                ..FakeGeocoder::default()
            };

            let detection = detect_address(&geocoder, Err(error)).await;
            assert_eq!(detection.address.as_deref(), Some("Giza, Egypt"));
            assert_eq!(detection.messages[0], error.advisory());
            assert!(detection.location.is_none());
            assert_eq!(geocoder.reverse_calls.load(Ordering::SeqCst), 0);
        }
    }

    #[tokio::test]
    async fn test_total_failure_is_advisory_only() {
        let geocoder = FakeGeocoder::default();
        let detection = detect_address(&geocoder, Err(PositionError::Timeout)).await;

        assert!(detection.address.is_none());
        assert!(detection.source.is_none());
        assert!(detection.save_note().is_none());
        assert_eq!(
            detection.message(),
            "Could not determine location (try manual input)."
        );
    }

    #[tokio::test]
    async fn test_out_of_range_position_is_not_geocoded() {
        let geocoder = FakeGeocoder {
            reverse: Some("unused".into()),
            approximate: Some("Alexandria, Egypt".into()),
            ..FakeGeocoder::default()
        };

        let detection = detect_address(&geocoder, Ok(Location::new(120.0, 0.0))).await;
        assert_eq!(detection.source, Some(AddressSource::Approximate));
        assert!(detection.location.is_none());
        assert_eq!(geocoder.reverse_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_apply_to_details() {
        let detection = Detection {
            address: Some("Zamalek".into()),
            location: Some(CAIRO),
            source: Some(AddressSource::Precise),
            messages: Vec::new(),
        };
        let mut details = CheckoutDetails {
            name: "Mona".into(),
            ..CheckoutDetails::default()
        };
        detection.apply_to(&mut details);

        assert_eq!(details.address, "Zamalek");
        assert_eq!(details.location(), Some(CAIRO));
        assert_eq!(details.name, "Mona");
    }

    #[test]
    fn test_nominatim_address_fallback() {
        let body: NominatimReverse = serde_json::from_str(
            r#"{"address":{"road":"Shagaret El Dor","house_number":"12","city":"Cairo","country":"Egypt"}}"#,
        )
        .unwrap();
        assert_eq!(
            body.into_address().as_deref(),
            Some("Shagaret El Dor, 12, Cairo, Egypt")
        );

        let body: NominatimReverse =
            serde_json::from_str(r#"{"display_name":"","address":{}}"#).unwrap();
        assert!(body.into_address().is_none());
    }

    #[test]
    fn test_ipapi_address() {
        let body: IpApiLocation =
            serde_json::from_str(r#"{"city":"Giza","region":"","country_name":"Egypt","ip":"x"}"#)
                .unwrap();
        assert_eq!(body.into_address().as_deref(), Some("Giza, Egypt"));
    }

    #[test]
    fn test_cache_key_rounding() {
        assert_eq!(
            cache_key(Location::new(30.044_441, 31.235_712)),
            cache_key(Location::new(30.044_439, 31.235_708))
        );
        assert_ne!(
            cache_key(Location::new(30.0444, 31.2357)),
            cache_key(Location::new(30.0445, 31.2357))
        );
    }
}
