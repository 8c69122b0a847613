//! Relay state shared across handlers.

use std::sync::Arc;

use url::Url;

use crate::config::RelayConfig;
use crate::relay::stripe::{StripeClient, StripeError};

/// Page buyers land on after paying.
pub const SUCCESS_PAGE: &str = "success.html";

/// Page buyers land on after abandoning payment.
pub const CANCEL_PAGE: &str = "cancel.html";

/// Error creating relay state.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("invalid return URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("payment client error: {0}")]
    Stripe(#[from] StripeError),
}

/// Application state shared across all handlers.
///
/// Cheaply cloneable via `Arc`.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: RelayConfig,
    stripe: StripeClient,
    success_url: Url,
    cancel_url: Url,
}

impl AppState {
    /// Create the relay state.
    ///
    /// # Errors
    ///
    /// Returns an error if the return URLs cannot be built from the base URL
    /// or the payment client fails to build.
    pub fn new(config: RelayConfig) -> Result<Self, StateError> {
        let stripe = StripeClient::new(&config.stripe)?;
        let success_url = config.page_url(SUCCESS_PAGE)?;
        let cancel_url = config.page_url(CANCEL_PAGE)?;

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                stripe,
                success_url,
                cancel_url,
            }),
        })
    }

    /// Get a reference to the relay configuration.
    #[must_use]
    pub fn config(&self) -> &RelayConfig {
        &self.inner.config
    }

    /// Get a reference to the payment client.
    #[must_use]
    pub fn stripe(&self) -> &StripeClient {
        &self.inner.stripe
    }

    /// Where buyers return after paying.
    #[must_use]
    pub fn success_url(&self) -> &Url {
        &self.inner.success_url
    }

    /// Where buyers return after cancelling.
    #[must_use]
    pub fn cancel_url(&self) -> &Url {
        &self.inner.cancel_url
    }
}
