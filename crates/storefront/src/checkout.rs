//! Client for the payment relay.
//!
//! The relay turns a cart into a hosted checkout session and returns its id.
//! The caller then hands that id to the payment provider's redirect.

use std::time::Duration;

use nogalim_core::{Cart, CartItem};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::instrument;
use url::Url;

/// Path of the session-creation endpoint on the relay.
pub const CREATE_SESSION_PATH: &str = "create-checkout-session";

/// Errors that can occur when creating a checkout session.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The relay answered with an error.
    #[error("Relay error: {status} - {message}")]
    Relay { status: u16, message: String },

    /// The relay URL could not be built.
    #[error("Invalid relay URL: {0}")]
    Url(#[from] url::ParseError),
}

/// Body sent to the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutRequest {
    /// Cart lines, as stored.
    pub cart: Vec<CartItem>,
}

impl From<&Cart> for CheckoutRequest {
    fn from(cart: &Cart) -> Self {
        Self {
            cart: cart.items().to_vec(),
        }
    }
}

/// Successful relay response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSession {
    /// Provider session id, used for the redirect.
    pub id: String,
}

/// Error body returned by the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayErrorBody {
    pub error: String,
}

/// HTTP client for the payment relay.
#[derive(Debug, Clone)]
pub struct CheckoutClient {
    client: reqwest::Client,
    endpoint: Url,
}

impl CheckoutClient {
    /// Create a client for the relay at `relay_base`.
    ///
    /// # Errors
    ///
    /// Returns error if the endpoint URL cannot be built or the HTTP client
    /// fails to build.
    pub fn new(relay_base: &Url, timeout: Duration) -> Result<Self, CheckoutError> {
        let endpoint = with_trailing_slash(relay_base).join(CREATE_SESSION_PATH)?;
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, endpoint })
    }

    /// The URL sessions are requested from.
    #[must_use]
    pub const fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Ask the relay for a checkout session for `request`.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the relay answers with a
    /// non-success status. The relay's `{error}` message is surfaced when
    /// present.
    #[instrument(skip_all, fields(lines = request.cart.len()))]
    pub async fn create_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, CheckoutError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(request)
            .send()
            .await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<RelayErrorBody>(&body)
                .map(|b| b.error)
                .unwrap_or(body);
            tracing::error!(status = status.as_u16(), error = %message, "Checkout session request failed");
            return Err(CheckoutError::Relay {
                status: status.as_u16(),
                message,
            });
        }

        let session: CheckoutSession = response.json().await?;
        tracing::info!(session_id = %session.id, "Checkout session created");
        Ok(session)
    }
}

fn with_trailing_slash(url: &Url) -> Url {
    if url.path().ends_with('/') {
        return url.clone();
    }
    let mut url = url.clone();
    let path = format!("{}/", url.path());
    url.set_path(&path);
    url
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use nogalim_core::Price;

    use super::*;

    #[test]
    fn test_endpoint_joins_relay_path() {
        for base in [
            "http://localhost:4242",
            "http://localhost:4242/",
        ] {
            let client =
                CheckoutClient::new(&Url::parse(base).unwrap(), Duration::from_secs(5)).unwrap();
            assert_eq!(
                client.endpoint().as_str(),
                "http://localhost:4242/create-checkout-session"
            );
        }

        let nested = CheckoutClient::new(
            &Url::parse("https://shop.example/relay").unwrap(),
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(
            nested.endpoint().as_str(),
            "https://shop.example/relay/create-checkout-session"
        );
    }

    #[test]
    fn test_request_body_shape() {
        let mut cart = Cart::new();
        cart.add("Walnuts", Price::from_units(120), None);
        let body = serde_json::to_value(CheckoutRequest::from(&cart)).unwrap();

        let line = &body["cart"][0];
        assert_eq!(line["name"], "Walnuts");
        assert_eq!(line["price"], 120.0);
        assert_eq!(line["quantity"], 1);
    }
}
