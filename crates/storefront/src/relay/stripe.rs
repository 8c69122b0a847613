//! Stripe Checkout client.
//!
//! Creates hosted checkout sessions through the form-encoded REST API.
//! Amounts are sent in minor units (piastres for EGP).

use nogalim_core::{CartItem, CartTotals, FLAT_SHIPPING_FEE, Price};
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;
use tracing::instrument;
use url::Url;

use crate::config::StripeConfig;

/// Name of the line added for the flat shipping fee.
pub const SHIPPING_LINE_NAME: &str = "Shipping";

/// Errors that can occur when talking to Stripe.
#[derive(Debug, Error)]
pub enum StripeError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Stripe rejected the request.
    #[error("Stripe API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// A price does not fit in minor units.
    #[error("Invalid amount for {0}")]
    InvalidAmount(String),
}

/// One line of a checkout session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineItem {
    /// Product name shown on the payment page.
    pub name: String,
    /// Unit price in minor units.
    pub unit_amount: i64,
    /// Number of units.
    pub quantity: u32,
}

/// Build checkout lines for a cart, adding the shipping line when the
/// subtotal is positive.
///
/// # Errors
///
/// Returns [`StripeError::InvalidAmount`] if a price overflows minor units.
pub fn build_line_items(items: &[CartItem]) -> Result<Vec<LineItem>, StripeError> {
    let mut lines = items
        .iter()
        .map(|item| {
            let unit_amount = item
                .price
                .minor_units()
                .ok_or_else(|| StripeError::InvalidAmount(item.name.clone()))?;
            Ok(LineItem {
                name: item.name.clone(),
                unit_amount,
                quantity: item.quantity,
            })
        })
        .collect::<Result<Vec<_>, StripeError>>()?;

    if CartTotals::for_items(items).subtotal > Decimal::ZERO {
        let shipping = Price::from_units(FLAT_SHIPPING_FEE);
        lines.push(LineItem {
            name: SHIPPING_LINE_NAME.to_string(),
            unit_amount: shipping
                .minor_units()
                .ok_or_else(|| StripeError::InvalidAmount(SHIPPING_LINE_NAME.to_string()))?,
            quantity: 1,
        });
    }

    Ok(lines)
}

/// Session returned by Stripe.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeSession {
    pub id: String,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
    #[serde(default)]
    message: Option<String>,
}

/// Stripe API client.
#[derive(Clone)]
pub struct StripeClient {
    client: reqwest::Client,
    sessions_url: String,
    secret_key: SecretString,
    currency: String,
}

impl std::fmt::Debug for StripeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeClient")
            .field("sessions_url", &self.sessions_url)
            .field("secret_key", &"[REDACTED]")
            .field("currency", &self.currency)
            .finish_non_exhaustive()
    }
}

impl StripeClient {
    /// Create a new Stripe client.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(config: &StripeConfig) -> Result<Self, StripeError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            client,
            sessions_url: format!(
                "{}/v1/checkout/sessions",
                config.api_base.trim_end_matches('/')
            ),
            secret_key: config.secret_key.clone(),
            currency: config.currency.clone(),
        })
    }

    /// Create a one-off card payment session.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or Stripe rejects it.
    #[instrument(skip_all, fields(lines = line_items.len()))]
    pub async fn create_checkout_session(
        &self,
        line_items: &[LineItem],
        success_url: &Url,
        cancel_url: &Url,
    ) -> Result<StripeSession, StripeError> {
        let form = session_form(&self.currency, line_items, success_url, cancel_url);

        let response = self
            .client
            .post(&self.sessions_url)
            .bearer_auth(self.secret_key.expose_secret())
            .form(&form)
            .send()
            .await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<StripeErrorBody>(&body)
                .ok()
                .and_then(|b| b.error.message)
                .unwrap_or(body);
            return Err(StripeError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let session: StripeSession = response.json().await?;
        tracing::info!(session_id = %session.id, "Stripe checkout session created");
        Ok(session)
    }
}

/// Form fields for `POST /v1/checkout/sessions`.
fn session_form(
    currency: &str,
    line_items: &[LineItem],
    success_url: &Url,
    cancel_url: &Url,
) -> Vec<(String, String)> {
    let mut form = vec![
        ("mode".to_string(), "payment".to_string()),
        ("payment_method_types[0]".to_string(), "card".to_string()),
        ("success_url".to_string(), success_url.to_string()),
        ("cancel_url".to_string(), cancel_url.to_string()),
    ];

    for (i, line) in line_items.iter().enumerate() {
        let prefix = format!("line_items[{i}]");
        form.extend([
            (
                format!("{prefix}[price_data][currency]"),
                currency.to_string(),
            ),
            (
                format!("{prefix}[price_data][product_data][name]"),
                line.name.clone(),
            ),
            (
                format!("{prefix}[price_data][unit_amount]"),
                line.unit_amount.to_string(),
            ),
            (format!("{prefix}[quantity]"), line.quantity.to_string()),
        ]);
    }

    form
}
