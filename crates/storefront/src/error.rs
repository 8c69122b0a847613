//! Relay error handling with Sentry integration.
//!
//! Every relay handler returns `Result<T, AppError>`. Errors are rendered as
//! `{"error": "..."}` with a matching status code. Server-side failures are
//! captured to Sentry before responding.

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::relay::stripe::StripeError;

/// Application-level error type for the relay.
#[derive(Debug, Error)]
pub enum AppError {
    /// The payment provider call failed.
    #[error("Payment provider error: {0}")]
    Payment(#[from] StripeError),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let client_error = matches!(
            self,
            Self::BadRequest(_) | Self::Payment(StripeError::InvalidAmount(_))
        );

        if !client_error {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        let status = if client_error {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };

        // Only provider-authored messages are passed through.
        let message = match &self {
            Self::Payment(StripeError::Api { message, .. }) => message.clone(),
            Self::Payment(err @ StripeError::InvalidAmount(_)) => err.to_string(),
            Self::Payment(_) => "Payment provider unavailable".to_string(),
            Self::BadRequest(message) => message.clone(),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Add a breadcrumb for a relay action.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of actions
/// leading up to an error.
pub fn add_breadcrumb(category: &str, message: &str, data: &[(&str, String)]) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    for (key, value) in data {
        breadcrumb
            .data
            .insert((*key).to_string(), serde_json::Value::String(value.clone()));
    }

    sentry::add_breadcrumb(breadcrumb);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_error_display() {
        let err = AppError::BadRequest("Cart is empty".to_string());
        assert_eq!(err.to_string(), "Bad request: Cart is empty");

        let err = AppError::Payment(StripeError::Api {
            status: 402,
            message: "Your card was declined.".to_string(),
        });
        assert_eq!(
            err.to_string(),
            "Payment provider error: Stripe API error: 402 - Your card was declined."
        );
    }

    #[test]
    fn test_app_error_status_codes() {
        fn get_status(err: AppError) -> StatusCode {
            err.into_response().status()
        }

        assert_eq!(
            get_status(AppError::BadRequest("test".to_string())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            get_status(AppError::Payment(StripeError::InvalidAmount("x".into()))),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            get_status(AppError::Payment(StripeError::Api {
                status: 401,
                message: "Invalid API Key provided".into(),
            })),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
