//! Payment relay HTTP routes.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                   - Health check
//! POST /create-checkout-session  - Turn a cart into a checkout session
//! GET  /*                        - Static site files
//! ```

pub mod stripe;

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    routing::{get, post},
};
use tower_http::services::ServeDir;
use tracing::instrument;

use crate::checkout::{CheckoutRequest, CheckoutSession};
use crate::error::{AppError, Result, add_breadcrumb};
use crate::state::AppState;

/// Build the relay application: API routes with static files as fallback.
pub fn app(state: AppState) -> Router {
    let static_files = ServeDir::new(&state.config().static_dir);

    Router::new()
        .route("/health", get(health))
        .route("/create-checkout-session", post(create_checkout_session))
        .fallback_service(static_files)
        .with_state(state)
}

/// Liveness health check endpoint.
async fn health() -> &'static str {
    "ok"
}

/// Create a checkout session for the posted cart.
///
/// Prices are taken from the request as-is.
#[instrument(skip_all)]
async fn create_checkout_session(
    State(state): State<AppState>,
    payload: std::result::Result<Json<CheckoutRequest>, JsonRejection>,
) -> Result<Json<CheckoutSession>> {
    let Json(request) = payload?;

    if request.cart.is_empty() {
        return Err(AppError::BadRequest("Cart is empty".to_string()));
    }

    let line_items = stripe::build_line_items(&request.cart)?;
    add_breadcrumb(
        "checkout",
        "Creating checkout session",
        &[("lines", line_items.len().to_string())],
    );

    let session = state
        .stripe()
        .create_checkout_session(&line_items, state.success_url(), state.cancel_url())
        .await?;

    Ok(Json(CheckoutSession { id: session.id }))
}
