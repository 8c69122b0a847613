//! Integration tests for the Nogalim storefront.
//!
//! Each test runs the real clients against fake upstream services bound to
//! ephemeral local ports, so no network access or credentials are needed.
//!
//! # Fakes
//!
//! - [`FakeFirestore`] - document `GET` / `PATCH` with `updateMask`
//! - [`FakeStripe`] - `POST /v1/checkout/sessions`
//! - [`FakeGeocoder`] - Nominatim `/reverse` and ipapi `/json/`

#![allow(clippy::missing_panics_doc, clippy::expect_used)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use axum::{
    Json, Router,
    extract::{Form, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::{Map, Value, json};

/// Serve `router` on an ephemeral local port and return its address.
pub async fn spawn_server(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test listener");
    let addr = listener.local_addr().expect("Failed to read local address");

    tokio::spawn(async move {
        axum::serve(listener, router)
            .await
            .expect("Test server error");
    });

    addr
}

/// An address nothing is listening on.
pub async fn closed_addr() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test listener");
    listener.local_addr().expect("Failed to read local address")
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// =============================================================================
// Firestore
// =============================================================================

/// In-memory stand-in for the Firestore REST API.
///
/// Stores raw typed `fields` per document id and honours
/// `updateMask.fieldPaths` on `PATCH`.
#[derive(Clone, Default)]
pub struct FakeFirestore {
    documents: Arc<Mutex<HashMap<String, Map<String, Value>>>>,
    fail: Arc<AtomicBool>,
}

impl FakeFirestore {
    /// Create an empty fake.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start serving and return the REST base URL (`http://addr/v1`).
    pub async fn start(&self) -> String {
        let router = Router::new()
            .route(
                "/v1/projects/{project}/databases/{database}/documents/{collection}/{id}",
                get(firestore_get).patch(firestore_patch),
            )
            .with_state(self.clone());
        let addr = spawn_server(router).await;
        format!("http://{addr}/v1")
    }

    /// Raw typed fields of a document.
    #[must_use]
    pub fn fields(&self, id: &str) -> Option<Map<String, Value>> {
        lock(&self.documents).get(id).cloned()
    }

    /// Seed a document with raw typed fields.
    pub fn put_fields(&self, id: &str, fields: Map<String, Value>) {
        lock(&self.documents).insert(id.to_string(), fields);
    }

    /// Answer every request with `503`.
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

async fn firestore_get(
    State(fake): State<FakeFirestore>,
    Path((_project, _database, _collection, id)): Path<(String, String, String, String)>,
) -> Response {
    if fake.fail.load(Ordering::SeqCst) {
        return (StatusCode::SERVICE_UNAVAILABLE, "unavailable").into_response();
    }

    match fake.fields(&id) {
        Some(fields) => Json(json!({ "name": id, "fields": fields })).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": { "code": 404, "status": "NOT_FOUND" } })),
        )
            .into_response(),
    }
}

async fn firestore_patch(
    State(fake): State<FakeFirestore>,
    Path((_project, _database, _collection, id)): Path<(String, String, String, String)>,
    Query(params): Query<Vec<(String, String)>>,
    Json(body): Json<Value>,
) -> Response {
    if fake.fail.load(Ordering::SeqCst) {
        return (StatusCode::SERVICE_UNAVAILABLE, "unavailable").into_response();
    }

    let incoming = body
        .get("fields")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    let mask: Vec<String> = params
        .into_iter()
        .filter(|(k, _)| k == "updateMask.fieldPaths")
        .map(|(_, v)| v)
        .collect();

    let mut documents = lock(&fake.documents);
    let document = documents.entry(id.clone()).or_default();
    for path in &mask {
        match incoming.get(path) {
            Some(value) => {
                document.insert(path.clone(), value.clone());
            }
            None => {
                document.remove(path);
            }
        }
    }

    Json(json!({ "name": id, "fields": document.clone() })).into_response()
}

// =============================================================================
// Stripe
// =============================================================================

/// Stand-in for the Stripe Checkout Sessions endpoint.
#[derive(Clone, Default)]
pub struct FakeStripe {
    requests: Arc<Mutex<Vec<Vec<(String, String)>>>>,
    authorizations: Arc<Mutex<Vec<String>>>,
    decline: Arc<Mutex<Option<String>>>,
}

impl FakeStripe {
    /// Session id returned for every successful request.
    pub const SESSION_ID: &'static str = "cs_test_a1b2c3";

    /// Create a fake that accepts every request.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start serving and return the API base URL.
    pub async fn start(&self) -> String {
        let router = Router::new()
            .route("/v1/checkout/sessions", post(stripe_create_session))
            .with_state(self.clone());
        let addr = spawn_server(router).await;
        format!("http://{addr}")
    }

    /// Reject subsequent requests with the given message.
    pub fn decline_with(&self, message: &str) {
        *lock(&self.decline) = Some(message.to_string());
    }

    /// Form bodies received so far.
    #[must_use]
    pub fn requests(&self) -> Vec<Vec<(String, String)>> {
        lock(&self.requests).clone()
    }

    /// `Authorization` headers received so far.
    #[must_use]
    pub fn authorizations(&self) -> Vec<String> {
        lock(&self.authorizations).clone()
    }
}

/// Look up a form field by name.
#[must_use]
pub fn form_value<'a>(form: &'a [(String, String)], key: &str) -> Option<&'a str> {
    form.iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

async fn stripe_create_session(
    State(fake): State<FakeStripe>,
    headers: HeaderMap,
    Form(form): Form<Vec<(String, String)>>,
) -> Response {
    if let Some(auth) = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
    {
        lock(&fake.authorizations).push(auth.to_string());
    }
    lock(&fake.requests).push(form);

    if let Some(message) = lock(&fake.decline).clone() {
        return (
            StatusCode::PAYMENT_REQUIRED,
            Json(json!({ "error": { "type": "card_error", "message": message } })),
        )
            .into_response();
    }

    Json(json!({
        "id": FakeStripe::SESSION_ID,
        "object": "checkout.session",
        "url": "https://checkout.stripe.com/c/pay/cs_test_a1b2c3",
    }))
    .into_response()
}

// =============================================================================
// Geocoding
// =============================================================================

/// Stand-in for Nominatim and ipapi.co on one server.
#[derive(Clone, Default)]
pub struct FakeGeocoder {
    reverse_hits: Arc<AtomicUsize>,
    ip_hits: Arc<AtomicUsize>,
    reverse_down: Arc<AtomicBool>,
    last_reverse_query: Arc<Mutex<HashMap<String, String>>>,
}

impl FakeGeocoder {
    /// Address returned by `/reverse`.
    pub const DISPLAY_NAME: &'static str = "Tahrir Square, Qasr El Nil, Cairo, Egypt";

    /// Create a fake with both endpoints up.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start serving and return the base URL used for both services.
    pub async fn start(&self) -> String {
        let router = Router::new()
            .route("/reverse", get(geocoder_reverse))
            .route("/json/", get(geocoder_ip))
            .with_state(self.clone());
        let addr = spawn_server(router).await;
        format!("http://{addr}")
    }

    /// Make `/reverse` answer `500`.
    pub fn set_reverse_down(&self, down: bool) {
        self.reverse_down.store(down, Ordering::SeqCst);
    }

    /// Number of `/reverse` requests served.
    #[must_use]
    pub fn reverse_hits(&self) -> usize {
        self.reverse_hits.load(Ordering::SeqCst)
    }

    /// Number of `/json/` requests served.
    #[must_use]
    pub fn ip_hits(&self) -> usize {
        self.ip_hits.load(Ordering::SeqCst)
    }

    /// Query parameters of the last `/reverse` request.
    #[must_use]
    pub fn last_reverse_query(&self) -> HashMap<String, String> {
        lock(&self.last_reverse_query).clone()
    }
}

async fn geocoder_reverse(
    State(fake): State<FakeGeocoder>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    fake.reverse_hits.fetch_add(1, Ordering::SeqCst);
    *lock(&fake.last_reverse_query) = query;

    if fake.reverse_down.load(Ordering::SeqCst) {
        return (StatusCode::INTERNAL_SERVER_ERROR, "overloaded").into_response();
    }

    Json(json!({
        "place_id": 1,
        "display_name": FakeGeocoder::DISPLAY_NAME,
        "address": { "city": "Cairo", "country": "Egypt" },
    }))
    .into_response()
}

async fn geocoder_ip(State(fake): State<FakeGeocoder>) -> Json<Value> {
    fake.ip_hits.fetch_add(1, Ordering::SeqCst);
    Json(json!({
        "ip": "197.0.0.1",
        "city": "Giza",
        "region": "Giza Governorate",
        "country_name": "Egypt",
    }))
}
