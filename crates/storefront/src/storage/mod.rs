//! Storage tiers used by the cart store.
//!
//! # Tiers
//!
//! - **Session** ([`KeyValueStorage`]) - lives as long as the browser session
//!   and isolates guest activity. Always written.
//! - **Persistent** ([`KeyValueStorage`]) - survives across sessions. Written
//!   only once the user is known.
//! - **Remote** ([`DocumentStore`]) - one document per user, shared across
//!   devices. Written only once the user is known.
//!
//! Every write replaces the stored value with a full snapshot.

mod file;
mod firestore;
mod memory;

use std::future::Future;

use nogalim_core::{Cart, Location, UserId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use file::JsonFileStorage;
pub use firestore::FirestoreStore;
pub use memory::{MemoryDocumentStore, MemoryStorage};

/// Errors raised by storage backends.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Reading or writing a local file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A value could not be encoded or decoded.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request to the remote store failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The remote store answered with an error status.
    #[error("Remote store error: {status} - {message}")]
    Remote { status: u16, message: String },

    /// The remote document has an unexpected shape.
    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    /// The backend refused the operation.
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// String-keyed, string-valued storage with the semantics of browser
/// `sessionStorage` / `localStorage`.
pub trait KeyValueStorage {
    /// Read a value. Missing keys return `None`.
    fn get_item(&self, key: &str) -> Option<String>;

    /// Write a value, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot persist the value.
    fn set_item(&mut self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Delete a value. Missing keys are not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot persist the removal.
    fn remove_item(&mut self, key: &str) -> Result<(), StorageError>;
}

/// The per-user document held by the remote store.
///
/// Used both as the result of a read and as a merge-write patch: on write,
/// only fields that are `Some` are replaced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserDocument {
    /// The user's saved cart.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cart: Option<Cart>,
    /// The user's last saved location.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

impl UserDocument {
    /// Document fields read and written by the cart store.
    pub const FIELDS: [&'static str; 2] = ["cart", "location"];

    /// A patch that replaces only the cart.
    #[must_use]
    pub const fn with_cart(cart: Cart) -> Self {
        Self {
            cart: Some(cart),
            location: None,
        }
    }

    /// A patch that replaces only the location.
    #[must_use]
    pub const fn with_location(location: Location) -> Self {
        Self {
            cart: None,
            location: Some(location),
        }
    }

    /// Names of the fields present in this document.
    #[must_use]
    pub fn field_names(&self) -> Vec<&'static str> {
        let mut fields = Vec::with_capacity(2);
        if self.cart.is_some() {
            fields.push("cart");
        }
        if self.location.is_some() {
            fields.push("location");
        }
        fields
    }
}

/// Remote document store keyed by user id.
///
/// Implementations must be cheap to clone: the cart store hands a clone to
/// each background write.
pub trait DocumentStore: Clone + Send + Sync + 'static {
    /// Read the user's document. `Ok(None)` means the document does not exist.
    fn fetch(
        &self,
        user: &UserId,
    ) -> impl Future<Output = Result<Option<UserDocument>, StorageError>> + Send;

    /// Merge the present fields of `patch` into the user's document, creating
    /// it if needed.
    fn merge_write(
        &self,
        user: &UserId,
        patch: UserDocument,
    ) -> impl Future<Output = Result<(), StorageError>> + Send;
}

/// A document store for deployments without remote sync.
///
/// Reads find nothing and writes are discarded.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRemote;

impl DocumentStore for NoRemote {
    async fn fetch(&self, _user: &UserId) -> Result<Option<UserDocument>, StorageError> {
        Ok(None)
    }

    async fn merge_write(&self, _user: &UserId, _patch: UserDocument) -> Result<(), StorageError> {
        Ok(())
    }
}
