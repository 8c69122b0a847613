//! Saved shipping details for the checkout form.

use chrono::Utc;
use nogalim_core::CheckoutDetails;
use nogalim_core::keys::CHECKOUT_DETAILS_KEY;

use crate::storage::KeyValueStorage;

/// Status line shown after a successful save with no caller-provided note.
pub const SAVED_MESSAGE: &str = "Saved shipping details locally.";

/// Status line shown when the details could not be written.
pub const SAVE_FAILED_MESSAGE: &str = "Failed to save details.";

/// Status line shown after details were restored.
pub const LOADED_MESSAGE: &str = "Loaded saved shipping details.";

/// Outcome of [`CheckoutDetailsStore::save`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveStatus {
    /// Written; carries the status line to show.
    Saved(String),
    /// Not written; carries the status line to show.
    Failed(String),
}

impl SaveStatus {
    /// The status line for the form.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Saved(message) | Self::Failed(message) => message,
        }
    }

    /// Whether the details were written.
    #[must_use]
    pub const fn is_saved(&self) -> bool {
        matches!(self, Self::Saved(_))
    }
}

/// Checkout form details kept in the persistent tier.
///
/// Details are not scoped to a user; the same device sees the same details
/// whether logged in or not.
#[derive(Debug, Clone)]
pub struct CheckoutDetailsStore<P> {
    storage: P,
}

impl<P: KeyValueStorage> CheckoutDetailsStore<P> {
    /// Wrap a persistent storage tier.
    pub const fn new(storage: P) -> Self {
        Self { storage }
    }

    /// The underlying storage.
    pub const fn storage(&self) -> &P {
        &self.storage
    }

    /// Read the saved details.
    ///
    /// Returns `None` if nothing is saved or the saved value is unreadable.
    pub fn load(&self) -> Option<CheckoutDetails> {
        let raw = self.storage.get_item(CHECKOUT_DETAILS_KEY)?;
        serde_json::from_str::<Option<CheckoutDetails>>(&raw)
            .inspect_err(|e| tracing::error!(error = %e, "Failed to read checkout details"))
            .ok()
            .flatten()
    }

    /// Save the details, trimming text fields and stamping `saved_at`.
    ///
    /// `note` replaces the default status line on success. Failures are
    /// logged and reported through the returned status.
    pub fn save(&mut self, details: &CheckoutDetails, note: Option<&str>) -> SaveStatus {
        let record = CheckoutDetails {
            name: details.name.trim().to_string(),
            phone: details.phone.trim().to_string(),
            address: details.address.trim().to_string(),
            lat: details.lat,
            lon: details.lon,
            saved_at: Utc::now().timestamp_millis(),
        };

        let written = serde_json::to_string(&record)
            .map_err(crate::storage::StorageError::from)
            .and_then(|raw| self.storage.set_item(CHECKOUT_DETAILS_KEY, &raw));

        match written {
            Ok(()) => SaveStatus::Saved(note.unwrap_or(SAVED_MESSAGE).to_string()),
            Err(e) => {
                tracing::error!(error = %e, "Failed to save checkout details");
                SaveStatus::Failed(SAVE_FAILED_MESSAGE.to_string())
            }
        }
    }
}
