//! Identifier types.
//!
//! [`ItemId`] addresses a single cart line from the UI (increment, decrement,
//! remove). It is never used for identity when merging carts; that is the
//! item name. [`UserId`] is the opaque identifier handed out by the identity
//! provider.

use core::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Range of the random offset added to the timestamp when generating ids.
const RANDOM_OFFSET_RANGE: i64 = 1000;

/// Identifier of a cart line.
///
/// Generated from the current Unix timestamp in milliseconds plus a random
/// offset below 1000. Collisions are unlikely but not impossible, so callers
/// that need uniqueness within a cart must check (see [`crate::Cart::add`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(i64);

impl ItemId {
    /// Create an item ID from a raw value.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Generate a fresh item ID.
    #[must_use]
    pub fn generate() -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        let offset = rand::rng().random_range(0..RANDOM_OFFSET_RANGE);
        Self(now.saturating_add(offset))
    }

    /// Get the underlying i64 value.
    #[must_use]
    pub const fn as_i64(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ItemId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl From<ItemId> for i64 {
    fn from(id: ItemId) -> Self {
        id.0
    }
}

/// Errors that can occur when parsing a [`UserId`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum UserIdError {
    /// The input string is empty or only whitespace.
    #[error("user id cannot be empty")]
    Empty,
    /// The input string is too long.
    #[error("user id must be at most {max} characters")]
    TooLong {
        /// Maximum allowed length.
        max: usize,
    },
}

/// Identifier of a logged-in user, as issued by the identity provider.
///
/// The value is opaque to the storefront. It scopes storage keys and keys the
/// user's remote document.
///
/// ```
/// use nogalim_core::UserId;
///
/// assert!(UserId::parse("auth0|65f1c2").is_ok());
/// assert!(UserId::parse("").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Maximum length accepted for a user identifier.
    pub const MAX_LENGTH: usize = 256;

    /// Parse a `UserId` from a string.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is blank or longer than
    /// [`Self::MAX_LENGTH`].
    pub fn parse(s: &str) -> Result<Self, UserIdError> {
        if s.trim().is_empty() {
            return Err(UserIdError::Empty);
        }

        if s.len() > Self::MAX_LENGTH {
            return Err(UserIdError::TooLong {
                max: Self::MAX_LENGTH,
            });
        }

        Ok(Self(s.to_owned()))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for UserId {
    type Err = UserIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for UserId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_near_now() {
        let before = chrono::Utc::now().timestamp_millis();
        let id = ItemId::generate();
        let after = chrono::Utc::now().timestamp_millis();

        assert!(id.as_i64() >= before);
        assert!(id.as_i64() < after + RANDOM_OFFSET_RANGE);
    }

    #[test]
    fn test_item_id_serializes_as_number() {
        let json = serde_json::to_string(&ItemId::new(1_700_000_000_123)).unwrap();
        assert_eq!(json, "1700000000123");
    }

    #[test]
    fn test_user_id_parse() {
        assert_eq!(UserId::parse("abc").unwrap().as_str(), "abc");
        assert_eq!(UserId::parse("  "), Err(UserIdError::Empty));
        assert!(matches!(
            UserId::parse(&"x".repeat(300)),
            Err(UserIdError::TooLong { .. })
        ));
    }

    #[test]
    fn test_user_id_display() {
        let uid: UserId = "google-oauth2|42".parse().unwrap();
        assert_eq!(uid.to_string(), "google-oauth2|42");
    }
}
