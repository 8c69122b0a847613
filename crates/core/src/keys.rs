//! Storage key layout.
//!
//! Every key is scoped to the current identity: the user id once logged in,
//! `guest` otherwise. Session keys hold data that must not outlive the browser
//! session; persistent keys survive across sessions once the user is known.

use crate::types::UserId;

/// Scope used when nobody is logged in.
pub const GUEST_SCOPE: &str = "guest";

/// Persistent key for the checkout form. Not scoped to an identity.
pub const CHECKOUT_DETAILS_KEY: &str = "nog_checkout_details_v1";

/// The storage keys for one identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageKeys {
    /// Session-scoped cart.
    pub session_cart: String,
    /// Persistent cart.
    pub persistent_cart: String,
    /// Session-scoped location.
    pub session_location: String,
    /// Persistent location.
    pub persistent_location: String,
}

impl StorageKeys {
    /// Keys for a user, or for a guest when `user` is `None`.
    ///
    /// A user whose id is literally `guest` shares the guest keys.
    #[must_use]
    pub fn for_user(user: Option<&UserId>) -> Self {
        let scope = user.map_or(GUEST_SCOPE, UserId::as_str);
        Self {
            session_cart: format!("nog_cart_session_{scope}"),
            persistent_cart: format!("nog_cart_v1_{scope}"),
            session_location: format!("nog_location_session_{scope}"),
            persistent_location: format!("nog_location_{scope}"),
        }
    }
}
