//! The cart store.
//!
//! [`CartStore`] owns the cart and the current identity. Every mutation is
//! written through to the storage tiers and then pushed to subscribed
//! renderers as a [`CartSnapshot`].
//!
//! # Persistence
//!
//! - The session tier is always written.
//! - Once a user is logged in, the persistent tier and the remote document
//!   are written too.
//! - Remote writes run in the background on the tokio runtime. Their failures
//!   are logged and never roll back local state. There is no ordering between
//!   overlapping remote writes.
//!
//! # Identity
//!
//! [`CartStore::on_login`] merges the guest cart into the user's saved cart.
//! [`CartStore::on_logout`] forgets the in-memory cart and the session keys of
//! the user who left, keeping their persistent and remote copies for the next
//! login.

use nogalim_core::{
    Cart, CartItem, CartTotals, ItemId, Location, Price, QuantityChange, StorageKeys, UserId,
    merge_carts,
};
use tokio::task::JoinSet;
use tracing::instrument;

use crate::checkout::CheckoutRequest;
use crate::storage::{DocumentStore, KeyValueStorage, UserDocument};

/// What a renderer receives after every change.
#[derive(Debug, Clone, Copy)]
pub struct CartSnapshot<'a> {
    /// Items in display order.
    pub items: &'a [CartItem],
    /// Subtotal, shipping and total.
    pub totals: CartTotals,
    /// Sum of quantities, shown on the cart badge.
    pub item_count: u64,
    /// The logged-in user, if any.
    pub user: Option<&'a UserId>,
}

/// A view that draws cart snapshots.
pub trait CartRenderer {
    /// Draw the given snapshot.
    fn render(&mut self, snapshot: &CartSnapshot<'_>);
}

impl<F> CartRenderer for F
where
    F: FnMut(&CartSnapshot<'_>),
{
    fn render(&mut self, snapshot: &CartSnapshot<'_>) {
        self(snapshot);
    }
}

/// User intents emitted by the cart view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CartIntent {
    /// Add one unit to a line.
    Increment(ItemId),
    /// Remove one unit from a line.
    Decrement(ItemId),
    /// Drop a line.
    Remove(ItemId),
    /// Empty the cart.
    Clear,
    /// Start checkout with the current cart.
    Checkout,
}

/// Result of applying a [`CartIntent`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntentOutcome {
    /// The cart changed and was persisted.
    Updated,
    /// Nothing changed.
    Unchanged,
    /// Checkout was requested; send this to the payment relay.
    Checkout(CheckoutRequest),
}

impl From<bool> for IntentOutcome {
    fn from(changed: bool) -> Self {
        if changed { Self::Updated } else { Self::Unchanged }
    }
}

/// Cart state with its storage tiers.
///
/// `S` is the session tier, `P` the persistent tier and `D` the remote
/// document store (use [`crate::storage::NoRemote`] to disable remote sync).
pub struct CartStore<S, P, D> {
    cart: Cart,
    user: Option<UserId>,
    location: Option<Location>,
    session: S,
    persistent: P,
    remote: D,
    renderers: Vec<Box<dyn CartRenderer + Send>>,
    pending: JoinSet<()>,
}

impl<S, P, D> std::fmt::Debug for CartStore<S, P, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CartStore")
            .field("cart", &self.cart)
            .field("user", &self.user)
            .field("location", &self.location)
            .field("renderers", &self.renderers.len())
            .field("pending_syncs", &self.pending.len())
            .finish_non_exhaustive()
    }
}

impl<S, P, D> CartStore<S, P, D>
where
    S: KeyValueStorage,
    P: KeyValueStorage,
    D: DocumentStore,
{
    /// Create a store for a guest with an empty cart.
    ///
    /// Call [`Self::load`] to pick up a cart saved earlier in the session.
    pub fn new(session: S, persistent: P, remote: D) -> Self {
        Self {
            cart: Cart::new(),
            user: None,
            location: None,
            session,
            persistent,
            remote,
            renderers: Vec::new(),
            pending: JoinSet::new(),
        }
    }

    /// The current cart.
    #[must_use]
    pub const fn cart(&self) -> &Cart {
        &self.cart
    }

    /// The logged-in user, or `None` for a guest.
    #[must_use]
    pub const fn user(&self) -> Option<&UserId> {
        self.user.as_ref()
    }

    /// The last saved location.
    #[must_use]
    pub const fn location(&self) -> Option<Location> {
        self.location
    }

    /// The session tier.
    #[must_use]
    pub const fn session_storage(&self) -> &S {
        &self.session
    }

    /// The persistent tier.
    #[must_use]
    pub const fn persistent_storage(&self) -> &P {
        &self.persistent
    }

    /// The remote document store.
    #[must_use]
    pub const fn remote(&self) -> &D {
        &self.remote
    }

    /// Storage keys for the current identity.
    #[must_use]
    pub fn keys(&self) -> StorageKeys {
        StorageKeys::for_user(self.user.as_ref())
    }

    /// A snapshot of the cart with freshly computed totals.
    #[must_use]
    pub fn snapshot(&self) -> CartSnapshot<'_> {
        CartSnapshot {
            items: self.cart.items(),
            totals: self.cart.totals(),
            item_count: self.cart.item_count(),
            user: self.user.as_ref(),
        }
    }

    /// Register a renderer. It is drawn immediately with the current cart.
    pub fn subscribe(&mut self, renderer: impl CartRenderer + Send + 'static) {
        let mut renderer: Box<dyn CartRenderer + Send> = Box::new(renderer);
        renderer.render(&self.snapshot());
        self.renderers.push(renderer);
    }

    // -------------------------------------------------------------------------
    // Cart mutations
    // -------------------------------------------------------------------------

    /// Replace the in-memory cart with the one saved in the session tier.
    ///
    /// Missing or unreadable data yields an empty cart.
    pub fn load(&mut self) {
        let key = self.keys().session_cart;
        self.cart = read_cart(&self.session, &key);
        self.notify();
    }

    /// Add one unit of a product and return the id of its line.
    pub fn add(&mut self, name: impl Into<String>, price: Price, image: Option<String>) -> ItemId {
        let id = self.cart.add(name, price, image);
        self.commit();
        id
    }

    /// Change a line's quantity by one unit. Returns `true` if it changed.
    pub fn set_quantity(&mut self, id: ItemId, change: QuantityChange) -> bool {
        let changed = self.cart.set_quantity(id, change);
        if changed {
            self.commit();
        }
        changed
    }

    /// Remove a line. Returns `true` if a line was removed.
    pub fn remove(&mut self, id: ItemId) -> bool {
        let removed = self.cart.remove(id);
        if removed {
            self.commit();
        }
        removed
    }

    /// Empty the cart.
    pub fn clear(&mut self) {
        self.cart.clear();
        self.commit();
    }

    /// Apply an intent from the cart view.
    pub fn apply(&mut self, intent: CartIntent) -> IntentOutcome {
        match intent {
            CartIntent::Increment(id) => self.set_quantity(id, QuantityChange::Increment).into(),
            CartIntent::Decrement(id) => self.set_quantity(id, QuantityChange::Decrement).into(),
            CartIntent::Remove(id) => self.remove(id).into(),
            CartIntent::Clear => {
                self.clear();
                IntentOutcome::Updated
            }
            CartIntent::Checkout => IntentOutcome::Checkout(CheckoutRequest::from(&self.cart)),
        }
    }

    /// Write the cart to every tier that applies to the current identity.
    pub fn persist(&mut self) {
        let payload = match serde_json::to_string(&self.cart) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize cart");
                return;
            }
        };

        let keys = self.keys();
        if let Err(e) = self.session.set_item(&keys.session_cart, &payload) {
            tracing::warn!(key = %keys.session_cart, error = %e, "Failed to write session cart");
        }

        let Some(user) = self.user.clone() else {
            return;
        };

        if let Err(e) = self.persistent.set_item(&keys.persistent_cart, &payload) {
            tracing::warn!(key = %keys.persistent_cart, error = %e, "Failed to write persistent cart");
        }
        self.spawn_remote_write(user, UserDocument::with_cart(self.cart.clone()));
    }

    // -------------------------------------------------------------------------
    // Identity
    // -------------------------------------------------------------------------

    /// Switch to a logged-in user, merging the guest cart into their saved one.
    ///
    /// The saved cart comes from the remote store; a missing document counts
    /// as an empty cart. If the remote read fails, the guest cart is kept on
    /// its own so local progress is never lost.
    ///
    /// The cart merged in is the one under the current session key. Calling
    /// this while another user is logged in, without [`Self::on_logout`] in
    /// between, therefore carries that user's session cart over to `user`.
    #[instrument(skip_all, fields(user = %user))]
    pub async fn on_login(&mut self, user: UserId) {
        let guest_key = self.keys().session_cart;
        let guest_cart = read_cart(&self.session, &guest_key);
        self.user = Some(user.clone());

        self.cart = match self.remote.fetch(&user).await {
            Ok(document) => {
                let saved = document.and_then(|d| d.cart).unwrap_or_default();
                let merged = merge_carts(&normalize(&saved), &guest_cart);
                tracing::info!(
                    saved_lines = saved.len(),
                    guest_lines = guest_cart.len(),
                    merged_lines = merged.len(),
                    "Merged guest cart into saved cart"
                );
                merged
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to load saved cart, keeping guest cart");
                guest_cart
            }
        };

        self.commit();
    }

    /// Return to guest mode.
    ///
    /// Clears the in-memory cart and location and removes the session keys of
    /// the user who logged out. Persistent and remote copies are kept.
    pub fn on_logout(&mut self) {
        let keys = self.keys();
        self.cart.clear();
        self.location = None;

        for key in [&keys.session_cart, &keys.session_location] {
            if let Err(e) = self.session.remove_item(key) {
                tracing::warn!(key = %key, error = %e, "Failed to remove session key");
            }
        }

        if let Some(user) = self.user.take() {
            tracing::info!(user = %user, "Logged out");
        }
        self.notify();
    }

    // -------------------------------------------------------------------------
    // Location
    // -------------------------------------------------------------------------

    /// Save the latest location, replacing any previous one.
    pub fn save_location(&mut self, location: Location) {
        self.location = Some(location);

        let payload = match serde_json::to_string(&location) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize location");
                return;
            }
        };

        let keys = self.keys();
        if let Err(e) = self.session.set_item(&keys.session_location, &payload) {
            tracing::warn!(key = %keys.session_location, error = %e, "Failed to write session location");
        }

        let Some(user) = self.user.clone() else {
            return;
        };

        if let Err(e) = self
            .persistent
            .set_item(&keys.persistent_location, &payload)
        {
            tracing::warn!(key = %keys.persistent_location, error = %e, "Failed to write persistent location");
        }
        self.spawn_remote_write(user, UserDocument::with_location(location));
    }

    /// Restore the location saved in the session tier, if any.
    pub fn load_location(&mut self) -> Option<Location> {
        let key = self.keys().session_location;
        self.location = self.session.get_item(&key).and_then(|raw| {
            serde_json::from_str::<Location>(&raw)
                .inspect_err(|e| tracing::warn!(key = %key, error = %e, "Ignoring unreadable location"))
                .ok()
        });
        self.location
    }

    // -------------------------------------------------------------------------
    // Remote sync
    // -------------------------------------------------------------------------

    /// Wait for every background remote write started so far.
    pub async fn flush_remote(&mut self) {
        while let Some(result) = self.pending.join_next().await {
            if let Err(e) = result {
                tracing::warn!(error = %e, "Remote sync task did not complete");
            }
        }
    }

    /// Number of remote writes that have not been reaped yet.
    #[must_use]
    pub fn pending_remote_writes(&self) -> usize {
        self.pending.len()
    }

    fn spawn_remote_write(&mut self, user: UserId, patch: UserDocument) {
        // Reap finished writes.
        while self.pending.try_join_next().is_some() {}

        if tokio::runtime::Handle::try_current().is_err() {
            tracing::warn!(user = %user, "No async runtime, skipping remote sync");
            return;
        }

        let remote = self.remote.clone();
        self.pending.spawn(async move {
            if let Err(e) = remote.merge_write(&user, patch).await {
                tracing::error!(user = %user, error = %e, "Remote sync failed");
            }
        });
    }

    fn commit(&mut self) {
        self.persist();
        self.notify();
    }

    fn notify(&mut self) {
        let snapshot = CartSnapshot {
            items: self.cart.items(),
            totals: self.cart.totals(),
            item_count: self.cart.item_count(),
            user: self.user.as_ref(),
        };
        for renderer in &mut self.renderers {
            renderer.render(&snapshot);
        }
    }
}

/// Read a cart from storage, falling back to an empty cart.
fn read_cart(storage: &impl KeyValueStorage, key: &str) -> Cart {
    let Some(raw) = storage.get_item(key) else {
        tracing::debug!(key = %key, "No stored cart");
        return Cart::new();
    };

    match serde_json::from_str::<Cart>(&raw) {
        Ok(cart) => normalize(&cart),
        Err(e) => {
            tracing::warn!(key = %key, error = %e, "Discarding unreadable stored cart");
            Cart::new()
        }
    }
}

/// Fold lines that share a name, in case a stored copy was written by an
/// older client.
fn normalize(cart: &Cart) -> Cart {
    merge_carts(&Cart::new(), cart)
}
