//! Cart state and the operations that mutate it.
//!
//! A [`Cart`] is an ordered list of [`CartItem`]s in the order they were first
//! added. Item names are the identity key: a cart never holds two items with
//! the same name. Item ids only address lines from the UI.

use serde::{Deserialize, Deserializer, Serialize};

use super::id::ItemId;
use super::price::Price;
use super::totals::CartTotals;

/// A single line in the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    /// UI address of the line.
    pub id: ItemId,
    /// Product name, unique within a cart.
    pub name: String,
    /// Unit price.
    pub price: Price,
    /// Number of units, always at least 1.
    #[serde(default = "default_quantity", deserialize_with = "positive_quantity")]
    pub quantity: u32,
    /// Product image URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl CartItem {
    /// Price of the whole line (`price * quantity`), saturating at
    /// `Decimal::MAX`.
    #[must_use]
    pub fn line_total(&self) -> rust_decimal::Decimal {
        self.price
            .amount()
            .saturating_mul(rust_decimal::Decimal::from(self.quantity))
    }
}

const fn default_quantity() -> u32 {
    1
}

/// Stored items with a zero quantity read as a single unit.
fn positive_quantity<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    let quantity = Option::<u32>::deserialize(deserializer)?;
    Ok(quantity.filter(|&q| q > 0).unwrap_or(1))
}

/// Direction of a quantity change requested from the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantityChange {
    /// Add one unit.
    Increment,
    /// Remove one unit, never going below one.
    Decrement,
}

/// An ordered shopping cart.
///
/// Serializes as a bare JSON array of items, which is the format written to
/// every storage tier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cart {
    items: Vec<CartItem>,
}

impl Cart {
    /// Create an empty cart.
    #[must_use]
    pub const fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Build a cart from existing items, keeping their order.
    #[must_use]
    pub const fn from_items(items: Vec<CartItem>) -> Self {
        Self { items }
    }

    /// The items in insertion order.
    #[must_use]
    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    /// Consume the cart and return its items.
    #[must_use]
    pub fn into_items(self) -> Vec<CartItem> {
        self.items
    }

    /// Number of distinct lines.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the cart has no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Total number of units across all lines.
    #[must_use]
    pub fn item_count(&self) -> u64 {
        self.items.iter().map(|i| u64::from(i.quantity)).sum()
    }

    /// Find a line by its id.
    #[must_use]
    pub fn get(&self, id: ItemId) -> Option<&CartItem> {
        self.items.iter().find(|i| i.id == id)
    }

    /// Find a line by product name.
    #[must_use]
    pub fn find_by_name(&self, name: &str) -> Option<&CartItem> {
        self.items.iter().find(|i| i.name == name)
    }

    /// Add one unit of a product.
    ///
    /// If a line with the same name exists its quantity goes up by one and its
    /// stored price is kept. Otherwise a new line with quantity 1 is appended.
    /// Returns the id of the affected line.
    pub fn add(&mut self, name: impl Into<String>, price: Price, image: Option<String>) -> ItemId {
        let name = name.into();
        if let Some(existing) = self.items.iter_mut().find(|i| i.name == name) {
            existing.quantity = existing.quantity.saturating_add(1);
            return existing.id;
        }

        let id = self.fresh_id();
        self.items.push(CartItem {
            id,
            name,
            price,
            quantity: 1,
            image,
        });
        id
    }

    /// Change the quantity of a line by one unit.
    ///
    /// Returns `true` if the cart changed. Unknown ids and decrements at
    /// quantity 1 leave the cart untouched.
    pub fn set_quantity(&mut self, id: ItemId, change: QuantityChange) -> bool {
        let Some(item) = self.items.iter_mut().find(|i| i.id == id) else {
            return false;
        };

        match change {
            QuantityChange::Increment => {
                item.quantity = item.quantity.saturating_add(1);
                true
            }
            QuantityChange::Decrement if item.quantity > 1 => {
                item.quantity -= 1;
                true
            }
            QuantityChange::Decrement => false,
        }
    }

    /// Remove a line. Returns `true` if a line was removed.
    pub fn remove(&mut self, id: ItemId) -> bool {
        let len_before = self.items.len();
        self.items.retain(|i| i.id != id);
        self.items.len() < len_before
    }

    /// Remove every line.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Subtotal, shipping and total for the current contents.
    #[must_use]
    pub fn totals(&self) -> CartTotals {
        CartTotals::for_items(&self.items)
    }

    fn contains_id(&self, id: ItemId) -> bool {
        self.items.iter().any(|i| i.id == id)
    }

    fn fresh_id(&self) -> ItemId {
        let mut id = ItemId::generate();
        while self.contains_id(id) {
            id = ItemId::generate();
        }
        id
    }
}

impl From<Vec<CartItem>> for Cart {
    fn from(items: Vec<CartItem>) -> Self {
        Self::from_items(items)
    }
}

/// Combine two carts additively.
///
/// The result starts as a copy of `base`. Each item of `incoming` is folded
/// into the line with the same name (quantities add up) or appended in its
/// original order. Nothing is dropped and names are the only identity key.
/// An appended item whose id is already taken in the result gets a fresh id.
#[must_use]
pub fn merge_carts(base: &Cart, incoming: &Cart) -> Cart {
    let mut merged = base.clone();
    for item in &incoming.items {
        if let Some(existing) = merged.items.iter_mut().find(|i| i.name == item.name) {
            existing.quantity = existing.quantity.saturating_add(item.quantity);
            continue;
        }

        let mut item = item.clone();
        if merged.contains_id(item.id) {
            item.id = merged.fresh_id();
        }
        merged.items.push(item);
    }
    merged
}
