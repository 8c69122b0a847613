//! Core types for the Nogalim storefront.
//!
//! This module provides the cart model and type-safe wrappers for ids,
//! prices and locations.

pub mod cart;
pub mod id;
pub mod location;
pub mod price;
pub mod totals;

pub use cart::{Cart, CartItem, QuantityChange, merge_carts};
pub use id::{ItemId, UserId, UserIdError};
pub use location::{CheckoutDetails, Location};
pub use price::{Price, PriceError};
pub use totals::{CartTotals, FLAT_SHIPPING_FEE, shipping_for};
