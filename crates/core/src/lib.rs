//! Nogalim Core - Shared cart types.
//!
//! This crate provides the types used by every Nogalim component: the cart
//! model with its merge and totals rules, identifiers, prices, locations and
//! the storage key layout.
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no storage
//! access, no HTTP clients. Persistence and remote sync live in
//! `nogalim-storefront`.
//!
//! # Modules
//!
//! - [`types`] - Cart, items, totals, ids, prices and locations
//! - [`keys`] - Storage key names per identity

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod keys;
pub mod types;

pub use keys::StorageKeys;
pub use types::*;
