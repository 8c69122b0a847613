//! Nogalim storefront library.
//!
//! - [`store`] - the cart store with session, persistent and remote tiers
//! - [`storage`] - storage backends for those tiers
//! - [`location`] - address detection for the checkout form
//! - [`checkout_details`] - saved shipping details
//! - [`checkout`] - client for the payment relay
//! - [`relay`] - the payment relay server (`nog-relay` binary)

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod checkout;
pub mod checkout_details;
pub mod config;
pub mod error;
pub mod location;
pub mod relay;
pub mod state;
pub mod storage;
pub mod store;

pub use checkout::{CheckoutClient, CheckoutError, CheckoutRequest, CheckoutSession};
pub use checkout_details::{CheckoutDetailsStore, SaveStatus};
pub use location::{
    AddressSource, Detection, GeocodeError, Geocoder, GeocodingClient, PositionError,
    detect_address,
};
pub use store::{CartIntent, CartRenderer, CartSnapshot, CartStore, IntentOutcome};
