//! Delivery location and saved checkout details.

use serde::{Deserialize, Serialize};

/// A geographic position in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// Latitude.
    pub lat: f64,
    /// Longitude.
    pub lon: f64,
}

impl Location {
    /// Create a location from latitude and longitude.
    #[must_use]
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Whether both coordinates are finite and within range.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }
}

/// Shipping details entered on the checkout form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutDetails {
    /// Recipient name.
    #[serde(default)]
    pub name: String,
    /// Contact phone number.
    #[serde(default)]
    pub phone: String,
    /// Free-form delivery address.
    #[serde(default)]
    pub address: String,
    /// Latitude of the last detected position.
    #[serde(default)]
    pub lat: Option<f64>,
    /// Longitude of the last detected position.
    #[serde(default)]
    pub lon: Option<f64>,
    /// Unix timestamp in milliseconds of the last save.
    #[serde(default)]
    pub saved_at: i64,
}

impl CheckoutDetails {
    /// The saved coordinates, if both are present.
    #[must_use]
    pub fn location(&self) -> Option<Location> {
        match (self.lat, self.lon) {
            (Some(lat), Some(lon)) => Some(Location::new(lat, lon)),
            _ => None,
        }
    }

    /// Replace the stored coordinates.
    pub fn set_location(&mut self, location: Option<Location>) {
        self.lat = location.map(|l| l.lat);
        self.lon = location.map(|l| l.lon);
    }
}
