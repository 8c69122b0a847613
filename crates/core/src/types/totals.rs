//! Derived cart totals.

use rust_decimal::Decimal;
use serde::Serialize;

use super::cart::CartItem;

/// Flat shipping fee, in currency units, charged on any non-empty order.
pub const FLAT_SHIPPING_FEE: u32 = 50;

/// Subtotal, shipping and grand total of a cart.
///
/// Always recomputed from the items; nothing is cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CartTotals {
    /// Sum of `price * quantity` over all items.
    pub subtotal: Decimal,
    /// [`FLAT_SHIPPING_FEE`] when the subtotal is positive, else zero.
    pub shipping: Decimal,
    /// `subtotal + shipping`.
    pub total: Decimal,
}

impl CartTotals {
    /// Compute totals for a list of items.
    ///
    /// Sums saturate at `Decimal::MAX` instead of overflowing.
    #[must_use]
    pub fn for_items(items: &[CartItem]) -> Self {
        let subtotal = items
            .iter()
            .map(CartItem::line_total)
            .fold(Decimal::ZERO, Decimal::saturating_add);
        let shipping = shipping_for(subtotal);
        Self {
            subtotal,
            shipping,
            total: subtotal.saturating_add(shipping),
        }
    }
}

/// Shipping charged for a given subtotal.
#[must_use]
pub fn shipping_for(subtotal: Decimal) -> Decimal {
    if subtotal > Decimal::ZERO {
        Decimal::from(FLAT_SHIPPING_FEE)
    } else {
        Decimal::ZERO
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::{ItemId, Price};

    fn line(price: u32, quantity: u32) -> CartItem {
        CartItem {
            id: ItemId::new(i64::from(price)),
            name: format!("item-{price}"),
            price: Price::from_units(price),
            quantity,
            image: None,
        }
    }

    #[test]
    fn test_totals_with_shipping() {
        let totals = CartTotals::for_items(&[line(100, 2), line(50, 1)]);
        assert_eq!(totals.subtotal, Decimal::from(250));
        assert_eq!(totals.shipping, Decimal::from(50));
        assert_eq!(totals.total, Decimal::from(300));
    }

    #[test]
    fn test_empty_cart_has_no_shipping() {
        let totals = CartTotals::for_items(&[]);
        assert_eq!(totals.subtotal, Decimal::ZERO);
        assert_eq!(totals.shipping, Decimal::ZERO);
        assert_eq!(totals.total, Decimal::ZERO);
    }

    #[test]
    fn test_free_items_have_no_shipping() {
        let totals = CartTotals::for_items(&[line(0, 3)]);
        assert_eq!(totals.shipping, Decimal::ZERO);
        assert_eq!(totals.total, Decimal::ZERO);
    }

    #[test]
    fn test_oversized_amounts_saturate() {
        let mut big = line(0, 2);
        big.price = Price::new(Decimal::from_scientific("5e28").unwrap()).unwrap();

        let totals = CartTotals::for_items(&[big.clone(), big]);
        assert_eq!(totals.subtotal, Decimal::MAX);
        assert_eq!(totals.shipping, Decimal::from(FLAT_SHIPPING_FEE));
        assert_eq!(totals.total, Decimal::MAX);
    }
}
