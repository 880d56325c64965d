//! Cart line items and snapshots.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::FreightOption;

/// One line in the cart, unique by product id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    /// Product id (catalog key).
    pub id: String,
    /// Display name.
    pub name: String,
    /// Stock-keeping unit, e.g. `NATUCART-1`.
    pub sku: String,
    /// Price of one unit, in BRL.
    pub unit_price: Decimal,
    /// Units of this product in the cart, always >= 1 once stored.
    pub quantity: u32,
}

impl CartItem {
    /// Line total: unit price times quantity.
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// Immutable view of the cart at one point in time.
///
/// Invariants maintained by the cart store:
/// `subtotal == sum(line totals)` and `total == subtotal + freight price`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartSnapshot {
    pub items: Vec<CartItem>,
    pub subtotal: Decimal,
    pub freight: Option<FreightOption>,
    pub total: Decimal,
}

impl CartSnapshot {
    /// Empty cart with zeroed totals.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            items: Vec::new(),
            subtotal: Decimal::ZERO,
            freight: None,
            total: Decimal::ZERO,
        }
    }

    /// Total number of units across all lines.
    #[must_use]
    pub fn unit_count(&self) -> u32 {
        self.items.iter().map(|item| item.quantity).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl Default for CartSnapshot {
    fn default() -> Self {
        Self::empty()
    }
}
