//! Quantity-tiered packaging table.
//!
//! Weight and dimensions of the box a cart line ships in, keyed by the line
//! quantity. This is a fixed business rule measured from the real packages,
//! not a per-call parameter.
//!
//! The same table MUST be used when quoting freight and when creating the
//! shipment, otherwise the carrier re-prices the label against different
//! dimensions than the ones the shopper paid for.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Weight and outer dimensions of one package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageSpec {
    /// Total package weight in kilograms.
    pub weight_kg: Decimal,
    /// Width in centimeters.
    pub width_cm: Decimal,
    /// Height in centimeters.
    pub height_cm: Decimal,
    /// Length in centimeters.
    pub length_cm: Decimal,
}

/// Package spec for a cart line of `quantity` units.
///
/// Applied per cart line, not per unit: a line with five units yields one
/// package sized for five, never five single-unit envelopes.
///
/// Tiers:
/// - 1 unit ships in an envelope (50 g, 16.5 x 1 x 18 cm)
/// - 2-3 units in the small box (160 g, 20.5 x 7.5 x 12 cm)
/// - 4-6 units in the large box (280 g, 19 x 10 x 14.5 cm)
/// - above 6 the large box dimensions are kept and the weight scales
///   linearly from the 6-unit package
#[must_use]
pub fn spec_for_quantity(quantity: u32) -> PackageSpec {
    match quantity {
        0 | 1 => PackageSpec {
            weight_kg: Decimal::new(5, 2),
            width_cm: Decimal::new(165, 1),
            height_cm: Decimal::ONE,
            length_cm: Decimal::from(18),
        },
        2..=3 => PackageSpec {
            weight_kg: Decimal::new(16, 2),
            width_cm: Decimal::new(205, 1),
            height_cm: Decimal::new(75, 1),
            length_cm: Decimal::from(12),
        },
        4..=6 => six_pack(),
        n => {
            let base = six_pack();
            PackageSpec {
                weight_kg: base.weight_kg * Decimal::from(n) / Decimal::from(6),
                ..base
            }
        }
    }
}

/// One package to be quoted or shipped, derived from one cart line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageLine {
    /// SKU identifying the line at the carrier.
    pub sku: String,
    /// Units packed inside this package.
    pub quantity: u32,
    /// Package weight and dimensions from the tier table.
    pub spec: PackageSpec,
    /// Declared value for carrier insurance: the full line total.
    pub insurance_value: Decimal,
}

/// Build the per-line package profile for a set of cart items.
///
/// Both freight quoting and shipment creation go through this function so
/// that quoted and shipped dimensions can never diverge.
#[must_use]
pub fn package_lines(items: &[crate::types::CartItem]) -> Vec<PackageLine> {
    items
        .iter()
        .map(|item| PackageLine {
            sku: item.sku.clone(),
            quantity: item.quantity,
            spec: spec_for_quantity(item.quantity),
            insurance_value: item.line_total(),
        })
        .collect()
}

fn six_pack() -> PackageSpec {
    PackageSpec {
        weight_kg: Decimal::new(28, 2),
        width_cm: Decimal::from_i128_with_scale(19, 0),
        height_cm: Decimal::from_i128_with_scale(10, 0),
        length_cm: Decimal::from_i128_with_scale(145, 1),
    }
}
