//! Static product catalog.
//!
//! The merchant sells one product in three bundle sizes. Catalog lookups are
//! local; there is no remote product API.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// One sellable product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    pub id: &'static str,
    pub name: &'static str,
    pub sku: &'static str,
    /// Unit price in BRL.
    pub price: Decimal,
}

/// The merchant catalog, constructed once per session.
#[derive(Debug, Clone)]
pub struct Catalog {
    products: Vec<Product>,
}

impl Catalog {
    /// The Natucart bundles.
    #[must_use]
    pub fn natucart() -> Self {
        Self {
            products: vec![
                Product {
                    id: "natucart-single",
                    name: "Natucart - 1 Frasco",
                    sku: "NATUCART-1",
                    price: dec!(99.90),
                },
                Product {
                    id: "natucart-trio",
                    name: "Natucart - 3 Frascos",
                    sku: "NATUCART-3",
                    price: dec!(255),
                },
                Product {
                    id: "natucart-six",
                    name: "Natucart - 6 Frascos",
                    sku: "NATUCART-6",
                    price: dec!(450),
                },
            ],
        }
    }

    /// Look up a product by catalog id.
    #[must_use]
    pub fn get(&self, product_id: &str) -> Option<&Product> {
        self.products.iter().find(|p| p.id == product_id)
    }

    /// All products, in display order.
    #[must_use]
    pub fn products(&self) -> &[Product] {
        &self.products
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::natucart()
    }
}
