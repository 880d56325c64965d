//! Integration tests for Natucart.
//!
//! These tests wire the client-side checkout crate and the server crate
//! together through their capability traits, with the in-memory order
//! store standing in for the backend's disk store and scripted gateways
//! standing in for Mercado Pago and Melhor Envio. No network, no live
//! services.
//!
//! # Test Categories
//!
//! - `checkout_flow` - full payment attempts from cart to outcome
//! - `webhook_fulfillment` - gateway notifications through to shipment
//!
//! This library crate carries the shared fixtures; the scenarios live in
//! `tests/`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use natucart_checkout::cart::CartStore;
use natucart_core::{Address, Customer, FreightOption, OrderRecord};
use rust_decimal_macros::dec;

/// A shopper with valid Brazilian checkout data.
#[must_use]
pub fn customer() -> Customer {
    Customer {
        name: "Maria da Silva".to_string(),
        email: "maria@example.com".to_string(),
        phone: "11988887777".to_string(),
        tax_id: "12345678909".to_string(),
    }
}

/// A complete São Paulo delivery address.
#[must_use]
pub fn address() -> Address {
    Address {
        postal_code: "01001000".to_string(),
        state: "SP".to_string(),
        city: "São Paulo".to_string(),
        street: "Praça da Sé".to_string(),
        number: "100".to_string(),
        district: "Sé".to_string(),
        complement: String::new(),
    }
}

/// The PAC freight option used across scenarios (R$ 15,50 / 7 days).
#[must_use]
pub fn pac_freight() -> FreightOption {
    FreightOption {
        service: "PAC".to_string(),
        service_code: "1".to_string(),
        carrier: "Correios".to_string(),
        price: dec!(15.50),
        delivery_time_days: 7,
    }
}

/// A cart holding one unit with PAC freight bound (total R$ 115,40).
#[must_use]
pub fn loaded_cart() -> CartStore {
    let mut cart = CartStore::new(natucart_checkout::catalog::Catalog::natucart());
    cart.add_item("natucart-single", 1);
    cart.set_freight(Some(pac_freight()));
    cart
}

/// Draft store adapter: persists checkout drafts as pending-payment
/// records in a server-side order store, the way the backend's `/orders`
/// endpoint does.
pub struct ServerDraftStore {
    orders: Arc<dyn natucart_server::store::OrderStore>,
}

impl ServerDraftStore {
    #[must_use]
    pub fn new(orders: Arc<dyn natucart_server::store::OrderStore>) -> Self {
        Self { orders }
    }
}

#[async_trait]
impl natucart_checkout::draft::DraftStore for ServerDraftStore {
    async fn save_draft(
        &self,
        draft: &natucart_core::OrderContext,
    ) -> Result<(), String> {
        let record = OrderRecord::from_draft(draft.clone(), Utc::now());
        self.orders
            .put(&record)
            .await
            .map_err(|err| err.to_string())
    }
}
