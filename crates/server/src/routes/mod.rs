//! HTTP route handlers for the checkout backend.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                  - Health check
//!
//! # Freight
//! POST /freight/quote           - Quote shipping services for a CEP
//!
//! # Orders
//! POST /orders                  - Persist an order draft
//! GET  /orders/{order_id}       - Fetch an order record
//!
//! # Payments
//! POST /payments/charge         - Create a Mercado Pago payment
//! POST /payments/preference     - Create a hosted-checkout preference
//! POST /payments/session        - Create an AbacatePay pix billing session
//!
//! # Webhooks
//! GET  /webhooks/mercadopago    - Gateway notification (query style)
//! POST /webhooks/mercadopago    - Gateway notification (body style)
//! ```

pub mod freight;
pub mod orders;
pub mod payments;
pub mod webhook;

use axum::{
    Router,
    routing::{get, post},
};

use crate::state::AppState;

/// Create the API router.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/freight/quote", post(freight::quote))
        .route("/orders", post(orders::create_order))
        .route("/orders/{order_id}", get(orders::get_order))
        .route("/payments/charge", post(payments::charge))
        .route("/payments/preference", post(payments::create_preference))
        .route("/payments/session", post(payments::create_session))
        .route(
            "/webhooks/mercadopago",
            get(webhook::receive).post(webhook::receive),
        )
}

/// Health check endpoint.
async fn health() -> &'static str {
    "OK"
}
