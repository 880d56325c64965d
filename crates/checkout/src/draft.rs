//! Order draft assembly and persistence.
//!
//! The draft builder freezes the cart into an [`OrderContext`] and persists
//! it as a pending-payment record *before* any gateway is contacted. That
//! ordering is the correctness hinge of the whole flow: the webhook handler
//! can only correlate a payment back to an order if the draft landed first.

use async_trait::async_trait;
use chrono::Utc;
use natucart_core::{Address, CartSnapshot, Customer, OrderContext, OrderTotals};
use rand::Rng;
use rand::distributions::Alphanumeric;
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::instrument;

use crate::freight::sanitize_postal_code;

/// Which customer field failed validation. Ordered: the first failing field
/// wins, so the shopper fixes one thing at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CustomerField {
    Name,
    Email,
    Phone,
    TaxId,
}

impl std::fmt::Display for CustomerField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Name => "name",
            Self::Email => "email",
            Self::Phone => "phone",
            Self::TaxId => "taxId",
        };
        f.write_str(s)
    }
}

/// Draft construction failures, in validation order.
#[derive(Debug, Error)]
pub enum DraftError {
    #[error("cart is empty")]
    EmptyCart,

    #[error("invalid customer field: {0}")]
    InvalidCustomer(CustomerField),

    #[error("no freight option selected")]
    MissingFreight,

    #[error("address is missing a postal code")]
    InvalidAddress,

    /// The store rejected the draft. Fatal for this checkout attempt; the
    /// payment flow must not proceed.
    #[error("failed to persist order draft: {0}")]
    Persist(String),
}

/// Where drafts are persisted before payment.
#[async_trait]
pub trait DraftStore: Send + Sync {
    /// Persist the draft with status `pending_payment`.
    ///
    /// # Errors
    ///
    /// Returns a message describing the storage failure.
    async fn save_draft(&self, draft: &OrderContext) -> Result<(), String>;
}

/// Generate a checkout-attempt order id: `natucart_<epoch-ms>_<9-rand>`.
///
/// Collision resistant enough for one merchant, and stable for the lifetime
/// of the attempt; it doubles as the gateway's external reference.
#[must_use]
pub fn generate_order_id() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(9)
        .map(char::from)
        .collect();
    format!("natucart_{}_{}", Utc::now().timestamp_millis(), suffix)
}

/// Builds and persists order drafts.
pub struct OrderDraftBuilder {
    store: std::sync::Arc<dyn DraftStore>,
}

impl OrderDraftBuilder {
    #[must_use]
    pub fn new(store: std::sync::Arc<dyn DraftStore>) -> Self {
        Self { store }
    }

    /// Validate inputs, freeze the cart, generate the order id, and persist
    /// the pending draft.
    ///
    /// Validation is fail-fast in a fixed order: cart, then customer
    /// (name, email, phone, tax id), then freight, then address.
    ///
    /// # Errors
    ///
    /// Returns the first [`DraftError`] encountered; [`DraftError::Persist`]
    /// means the attempt must stop before any gateway call.
    #[instrument(skip_all, fields(order_id))]
    pub async fn build_and_persist_draft(
        &self,
        customer: &Customer,
        address: &Address,
        cart: &CartSnapshot,
    ) -> Result<OrderContext, DraftError> {
        if cart.is_empty() {
            return Err(DraftError::EmptyCart);
        }

        let customer = validate_customer(customer)?;

        let Some(freight) = cart.freight.clone() else {
            return Err(DraftError::MissingFreight);
        };

        let postal_code = sanitize_postal_code(&address.postal_code);
        if postal_code.is_empty() {
            return Err(DraftError::InvalidAddress);
        }
        let mut address = address.clone();
        address.postal_code = postal_code;

        let order_id = generate_order_id();
        tracing::Span::current().record("order_id", order_id.as_str());

        let subtotal: Decimal = cart.items.iter().map(natucart_core::CartItem::line_total).sum();
        let totals = OrderTotals {
            subtotal,
            freight: freight.price,
            total: subtotal + freight.price,
        };

        let draft = OrderContext {
            external_reference: order_id.clone(),
            order_id,
            customer,
            address,
            freight,
            items: cart.items.clone(),
            totals,
            metadata: serde_json::Map::new(),
        };

        self.store
            .save_draft(&draft)
            .await
            .map_err(DraftError::Persist)?;

        Ok(draft)
    }
}

/// Validate customer fields in order, normalizing phone and tax id to raw
/// digits.
pub(crate) fn validate_customer(customer: &Customer) -> Result<Customer, DraftError> {
    if customer.name.trim().is_empty() {
        return Err(DraftError::InvalidCustomer(CustomerField::Name));
    }
    if !customer.email.contains('@') {
        return Err(DraftError::InvalidCustomer(CustomerField::Email));
    }
    let phone: String = customer.phone.chars().filter(char::is_ascii_digit).collect();
    if phone.is_empty() {
        return Err(DraftError::InvalidCustomer(CustomerField::Phone));
    }
    let tax_id: String = customer
        .tax_id
        .chars()
        .filter(char::is_ascii_digit)
        .collect();
    if tax_id.len() != 11 {
        return Err(DraftError::InvalidCustomer(CustomerField::TaxId));
    }

    Ok(Customer {
        name: customer.name.trim().to_string(),
        email: customer.email.trim().to_string(),
        phone,
        tax_id,
    })
}
