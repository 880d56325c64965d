//! Remote gateway and carrier clients.
//!
//! Every client owns a `reqwest` client with a bounded timeout and maps
//! upstream failures into [`GatewayError`]. Seams the rest of the server
//! depends on (`PaymentLookup`, `QuoteCarrier`) are traits so handlers and
//! services can be exercised against mocks.

pub mod abacatepay;
pub mod frenet;
pub mod melhorenvio;
pub mod mercadopago;

pub use abacatepay::AbacatePayClient;
pub use frenet::FrenetClient;
pub use melhorenvio::MelhorEnvioClient;
pub use mercadopago::{MercadoPagoClient, PaymentDetails};

use std::time::Duration;

use async_trait::async_trait;
use natucart_core::{FreightOption, RateRequest};
use thiserror::Error;

pub(crate) const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors that can occur when talking to a gateway or carrier.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// HTTP transport failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Upstream answered with a non-success status.
    #[error("gateway answered {status}: {message}")]
    Status { status: u16, message: String },

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// The answer parsed but is missing a field we need.
    #[error("unexpected gateway response: {0}")]
    Unexpected(String),
}

/// Looks up a payment by gateway id. The webhook receiver re-fetches every
/// notified payment through this seam instead of trusting the webhook body.
#[async_trait]
pub trait PaymentLookup: Send + Sync {
    /// # Errors
    ///
    /// Upstream transport or status failures.
    async fn payment_details(&self, payment_id: &str) -> Result<PaymentDetails, GatewayError>;
}

/// Quotes shipping services from one carrier.
#[async_trait]
pub trait QuoteCarrier: Send + Sync {
    /// Quote services from `origin` to the request's destination.
    ///
    /// Unusable services (carrier-side per-service errors) are filtered
    /// out, so an empty vec is a valid answer.
    ///
    /// # Errors
    ///
    /// Upstream transport or status failures.
    async fn quote(
        &self,
        origin: &str,
        request: &RateRequest,
    ) -> Result<Vec<FreightOption>, GatewayError>;
}

/// Unwrap automation-relay envelopes.
///
/// Requests routed through a workflow relay come back wrapped in one or
/// more envelope objects keyed `data`, `body`, `result`, or `json`. Descend
/// until the payload itself is reached. Direct API answers pass through
/// untouched.
#[must_use]
pub(crate) fn unwrap_envelope(mut value: serde_json::Value) -> serde_json::Value {
    const ENVELOPE_KEYS: &[&str] = &["data", "body", "result", "json"];

    loop {
        let Some(object) = value.as_object() else {
            return value;
        };
        let Some(inner) = ENVELOPE_KEYS
            .iter()
            .find_map(|key| object.get(*key))
            .filter(|inner| inner.is_object() || inner.is_array())
        else {
            return value;
        };
        value = inner.clone();
    }
}
