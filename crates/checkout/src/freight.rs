//! Freight quoting against a pluggable rate carrier.
//!
//! The quoter sanitizes the destination postal code, builds the per-line
//! package profile from the shared tier table, and asks exactly one carrier
//! for rates. Which carrier answers is a deployment decision, not a call
//! parameter. A successful quote is never bound to the cart here; the
//! caller selects one option and binds it explicitly.

use async_trait::async_trait;
use natucart_core::packaging::package_lines;
use natucart_core::{Address, CartSnapshot, FreightQuote, RateRequest};
use thiserror::Error;
use tracing::instrument;

/// Errors from a freight quoting call.
#[derive(Debug, Error)]
pub enum FreightError {
    /// Postal code did not sanitize to exactly 8 digits.
    #[error("invalid postal code: {0:?}")]
    InvalidPostalCode(String),

    /// The carrier answered but offered no usable service.
    #[error("no freight service available for this address")]
    NoServiceAvailable,

    /// The carrier could not be reached or returned an error.
    #[error("carrier error: {0}")]
    Carrier(String),
}

/// The carrier capability the quoter depends on.
#[async_trait]
pub trait RateCarrier: Send + Sync {
    /// Quote shipping services for the request.
    ///
    /// # Errors
    ///
    /// Returns [`FreightError::Carrier`] on transport or upstream failure.
    async fn rates(&self, request: &RateRequest) -> Result<FreightQuote, FreightError>;
}

/// Strip non-digits and truncate to the 8 digits of a CEP.
#[must_use]
pub fn sanitize_postal_code(raw: &str) -> String {
    raw.chars().filter(char::is_ascii_digit).take(8).collect()
}

/// Display format `#####-###`; shorter inputs are returned digit-only.
#[must_use]
pub fn format_postal_code(raw: &str) -> String {
    let digits = sanitize_postal_code(raw);
    if digits.len() <= 5 {
        return digits;
    }
    let (prefix, suffix) = digits.split_at(5);
    format!("{prefix}-{suffix}")
}

/// Freight quoter over one configured carrier.
pub struct FreightQuoter {
    carrier: std::sync::Arc<dyn RateCarrier>,
}

impl FreightQuoter {
    #[must_use]
    pub fn new(carrier: std::sync::Arc<dyn RateCarrier>) -> Self {
        Self { carrier }
    }

    /// Quote shipping for the cart to `postal_code`.
    ///
    /// # Errors
    ///
    /// - [`FreightError::InvalidPostalCode`] when the code does not
    ///   sanitize to 8 digits
    /// - [`FreightError::NoServiceAvailable`] when the carrier offers
    ///   nothing usable
    /// - [`FreightError::Carrier`] on transport failure
    #[instrument(skip(self, address, cart), fields(postal_code))]
    pub async fn get_freight_rates(
        &self,
        postal_code: &str,
        address: Option<&Address>,
        cart: &CartSnapshot,
    ) -> Result<FreightQuote, FreightError> {
        let sanitized = sanitize_postal_code(postal_code);
        if sanitized.len() != 8 {
            return Err(FreightError::InvalidPostalCode(postal_code.to_string()));
        }

        let request = RateRequest {
            postal_code: sanitized,
            address: address.cloned(),
            packages: package_lines(&cart.items),
        };

        let quote = self.carrier.rates(&request).await?;
        if quote.options.is_empty() {
            return Err(FreightError::NoServiceAvailable);
        }
        Ok(quote)
    }
}
