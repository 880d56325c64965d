//! Carrier freight quotes.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One carrier-quoted shipping service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FreightOption {
    /// Service display name, e.g. "SEDEX".
    pub service: String,
    /// Carrier-side service code, used again at shipment creation.
    pub service_code: String,
    /// Carrier company name, e.g. "Correios".
    pub carrier: String,
    /// Shipping price in BRL.
    pub price: Decimal,
    /// Estimated delivery lead time in business days.
    pub delivery_time_days: u32,
}

/// Result of one freight quoting call.
///
/// A quote never binds itself to the cart: the caller picks one option and
/// binds it explicitly. The cheapest option is a UI suggestion only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FreightQuote {
    /// Sanitized 8-digit destination postal code.
    pub postal_code: String,
    /// Candidate services, in the order the carrier returned them.
    pub options: Vec<FreightOption>,
}

impl FreightQuote {
    /// Lowest-priced option, if any.
    #[must_use]
    pub fn cheapest(&self) -> Option<&FreightOption> {
        self.options.iter().min_by_key(|opt| opt.price)
    }
}

/// A rate request as sent to the carrier capability.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateRequest {
    /// Sanitized 8-digit destination postal code.
    pub postal_code: String,
    /// Full destination address when the shopper already filled it in;
    /// some carriers price more precisely with it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<super::Address>,
    /// One package per cart line, from the shared tier table.
    pub packages: Vec<crate::packaging::PackageLine>,
}
