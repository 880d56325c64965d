//! Charge wire types shared by the checkout client and the backend.
//!
//! Card data never appears here: by the time a charge request exists, the
//! card has already been exchanged for a one-shot gateway token.

use serde::{Deserialize, Serialize};

use super::{OrderContext, PaymentStatus};

/// Charge instruction after local validation and tokenization.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChargeMethod {
    Card {
        token: String,
        installments: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        issuer_id: Option<String>,
    },
    Pix,
    Boleto,
}

/// What the gateway needs to create a payment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargeRequest {
    pub order: OrderContext,
    pub method: ChargeMethod,
    /// Fresh per attempt; retries of the *same* attempt reuse it so the
    /// gateway can dedupe.
    pub idempotency_key: String,
}

/// Gateway answer for a created payment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargeResponse {
    #[serde(default)]
    pub payment_id: String,
    pub status: PaymentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pix_qr_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pix_qr_code_base64: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boleto_barcode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boleto_ticket_url: Option<String>,
}
