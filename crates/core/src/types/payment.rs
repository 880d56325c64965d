//! Gateway payment status normalization.
//!
//! The gateway reports a `status` plus a finer-grained `status_detail`.
//! Both the payment orchestrator and the webhook receiver branch on the
//! same normalization so a payment can never be "approved" on one side and
//! "pending" on the other.

use serde::{Deserialize, Serialize};

/// Raw gateway payment status values we recognize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Approved,
    Pending,
    InProcess,
    Authorized,
    Rejected,
    Cancelled,
    Refunded,
    ChargedBack,
    /// Anything the gateway adds later.
    #[serde(other)]
    #[default]
    Unknown,
}

impl PaymentStatus {
    /// Parse a raw gateway status string.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw {
            "approved" => Self::Approved,
            "pending" => Self::Pending,
            "in_process" => Self::InProcess,
            "authorized" => Self::Authorized,
            "rejected" => Self::Rejected,
            "cancelled" => Self::Cancelled,
            "refunded" => Self::Refunded,
            "charged_back" => Self::ChargedBack,
            _ => Self::Unknown,
        }
    }

    /// The canonical wire spelling, `unknown` for unrecognized values.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Pending => "pending",
            Self::InProcess => "in_process",
            Self::Authorized => "authorized",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
            Self::Refunded => "refunded",
            Self::ChargedBack => "charged_back",
            Self::Unknown => "unknown",
        }
    }

    /// Normalize into the three-way internal outcome.
    #[must_use]
    pub const fn disposition(self) -> PaymentDisposition {
        match self {
            Self::Approved => PaymentDisposition::Approved,
            Self::Pending | Self::InProcess | Self::Authorized => PaymentDisposition::Pending,
            Self::Rejected | Self::Cancelled | Self::Refunded | Self::ChargedBack
            | Self::Unknown => PaymentDisposition::Rejected,
        }
    }

    /// The order status a terminal rejection maps to.
    ///
    /// `rejected` keeps its name; cancellation, refund, and chargeback all
    /// land on `cancelled`. Non-terminal statuses return `None`.
    #[must_use]
    pub const fn terminal_order_status(self) -> Option<super::OrderStatus> {
        match self {
            Self::Rejected => Some(super::OrderStatus::Rejected),
            Self::Cancelled | Self::Refunded | Self::ChargedBack => {
                Some(super::OrderStatus::Cancelled)
            }
            _ => None,
        }
    }
}

/// Internal three-way payment outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentDisposition {
    /// Fire success, clear the cart, fulfill.
    Approved,
    /// Keep the cart, wait for the webhook.
    Pending,
    /// Terminal for the attempt; the shopper may retry.
    Rejected,
}

/// Shopper-facing message for a gateway `status_detail` rejection code.
///
/// Unknown codes fall back to a generic rejection message. Messages are in
/// pt-BR because that is what the storefront shows.
#[must_use]
pub fn rejection_message(status_detail: Option<&str>) -> &'static str {
    match status_detail.unwrap_or_default() {
        "cc_rejected_bad_filled_card_number" => "Confira o número do cartão.",
        "cc_rejected_bad_filled_date" => "Confira a data de validade do cartão.",
        "cc_rejected_bad_filled_security_code" => "Confira o código de segurança do cartão.",
        "cc_rejected_bad_filled_other" => "Confira os dados do cartão.",
        "cc_rejected_insufficient_amount" => "Saldo insuficiente no cartão.",
        "cc_rejected_call_for_authorize" => {
            "Autorize o pagamento junto à operadora do seu cartão."
        }
        "cc_rejected_card_disabled" => {
            "Cartão inativo. Ligue para a operadora para ativar o cartão."
        }
        "cc_rejected_duplicated_payment" => {
            "Você já efetuou um pagamento com esse valor. Se precisar pagar novamente, use outro cartão."
        }
        "cc_rejected_high_risk" => {
            "Pagamento recusado por segurança. Escolha outra forma de pagamento."
        }
        "cc_rejected_max_attempts" => {
            "Você atingiu o limite de tentativas. Escolha outro cartão ou forma de pagamento."
        }
        _ => "Não foi possível processar o pagamento. Tente novamente ou use outra forma de pagamento.",
    }
}
