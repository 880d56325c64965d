//! Order aggregate: customer, address, totals, and the persisted record.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{CartItem, FreightOption};

/// Shopper identification collected by the checkout form.
///
/// Phone and tax id are stored as raw digits; masking is presentation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub name: String,
    pub email: String,
    /// Raw digits, DDD + number.
    pub phone: String,
    /// CPF, exactly 11 digits once validated.
    pub tax_id: String,
}

/// Shipping address. The postal code alone is enough to quote freight;
/// the full address is required before payment submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    /// 8 raw digits (CEP).
    pub postal_code: String,
    pub state: String,
    pub city: String,
    pub street: String,
    pub number: String,
    pub district: String,
    #[serde(default)]
    pub complement: String,
}

/// Frozen money totals of a draft. `total == subtotal + freight`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderTotals {
    pub subtotal: Decimal,
    pub freight: Decimal,
    pub total: Decimal,
}

/// The complete order context handed to a payment flow.
///
/// This is a frozen snapshot taken at draft time; later cart mutations never
/// change a submitted order. `external_reference` equals `order_id` and is
/// the correlation key the gateway echoes back in webhooks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderContext {
    pub order_id: String,
    pub external_reference: String,
    pub customer: Customer,
    pub address: Address,
    pub freight: FreightOption,
    pub items: Vec<CartItem>,
    pub totals: OrderTotals,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// Order lifecycle status.
///
/// Forward-only: webhook redelivery must never move an order backwards
/// (e.g. `shipping_created` back to `approved`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Draft persisted, gateway outcome not yet known.
    #[default]
    PendingPayment,
    /// Gateway confirmed the payment.
    Approved,
    /// Carrier shipment created after approval.
    ShippingCreated,
    /// Gateway rejected the payment.
    Rejected,
    /// Payment cancelled, refunded, or charged back.
    Cancelled,
}

impl OrderStatus {
    /// Whether a transition to `next` is allowed.
    ///
    /// `shipping_created` is final for this core; rejection statuses may be
    /// reached from pending or approved (refund/chargeback after approval)
    /// but never unwound.
    #[must_use]
    pub fn accepts(self, next: Self) -> bool {
        match self {
            Self::PendingPayment => {
                matches!(next, Self::Approved | Self::Rejected | Self::Cancelled)
            }
            Self::Approved => matches!(next, Self::ShippingCreated | Self::Cancelled),
            Self::ShippingCreated | Self::Rejected | Self::Cancelled => false,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::PendingPayment => "pending_payment",
            Self::Approved => "approved",
            Self::ShippingCreated => "shipping_created",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Gateway outcome snapshot recorded on the order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRecord {
    /// Gateway-side payment id.
    pub payment_id: String,
    /// Raw gateway status string, e.g. "approved".
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_method_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<DateTime<Utc>>,
}

/// Carrier shipment snapshot recorded on the order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipmentRecord {
    pub shipment_id: String,
    /// Printable label PDF, absent when label generation failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// The server-persisted representation of a checkout attempt.
///
/// Created before the gateway is contacted, mutated by the webhook receiver
/// and the fulfillment trigger. Append-only once created: later writes merge
/// fields, never replace the record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRecord {
    pub order_id: String,
    pub status: OrderStatus,
    pub customer: Customer,
    pub address: Address,
    pub items: Vec<CartItem>,
    pub freight: FreightOption,
    pub totals: OrderTotals,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment: Option<PaymentRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shipment: Option<ShipmentRecord>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderRecord {
    /// Build a pending-payment record from a draft context.
    #[must_use]
    pub fn from_draft(draft: OrderContext, now: DateTime<Utc>) -> Self {
        Self {
            order_id: draft.order_id,
            status: OrderStatus::PendingPayment,
            customer: draft.customer,
            address: draft.address,
            items: draft.items,
            freight: draft.freight,
            totals: draft.totals,
            payment: None,
            shipment: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a status transition if the lifecycle allows it.
    ///
    /// Returns `true` when the status changed. A disallowed transition is a
    /// no-op so that redelivered webhooks cannot regress the record.
    pub fn transition(&mut self, next: OrderStatus, now: DateTime<Utc>) -> bool {
        if self.status.accepts(next) {
            self.status = next;
            self.updated_at = now;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn status_never_regresses_from_shipping_created() {
        assert!(!OrderStatus::ShippingCreated.accepts(OrderStatus::Approved));
        assert!(!OrderStatus::ShippingCreated.accepts(OrderStatus::PendingPayment));
        assert!(!OrderStatus::ShippingCreated.accepts(OrderStatus::Cancelled));
    }

    #[test]
    fn pending_moves_forward() {
        assert!(OrderStatus::PendingPayment.accepts(OrderStatus::Approved));
        assert!(OrderStatus::PendingPayment.accepts(OrderStatus::Rejected));
        assert!(OrderStatus::PendingPayment.accepts(OrderStatus::Cancelled));
        assert!(!OrderStatus::PendingPayment.accepts(OrderStatus::PendingPayment));
        // Shipping requires a recorded approval first.
        assert!(!OrderStatus::PendingPayment.accepts(OrderStatus::ShippingCreated));
    }

    #[test]
    fn approved_allows_shipping_and_chargeback_only() {
        assert!(OrderStatus::Approved.accepts(OrderStatus::ShippingCreated));
        assert!(OrderStatus::Approved.accepts(OrderStatus::Cancelled));
        assert!(!OrderStatus::Approved.accepts(OrderStatus::Rejected));
        assert!(!OrderStatus::Approved.accepts(OrderStatus::PendingPayment));
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&OrderStatus::ShippingCreated).unwrap();
        assert_eq!(json, "\"shipping_created\"");
    }
}
