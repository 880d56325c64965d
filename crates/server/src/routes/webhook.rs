//! Mercado Pago webhook receiver.
//!
//! The gateway delivers the same event in several shapes (query-string
//! topics, IPN bodies, v2 notification bodies) and redelivers until it sees
//! a 2xx. Two consequences shape this module: notification parsing accepts
//! every shape, and the handler always answers 200 so the gateway never
//! retries storms against a bug of ours. The payment state is re-fetched
//! from the gateway; the notification body is only trusted for the id.

use std::collections::HashMap;
use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use chrono::Utc;
use hmac::{Hmac, Mac};
use natucart_core::{OrderStatus, PaymentDisposition, PaymentRecord};
use secrecy::ExposeSecret;
use serde::Serialize;
use serde_json::Value;
use sha2::Sha256;
use tracing::instrument;

use crate::fulfillment::FulfillmentService;
use crate::gateways::PaymentLookup;
use crate::state::AppState;
use crate::store::OrderStore;

type HmacSha256 = Hmac<Sha256>;

/// Acknowledgment body. `processed` is diagnostic only; the gateway looks
/// at the status code.
#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub status: &'static str,
    pub processed: bool,
}

/// Receive a Mercado Pago notification.
///
/// Always answers 200: a notification we cannot process right now will be
/// reconciled by a later redelivery or by a manual payment lookup, and a
/// non-2xx would only make the gateway hammer the endpoint.
#[instrument(skip_all)]
pub async fn receive(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Json<WebhookAck> {
    let body_json: Option<Value> = if body.is_empty() {
        None
    } else {
        serde_json::from_slice(&body).ok()
    };

    let notification = Notification::extract(&query, body_json.as_ref());
    tracing::info!(
        topic = notification.topic.as_deref().unwrap_or("-"),
        resource_id = notification.resource_id.as_deref().unwrap_or("-"),
        "webhook received"
    );

    verify_signature(&state, &headers, notification.resource_id.as_deref());

    let Some(topic) = notification.topic.as_deref() else {
        tracing::warn!("notification without a topic");
        return ack(false);
    };
    if !topic.starts_with("payment") {
        // merchant_order and friends carry nothing we act on.
        tracing::info!(topic, "ignoring non-payment topic");
        return ack(false);
    }
    let Some(payment_id) = notification.resource_id.as_deref() else {
        tracing::warn!("payment notification without a payment id");
        return ack(false);
    };

    let lookup = state.payment_lookup();
    match process_payment_notification(
        state.orders(),
        &lookup,
        state.fulfillment(),
        payment_id,
    )
    .await
    {
        Ok(processed) => ack(processed),
        Err(err) => {
            tracing::error!(payment_id, error = %err, "webhook processing failed");
            sentry::capture_error(&err);
            ack(false)
        }
    }
}

const fn ack(processed: bool) -> Json<WebhookAck> {
    Json(WebhookAck {
        status: "ok",
        processed,
    })
}

/// Errors while acting on a payment notification.
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error(transparent)]
    Gateway(#[from] crate::gateways::GatewayError),
    #[error(transparent)]
    Store(#[from] crate::store::StoreError),
}

/// Re-fetch a payment and merge its state onto the referenced order.
///
/// Returns whether an order was updated. Approved payments trigger
/// fulfillment; a fulfillment failure is logged but does not fail the
/// notification, since the payment state itself was recorded and the next
/// redelivery retries the shipment.
pub async fn process_payment_notification(
    orders: &Arc<dyn OrderStore>,
    payments: &Arc<dyn PaymentLookup>,
    fulfillment: Option<&Arc<FulfillmentService>>,
    payment_id: &str,
) -> Result<bool, WebhookError> {
    let details = payments.payment_details(payment_id).await?;

    let Some(order_id) = details.external_reference.clone() else {
        tracing::warn!(payment_id, "payment has no external reference");
        return Ok(false);
    };

    let payment = PaymentRecord {
        payment_id: details.payment_id.clone(),
        status: details.status.as_str().to_string(),
        status_detail: details.status_detail.clone(),
        payment_method_id: details.payment_method_id.clone(),
        amount: details.amount,
        approved_at: details.approved_at,
    };
    let status = details.status;

    let updated = orders
        .update(&order_id, &move |record| {
            record.payment = Some(payment.clone());
            if let Some(next) = status.terminal_order_status() {
                record.transition(next, Utc::now());
            } else if status.disposition() == PaymentDisposition::Approved {
                record.transition(OrderStatus::Approved, Utc::now());
            }
        })
        .await?;

    let Some(record) = updated else {
        tracing::warn!(payment_id, order_id, "notification for an unknown order");
        return Ok(false);
    };
    tracing::info!(
        payment_id,
        order_id,
        status = status.as_str(),
        "payment state merged"
    );

    if status.disposition() == PaymentDisposition::Approved {
        match fulfillment {
            Some(service) => {
                if let Err(err) = service.fulfill(&record).await {
                    tracing::error!(order_id, error = %err, "fulfillment failed");
                }
            }
            None => tracing::warn!(order_id, "no shipping carrier configured, skipping fulfillment"),
        }
    }

    Ok(true)
}

// =============================================================================
// Notification parsing
// =============================================================================

/// The two facts a notification carries, whatever its shape.
#[derive(Debug, Default)]
struct Notification {
    topic: Option<String>,
    resource_id: Option<String>,
}

impl Notification {
    /// Pull topic and resource id out of the query string and/or JSON body.
    ///
    /// Query keys: `topic` or `type`, and `id` or `data.id`. Body keys:
    /// `type`, `topic`, or `action` (e.g. `payment.updated`), and
    /// `data.id` or `id`. Query wins over body when both are present.
    fn extract(query: &HashMap<String, String>, body: Option<&Value>) -> Self {
        let mut topic = query
            .get("topic")
            .or_else(|| query.get("type"))
            .cloned();
        let mut resource_id = query
            .get("data.id")
            .or_else(|| query.get("id"))
            .cloned();

        if let Some(body) = body {
            if topic.is_none() {
                topic = body
                    .get("type")
                    .or_else(|| body.get("topic"))
                    .or_else(|| body.get("action"))
                    .and_then(Value::as_str)
                    .map(str::to_string);
            }
            if resource_id.is_none() {
                resource_id = body
                    .pointer("/data/id")
                    .or_else(|| body.get("id"))
                    .and_then(id_value);
            }
        }

        Self { topic, resource_id }
    }
}

/// Ids arrive both as JSON strings and as bare numbers.
fn id_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

// =============================================================================
// Signature validation
// =============================================================================

/// Validate the `x-signature` header when a webhook secret is configured.
///
/// Log-only: a mismatch is recorded but the notification is still
/// processed, because the payment state is re-fetched from the gateway
/// rather than trusted from the body.
fn verify_signature(state: &AppState, headers: &HeaderMap, resource_id: Option<&str>) {
    let Some(secret) = state.config().mercado_pago.webhook_secret.as_ref() else {
        return;
    };
    let Some(signature) = headers.get("x-signature").and_then(|v| v.to_str().ok()) else {
        tracing::warn!("webhook secret configured but x-signature header missing");
        return;
    };
    let Some((ts, v1)) = parse_x_signature(signature) else {
        tracing::warn!("malformed x-signature header");
        return;
    };
    let request_id = headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok());

    let manifest = signature_manifest(resource_id, request_id, &ts);
    if signature_matches(secret.expose_secret(), &manifest, &v1) {
        tracing::debug!("webhook signature verified");
    } else {
        tracing::warn!("webhook signature mismatch");
    }
}

/// Split `ts=...,v1=...` into its parts, whatever their order.
fn parse_x_signature(header: &str) -> Option<(String, String)> {
    let mut ts = None;
    let mut v1 = None;
    for part in header.split(',') {
        let (key, value) = part.split_once('=')?;
        match key.trim() {
            "ts" => ts = Some(value.trim().to_string()),
            "v1" => v1 = Some(value.trim().to_string()),
            _ => {}
        }
    }
    Some((ts?, v1?))
}

/// The signed manifest. Sections are only included when their value is
/// present; the id is lowercased per the gateway's rules.
fn signature_manifest(resource_id: Option<&str>, request_id: Option<&str>, ts: &str) -> String {
    let mut manifest = String::new();
    if let Some(id) = resource_id {
        manifest.push_str(&format!("id:{};", id.to_lowercase()));
    }
    if let Some(rid) = request_id {
        manifest.push_str(&format!("request-id:{rid};"));
    }
    manifest.push_str(&format!("ts:{ts};"));
    manifest
}

fn signature_matches(secret: &str, manifest: &str, v1_hex: &str) -> bool {
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(manifest.as_bytes());
    let computed = hex::encode(mac.finalize().into_bytes());
    computed.eq_ignore_ascii_case(v1_hex)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use natucart_core::{
        Address, CartItem, Customer, FreightOption, OrderContext, OrderRecord, OrderTotals,
        PaymentStatus,
    };
    use rust_decimal_macros::dec;
    use serde_json::json;

    use super::*;
    use crate::fulfillment::ShipmentCarrier;
    use crate::gateways::{GatewayError, PaymentDetails};
    use crate::store::MemoryOrderStore;

    struct ScriptedLookup {
        status: PaymentStatus,
        external_reference: Option<String>,
    }

    #[async_trait]
    impl PaymentLookup for ScriptedLookup {
        async fn payment_details(&self, payment_id: &str) -> Result<PaymentDetails, GatewayError> {
            Ok(PaymentDetails {
                payment_id: payment_id.to_string(),
                status: self.status,
                status_detail: None,
                external_reference: self.external_reference.clone(),
                payment_method_id: Some("master".to_string()),
                amount: Some(dec!(115.40)),
                approved_at: None,
            })
        }
    }

    struct CountingCarrier {
        create_calls: AtomicU32,
    }

    #[async_trait]
    impl ShipmentCarrier for CountingCarrier {
        async fn create_shipment(&self, _order: &OrderRecord) -> Result<String, GatewayError> {
            self.create_calls.fetch_add(1, Ordering::SeqCst);
            Ok("me_ship_1".to_string())
        }

        async fn generate_label(&self, _shipment_id: &str) -> Result<(), GatewayError> {
            Ok(())
        }

        async fn label_url(&self, _shipment_id: &str) -> Result<Option<String>, GatewayError> {
            Ok(None)
        }
    }

    fn pending_order(order_id: &str) -> OrderRecord {
        let draft = OrderContext {
            order_id: order_id.to_string(),
            external_reference: order_id.to_string(),
            customer: Customer {
                name: "Maria da Silva".to_string(),
                email: "maria@example.com".to_string(),
                phone: "11988887777".to_string(),
                tax_id: "12345678909".to_string(),
            },
            address: Address::default(),
            freight: FreightOption {
                service: "PAC".to_string(),
                service_code: "1".to_string(),
                carrier: "Correios".to_string(),
                price: dec!(15.50),
                delivery_time_days: 7,
            },
            items: vec![CartItem {
                id: "natucart-single".to_string(),
                name: "Natucart".to_string(),
                sku: "NATUCART-1".to_string(),
                unit_price: dec!(99.90),
                quantity: 1,
            }],
            totals: OrderTotals {
                subtotal: dec!(99.90),
                freight: dec!(15.50),
                total: dec!(115.40),
            },
            metadata: serde_json::Map::new(),
        };
        OrderRecord::from_draft(draft, Utc::now())
    }

    struct Harness {
        orders: Arc<dyn OrderStore>,
        store: Arc<MemoryOrderStore>,
        lookup: Arc<dyn PaymentLookup>,
        fulfillment: Arc<FulfillmentService>,
        carrier: Arc<CountingCarrier>,
    }

    fn harness(status: PaymentStatus, external_reference: Option<&str>) -> Harness {
        let store = Arc::new(MemoryOrderStore::new());
        let orders = Arc::clone(&store) as Arc<dyn OrderStore>;
        let carrier = Arc::new(CountingCarrier {
            create_calls: AtomicU32::new(0),
        });
        let fulfillment = Arc::new(FulfillmentService::new(
            Arc::clone(&carrier) as Arc<dyn ShipmentCarrier>,
            Arc::clone(&orders),
        ));
        Harness {
            orders,
            store,
            lookup: Arc::new(ScriptedLookup {
                status,
                external_reference: external_reference.map(str::to_string),
            }),
            fulfillment,
            carrier,
        }
    }

    #[tokio::test]
    async fn approved_notification_advances_order_and_ships() {
        let h = harness(PaymentStatus::Approved, Some("natucart_1_abc"));
        h.store.put(&pending_order("natucart_1_abc")).await.unwrap();

        let processed =
            process_payment_notification(&h.orders, &h.lookup, Some(&h.fulfillment), "7001")
                .await
                .unwrap();
        assert!(processed);

        let record = h.store.get("natucart_1_abc").await.unwrap().unwrap();
        assert_eq!(record.status, OrderStatus::ShippingCreated);
        assert_eq!(record.payment.unwrap().payment_id, "7001");
        assert_eq!(record.shipment.unwrap().shipment_id, "me_ship_1");
        assert_eq!(h.carrier.create_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn redelivered_notification_creates_exactly_one_shipment() {
        let h = harness(PaymentStatus::Approved, Some("natucart_1_abc"));
        h.store.put(&pending_order("natucart_1_abc")).await.unwrap();

        for _ in 0..3 {
            process_payment_notification(&h.orders, &h.lookup, Some(&h.fulfillment), "7001")
                .await
                .unwrap();
        }

        assert_eq!(h.carrier.create_calls.load(Ordering::SeqCst), 1);
        let record = h.store.get("natucart_1_abc").await.unwrap().unwrap();
        assert_eq!(record.status, OrderStatus::ShippingCreated);
    }

    #[tokio::test]
    async fn rejected_notification_marks_the_order_without_shipping() {
        let h = harness(PaymentStatus::Rejected, Some("natucart_1_abc"));
        h.store.put(&pending_order("natucart_1_abc")).await.unwrap();

        let processed =
            process_payment_notification(&h.orders, &h.lookup, Some(&h.fulfillment), "7002")
                .await
                .unwrap();
        assert!(processed);

        let record = h.store.get("natucart_1_abc").await.unwrap().unwrap();
        assert_eq!(record.status, OrderStatus::Rejected);
        assert!(record.shipment.is_none());
        assert_eq!(h.carrier.create_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn refund_after_shipping_keeps_shipping_created() {
        let h = harness(PaymentStatus::Refunded, Some("natucart_1_abc"));
        let mut order = pending_order("natucart_1_abc");
        order.transition(OrderStatus::Approved, Utc::now());
        order.transition(OrderStatus::ShippingCreated, Utc::now());
        h.store.put(&order).await.unwrap();

        process_payment_notification(&h.orders, &h.lookup, Some(&h.fulfillment), "7003")
            .await
            .unwrap();

        let record = h.store.get("natucart_1_abc").await.unwrap().unwrap();
        // The payment snapshot is recorded, the status never regresses.
        assert_eq!(record.status, OrderStatus::ShippingCreated);
        assert_eq!(record.payment.unwrap().status, "refunded");
    }

    #[tokio::test]
    async fn notification_for_unknown_order_is_not_processed() {
        let h = harness(PaymentStatus::Approved, Some("natucart_missing"));

        let processed =
            process_payment_notification(&h.orders, &h.lookup, Some(&h.fulfillment), "7004")
                .await
                .unwrap();
        assert!(!processed);
    }

    #[tokio::test]
    async fn payment_without_external_reference_is_not_processed() {
        let h = harness(PaymentStatus::Approved, None);

        let processed =
            process_payment_notification(&h.orders, &h.lookup, Some(&h.fulfillment), "7005")
                .await
                .unwrap();
        assert!(!processed);
    }

    #[test]
    fn notification_extracts_from_query() {
        let query: HashMap<String, String> = [
            ("topic".to_string(), "payment".to_string()),
            ("id".to_string(), "123".to_string()),
        ]
        .into_iter()
        .collect();
        let n = Notification::extract(&query, None);
        assert_eq!(n.topic.as_deref(), Some("payment"));
        assert_eq!(n.resource_id.as_deref(), Some("123"));
    }

    #[test]
    fn notification_extracts_from_v2_body() {
        let body = json!({
            "action": "payment.updated",
            "type": "payment",
            "data": { "id": 456 }
        });
        let n = Notification::extract(&HashMap::new(), Some(&body));
        assert_eq!(n.topic.as_deref(), Some("payment"));
        assert_eq!(n.resource_id.as_deref(), Some("456"));
    }

    #[test]
    fn query_wins_over_body() {
        let query: HashMap<String, String> = [
            ("type".to_string(), "payment".to_string()),
            ("data.id".to_string(), "111".to_string()),
        ]
        .into_iter()
        .collect();
        let body = json!({ "topic": "merchant_order", "id": "999" });
        let n = Notification::extract(&query, Some(&body));
        assert_eq!(n.topic.as_deref(), Some("payment"));
        assert_eq!(n.resource_id.as_deref(), Some("111"));
    }

    #[test]
    fn x_signature_parses_in_any_order() {
        assert_eq!(
            parse_x_signature("ts=1704908010,v1=abcdef"),
            Some(("1704908010".to_string(), "abcdef".to_string()))
        );
        assert_eq!(
            parse_x_signature("v1=abcdef, ts=1704908010"),
            Some(("1704908010".to_string(), "abcdef".to_string()))
        );
        assert_eq!(parse_x_signature("ts=1704908010"), None);
        assert_eq!(parse_x_signature("garbage"), None);
    }

    #[test]
    fn manifest_skips_absent_sections_and_lowercases_the_id() {
        assert_eq!(
            signature_manifest(Some("ABC123"), Some("req-1"), "17"),
            "id:abc123;request-id:req-1;ts:17;"
        );
        assert_eq!(signature_manifest(None, None, "17"), "ts:17;");
    }

    #[test]
    fn signature_roundtrip_matches() {
        let manifest = "id:123;ts:17;";
        let mut mac = HmacSha256::new_from_slice(b"secret").unwrap();
        mac.update(manifest.as_bytes());
        let hex = hex::encode(mac.finalize().into_bytes());
        assert!(signature_matches("secret", manifest, &hex));
        assert!(!signature_matches("secret", manifest, "deadbeef"));
        assert!(!signature_matches("other", manifest, &hex));
    }

    struct CountingStore {
        gets: AtomicU32,
        puts: AtomicU32,
    }

    #[async_trait]
    impl OrderStore for CountingStore {
        async fn get(
            &self,
            _order_id: &str,
        ) -> Result<Option<OrderRecord>, crate::store::StoreError> {
            self.gets.fetch_add(1, Ordering::SeqCst);
            Ok(None)
        }

        async fn put(&self, _record: &OrderRecord) -> Result<(), crate::store::StoreError> {
            self.puts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn merchant_order_topic_is_acknowledged_without_touching_the_store() {
        let store = Arc::new(CountingStore {
            gets: AtomicU32::new(0),
            puts: AtomicU32::new(0),
        });
        let state = AppState::new(
            crate::testutil::server_config(crate::config::CarrierChoice::MelhorEnvio),
            Arc::clone(&store) as Arc<dyn OrderStore>,
        )
        .unwrap();

        let mut query = HashMap::new();
        query.insert("topic".to_string(), "merchant_order".to_string());
        query.insert("id".to_string(), "5544332211".to_string());
        let Json(ack) = receive(State(state), Query(query), HeaderMap::new(), Bytes::new()).await;

        assert_eq!(ack.status, "ok");
        assert!(!ack.processed);
        assert_eq!(store.gets.load(Ordering::SeqCst), 0);
        assert_eq!(store.puts.load(Ordering::SeqCst), 0);
    }
}
