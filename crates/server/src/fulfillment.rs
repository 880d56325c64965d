//! Fulfillment trigger: approved order to carrier shipment.
//!
//! Runs at most once per order. The shipment id is the idempotency marker;
//! a redelivered approval webhook finds it on the record and skips. Label
//! generation failures are logged and swallowed, the shipment itself is
//! what matters for the order lifecycle.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use natucart_core::{OrderRecord, OrderStatus, ShipmentRecord};
use tracing::instrument;

use crate::gateways::GatewayError;
use crate::store::{OrderStore, StoreError};

/// Creates shipments and labels at the carrier.
#[async_trait]
pub trait ShipmentCarrier: Send + Sync {
    /// Create a shipment for the order, returning the carrier-side id.
    ///
    /// # Errors
    ///
    /// Upstream transport or status failures.
    async fn create_shipment(&self, order: &OrderRecord) -> Result<String, GatewayError>;

    /// Generate the label for an existing shipment.
    ///
    /// # Errors
    ///
    /// Upstream transport or status failures.
    async fn generate_label(&self, shipment_id: &str) -> Result<(), GatewayError>;

    /// Printable label URL for a generated label.
    ///
    /// # Errors
    ///
    /// Upstream transport or status failures.
    async fn label_url(&self, shipment_id: &str) -> Result<Option<String>, GatewayError>;
}

/// Errors from the fulfillment trigger.
#[derive(Debug, thiserror::Error)]
pub enum FulfillmentError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Carrier(#[from] GatewayError),
}

/// Turns approved orders into carrier shipments.
pub struct FulfillmentService {
    carrier: Arc<dyn ShipmentCarrier>,
    store: Arc<dyn OrderStore>,
}

impl FulfillmentService {
    #[must_use]
    pub fn new(carrier: Arc<dyn ShipmentCarrier>, store: Arc<dyn OrderStore>) -> Self {
        Self { carrier, store }
    }

    /// Create the shipment for an approved order, once.
    ///
    /// Returns the shipment record, or `None` when the order already has
    /// one (redelivery) or is not in a fulfillable status.
    ///
    /// # Errors
    ///
    /// Shipment creation and store failures propagate; label failures do
    /// not.
    #[instrument(skip_all, fields(order_id = %order.order_id))]
    pub async fn fulfill(
        &self,
        order: &OrderRecord,
    ) -> Result<Option<ShipmentRecord>, FulfillmentError> {
        if order.shipment.is_some() {
            tracing::info!("order already has a shipment, skipping");
            return Ok(None);
        }
        if !matches!(order.status, OrderStatus::Approved) {
            tracing::warn!(status = %order.status, "order not fulfillable, skipping");
            return Ok(None);
        }

        let shipment_id = self.carrier.create_shipment(order).await?;
        tracing::info!(%shipment_id, "shipment created");

        // Best-effort: a shipment without a label can be re-labeled from the
        // carrier panel, so label failures must not fail fulfillment.
        let label_url = self.label(&shipment_id).await;

        let shipment = ShipmentRecord {
            shipment_id,
            label_url,
            created_at: Utc::now(),
        };

        let persisted = shipment.clone();
        self.store
            .update(&order.order_id, &move |record| {
                if record.shipment.is_none() {
                    record.shipment = Some(persisted.clone());
                }
                record.transition(OrderStatus::ShippingCreated, Utc::now());
            })
            .await?;

        Ok(Some(shipment))
    }

    async fn label(&self, shipment_id: &str) -> Option<String> {
        if let Err(err) = self.carrier.generate_label(shipment_id).await {
            tracing::warn!(%shipment_id, error = %err, "label generation failed");
            return None;
        }
        match self.carrier.label_url(shipment_id).await {
            Ok(url) => url,
            Err(err) => {
                tracing::warn!(%shipment_id, error = %err, "label url fetch failed");
                None
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use natucart_core::{
        Address, CartItem, Customer, FreightOption, OrderContext, OrderTotals,
    };
    use rust_decimal_macros::dec;

    use super::*;
    use crate::store::MemoryOrderStore;

    struct ScriptedCarrier {
        create_calls: AtomicU32,
        fail_create: bool,
        fail_label: bool,
    }

    impl ScriptedCarrier {
        fn ok() -> Self {
            Self {
                create_calls: AtomicU32::new(0),
                fail_create: false,
                fail_label: false,
            }
        }
    }

    #[async_trait]
    impl ShipmentCarrier for ScriptedCarrier {
        async fn create_shipment(&self, _order: &OrderRecord) -> Result<String, GatewayError> {
            self.create_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_create {
                return Err(GatewayError::Unexpected("carrier down".to_string()));
            }
            Ok("me_abc123".to_string())
        }

        async fn generate_label(&self, _shipment_id: &str) -> Result<(), GatewayError> {
            if self.fail_label {
                return Err(GatewayError::Unexpected("label failed".to_string()));
            }
            Ok(())
        }

        async fn label_url(&self, shipment_id: &str) -> Result<Option<String>, GatewayError> {
            Ok(Some(format!(
                "https://melhorenvio.com.br/labels/{shipment_id}.pdf"
            )))
        }
    }

    fn approved_order(order_id: &str) -> OrderRecord {
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
        let mut record = OrderRecord::from_draft(draft, Utc::now());
        record.transition(OrderStatus::Approved, Utc::now());
        record
    }

    async fn service(
        carrier: ScriptedCarrier,
    ) -> (FulfillmentService, Arc<ScriptedCarrier>, Arc<MemoryOrderStore>) {
        let carrier = Arc::new(carrier);
        let store = Arc::new(MemoryOrderStore::new());
        (
            FulfillmentService::new(
                Arc::clone(&carrier) as Arc<dyn ShipmentCarrier>,
                Arc::clone(&store) as Arc<dyn OrderStore>,
            ),
            carrier,
            store,
        )
    }

    #[tokio::test]
    async fn fulfillment_records_shipment_and_advances_status() {
        let (service, _, store) = service(ScriptedCarrier::ok()).await;
        let order = approved_order("natucart_1_abc");
        store.put(&order).await.unwrap();

        let shipment = service.fulfill(&order).await.unwrap().unwrap();
        assert_eq!(shipment.shipment_id, "me_abc123");
        assert_eq!(
            shipment.label_url.as_deref(),
            Some("https://melhorenvio.com.br/labels/me_abc123.pdf")
        );

        let stored = store.get("natucart_1_abc").await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::ShippingCreated);
        assert_eq!(stored.shipment.unwrap().shipment_id, "me_abc123");
    }

    #[tokio::test]
    async fn existing_shipment_short_circuits() {
        let (service, carrier, store) = service(ScriptedCarrier::ok()).await;
        let mut order = approved_order("natucart_1_abc");
        order.shipment = Some(ShipmentRecord {
            shipment_id: "me_existing".to_string(),
            label_url: None,
            created_at: Utc::now(),
        });
        store.put(&order).await.unwrap();

        let result = service.fulfill(&order).await.unwrap();
        assert!(result.is_none());
        assert_eq!(carrier.create_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn label_failure_is_not_fatal() {
        let (service, _, store) = service(ScriptedCarrier {
            create_calls: AtomicU32::new(0),
            fail_create: false,
            fail_label: true,
        })
        .await;
        let order = approved_order("natucart_1_abc");
        store.put(&order).await.unwrap();

        let shipment = service.fulfill(&order).await.unwrap().unwrap();
        assert_eq!(shipment.shipment_id, "me_abc123");
        assert!(shipment.label_url.is_none());

        let stored = store.get("natucart_1_abc").await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::ShippingCreated);
    }

    #[tokio::test]
    async fn carrier_failure_leaves_the_order_approved() {
        let (service, _, store) = service(ScriptedCarrier {
            create_calls: AtomicU32::new(0),
            fail_create: true,
            fail_label: false,
        })
        .await;
        let order = approved_order("natucart_1_abc");
        store.put(&order).await.unwrap();

        let err = service.fulfill(&order).await.unwrap_err();
        assert!(matches!(err, FulfillmentError::Carrier(_)));

        let stored = store.get("natucart_1_abc").await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Approved);
        assert!(stored.shipment.is_none());
    }

    #[tokio::test]
    async fn pending_orders_are_not_fulfilled() {
        let (service, carrier, store) = service(ScriptedCarrier::ok()).await;
        let draft_order = {
            let mut order = approved_order("natucart_1_abc");
            order.status = OrderStatus::PendingPayment;
            order
        };
        store.put(&draft_order).await.unwrap();

        let result = service.fulfill(&draft_order).await.unwrap();
        assert!(result.is_none());
        assert_eq!(carrier.create_calls.load(Ordering::SeqCst), 0);
    }
}
