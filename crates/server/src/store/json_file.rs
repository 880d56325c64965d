//! One-JSON-file-per-order store.
//!
//! Records live at `<dir>/<order_id>.json`. Writes go to a temp file in the
//! same directory and are renamed into place, so a crash mid-write never
//! leaves a truncated record behind.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use natucart_core::OrderRecord;
use tracing::instrument;

use super::{OrderStore, StoreError};

/// Order store backed by a directory of JSON files.
pub struct JsonFileOrderStore {
    dir: PathBuf,
}

impl JsonFileOrderStore {
    /// Open (and create if needed) the store directory.
    ///
    /// # Errors
    ///
    /// Fails if the directory cannot be created.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    fn record_path(&self, order_id: &str) -> PathBuf {
        self.dir.join(format!("{order_id}.json"))
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl OrderStore for JsonFileOrderStore {
    #[instrument(skip(self))]
    async fn get(&self, order_id: &str) -> Result<Option<OrderRecord>, StoreError> {
        super::validate_order_id(order_id)?;
        let path = self.record_path(order_id);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    #[instrument(skip_all, fields(order_id = %record.order_id))]
    async fn put(&self, record: &OrderRecord) -> Result<(), StoreError> {
        super::validate_order_id(&record.order_id)?;
        let json = serde_json::to_vec_pretty(record)?;
        let path = self.record_path(&record.order_id);
        let tmp = self.dir.join(format!(".{}.tmp", record.order_id));
        tokio::fs::write(&tmp, &json).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;
    use natucart_core::{
        Address, CartItem, Customer, FreightOption, OrderContext, OrderStatus, OrderTotals,
        PaymentRecord,
    };
    use rust_decimal_macros::dec;

    use super::*;

    fn record(order_id: &str) -> OrderRecord {
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
                id: "natucart-trio".to_string(),
                name: "Natucart - 3 Frascos".to_string(),
                sku: "NATUCART-3".to_string(),
                unit_price: dec!(85.00),
                quantity: 3,
            }],
            totals: OrderTotals {
                subtotal: dec!(255.00),
                freight: dec!(15.50),
                total: dec!(270.50),
            },
            metadata: serde_json::Map::new(),
        };
        OrderRecord::from_draft(draft, Utc::now())
    }

    #[tokio::test]
    async fn round_trips_through_the_filesystem() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileOrderStore::open(dir.path()).await.unwrap();

        let record = record("natucart_1700000000000_a1B2c3D4e");
        store.put(&record).await.unwrap();

        let reread = store
            .get("natucart_1700000000000_a1B2c3D4e")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reread, record);
        assert_eq!(reread.totals.total, dec!(270.50));
    }

    #[tokio::test]
    async fn missing_record_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileOrderStore::open(dir.path()).await.unwrap();
        assert!(store.get("natucart_1_missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_merges_payment_without_dropping_draft_fields() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileOrderStore::open(dir.path()).await.unwrap();
        store.put(&record("natucart_1_abc")).await.unwrap();

        let now = Utc::now();
        store
            .update("natucart_1_abc", &move |rec| {
                rec.payment = Some(PaymentRecord {
                    payment_id: "12345".to_string(),
                    status: "approved".to_string(),
                    status_detail: Some("accredited".to_string()),
                    payment_method_id: Some("pix".to_string()),
                    amount: Some(dec!(270.50)),
                    approved_at: Some(now),
                });
                rec.transition(OrderStatus::Approved, now);
            })
            .await
            .unwrap()
            .unwrap();

        let reread = store.get("natucart_1_abc").await.unwrap().unwrap();
        assert_eq!(reread.status, OrderStatus::Approved);
        assert_eq!(reread.payment.unwrap().payment_id, "12345");
        // Draft fields survived the merge.
        assert_eq!(reread.customer.name, "Maria da Silva");
        assert_eq!(reread.items.len(), 1);
    }

    #[tokio::test]
    async fn traversal_ids_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileOrderStore::open(dir.path()).await.unwrap();
        let err = store.get("../../etc/passwd").await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidOrderId(_)));
    }
}
