//! In-memory order store, used by tests and available for local runs.

use std::collections::HashMap;

use async_trait::async_trait;
use natucart_core::OrderRecord;
use tokio::sync::RwLock;

use super::{OrderStore, StoreError};

/// Order store backed by a process-local map.
#[derive(Default)]
pub struct MemoryOrderStore {
    records: RwLock<HashMap<String, OrderRecord>>,
}

impl MemoryOrderStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Whether the store holds no records.
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn get(&self, order_id: &str) -> Result<Option<OrderRecord>, StoreError> {
        Ok(self.records.read().await.get(order_id).cloned())
    }

    async fn put(&self, record: &OrderRecord) -> Result<(), StoreError> {
        super::validate_order_id(&record.order_id)?;
        self.records
            .write()
            .await
            .insert(record.order_id.clone(), record.clone());
        Ok(())
    }
}
