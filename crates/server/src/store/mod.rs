//! Order record persistence.
//!
//! Two implementations: an in-memory map for tests and a one-JSON-file-per-
//! order directory store for production. Writers go through
//! [`OrderStore::update`], a read-modify-write that merges into the stored
//! record instead of replacing it blindly.

mod json_file;
mod memory;

pub use json_file::JsonFileOrderStore;
pub use memory::MemoryOrderStore;

use async_trait::async_trait;
use natucart_core::OrderRecord;
use thiserror::Error;

/// Errors from the order store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("order id {0:?} is not storable")]
    InvalidOrderId(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt order record: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Where order records live.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Fetch a record by order id.
    ///
    /// # Errors
    ///
    /// Storage failures; an absent record is `Ok(None)`.
    async fn get(&self, order_id: &str) -> Result<Option<OrderRecord>, StoreError>;

    /// Insert or overwrite a record.
    ///
    /// # Errors
    ///
    /// Storage failures.
    async fn put(&self, record: &OrderRecord) -> Result<(), StoreError>;

    /// Read-modify-write an existing record.
    ///
    /// Returns the updated record, or `None` if no record exists for
    /// `order_id`. The closure mutates in place; the store persists the
    /// result.
    ///
    /// # Errors
    ///
    /// Storage failures on either side of the closure.
    async fn update(
        &self,
        order_id: &str,
        apply: &(dyn for<'a> Fn(&'a mut OrderRecord) + Send + Sync),
    ) -> Result<Option<OrderRecord>, StoreError> {
        let Some(mut record) = self.get(order_id).await? else {
            return Ok(None);
        };
        apply(&mut record);
        self.put(&record).await?;
        Ok(Some(record))
    }
}

/// Order ids become file names; keep them to a safe alphabet.
pub(crate) fn validate_order_id(order_id: &str) -> Result<(), StoreError> {
    let ok = !order_id.is_empty()
        && order_id.len() <= 128
        && order_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if ok {
        Ok(())
    } else {
        Err(StoreError::InvalidOrderId(order_id.to_string()))
    }
}
