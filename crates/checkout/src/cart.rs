//! Cart store for one browsing session.
//!
//! A single-owner, single-thread store: every mutating call synchronously
//! recomputes totals, persists the full state, and notifies subscribers with
//! the new snapshot, in registration order. There is no locking because
//! there is no suspension between read and write.

use natucart_core::{CartItem, CartSnapshot, FreightOption};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::catalog::Catalog;

/// The persisted portion of the cart state. Totals are derived, not stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PersistedCart {
    pub items: Vec<CartItem>,
    pub freight: Option<FreightOption>,
}

/// Where the cart state survives between sessions.
///
/// Persistence is best-effort: a failing store is logged and ignored, the
/// in-memory cart stays authoritative.
pub trait CartStateStore {
    /// Load the previously saved state, if any.
    fn load(&self) -> Option<PersistedCart>;
    /// Save the current state.
    ///
    /// # Errors
    ///
    /// Returns an I/O error when the backing storage is unavailable.
    fn save(&self, state: &PersistedCart) -> std::io::Result<()>;
}

/// JSON-file-backed cart state, the local-storage analog.
#[derive(Debug)]
pub struct JsonFileCartState {
    path: std::path::PathBuf,
}

impl JsonFileCartState {
    #[must_use]
    pub fn new(path: impl Into<std::path::PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CartStateStore for JsonFileCartState {
    fn load(&self) -> Option<PersistedCart> {
        let raw = std::fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str(&raw) {
            Ok(state) => Some(state),
            Err(err) => {
                tracing::warn!("Discarding unreadable cart state: {err}");
                None
            }
        }
    }

    fn save(&self, state: &PersistedCart) -> std::io::Result<()> {
        let raw = serde_json::to_string_pretty(state).map_err(std::io::Error::other)?;
        std::fs::write(&self.path, raw)
    }
}

/// Handle returned by [`CartStore::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

type Subscriber = Box<dyn FnMut(&CartSnapshot)>;

/// The cart for the active browsing session.
pub struct CartStore {
    catalog: Catalog,
    items: Vec<CartItem>,
    freight: Option<FreightOption>,
    subtotal: Decimal,
    total: Decimal,
    persistence: Option<Box<dyn CartStateStore>>,
    subscribers: Vec<(SubscriberId, Subscriber)>,
    next_subscriber: u64,
}

impl CartStore {
    /// Create a store without persistence.
    #[must_use]
    pub fn new(catalog: Catalog) -> Self {
        Self {
            catalog,
            items: Vec::new(),
            freight: None,
            subtotal: Decimal::ZERO,
            total: Decimal::ZERO,
            persistence: None,
            subscribers: Vec::new(),
            next_subscriber: 0,
        }
    }

    /// Create a store that loads from and saves to `persistence`.
    #[must_use]
    pub fn with_persistence(catalog: Catalog, persistence: Box<dyn CartStateStore>) -> Self {
        let mut store = Self::new(catalog);
        if let Some(saved) = persistence.load() {
            store.items = saved.items;
            store.freight = saved.freight;
        }
        store.persistence = Some(persistence);
        store.recompute();
        store
    }

    /// Current snapshot of items and totals.
    #[must_use]
    pub fn snapshot(&self) -> CartSnapshot {
        CartSnapshot {
            items: self.items.clone(),
            subtotal: self.subtotal,
            freight: self.freight.clone(),
            total: self.total,
        }
    }

    /// Add `quantity` units of a catalog product.
    ///
    /// An unknown product id is a logged no-op, not an error: lookups are
    /// local and a stale button is not worth crashing the page over.
    pub fn add_item(&mut self, product_id: &str, quantity: u32) {
        if quantity == 0 {
            return;
        }
        let Some(product) = self.catalog.get(product_id) else {
            tracing::warn!(product_id, "Product not in catalog, ignoring add");
            return;
        };

        if let Some(line) = self.items.iter_mut().find(|item| item.id == product_id) {
            line.quantity += quantity;
        } else {
            self.items.push(CartItem {
                id: product.id.to_string(),
                name: product.name.to_string(),
                sku: product.sku.to_string(),
                unit_price: product.price,
                quantity,
            });
        }
        self.apply();
    }

    /// Remove a line entirely. Removing an absent id is a silent no-op and
    /// fires no notification.
    pub fn remove_item(&mut self, product_id: &str) {
        let before = self.items.len();
        self.items.retain(|item| item.id != product_id);
        if self.items.len() != before {
            self.apply();
        }
    }

    /// Set a line to an exact quantity; zero removes the line.
    pub fn update_quantity(&mut self, product_id: &str, quantity: u32) {
        if quantity == 0 {
            self.remove_item(product_id);
            return;
        }
        if let Some(line) = self.items.iter_mut().find(|item| item.id == product_id) {
            line.quantity = quantity;
            self.apply();
        }
    }

    /// Bind or clear the selected freight option.
    ///
    /// Quoting never calls this; binding is always an explicit caller
    /// decision among the quoted candidates.
    pub fn set_freight(&mut self, freight: Option<FreightOption>) {
        self.freight = freight;
        self.apply();
    }

    /// Empty the cart and drop the selected freight.
    pub fn clear(&mut self) {
        self.items.clear();
        self.freight = None;
        self.apply();
    }

    /// Register a change subscriber. The callback is invoked immediately
    /// with the current snapshot, then after every mutation, in
    /// registration order.
    pub fn subscribe(&mut self, mut callback: impl FnMut(&CartSnapshot) + 'static) -> SubscriberId {
        let id = SubscriberId(self.next_subscriber);
        self.next_subscriber += 1;
        callback(&self.snapshot());
        self.subscribers.push((id, Box::new(callback)));
        id
    }

    /// Remove a subscriber. Returns `false` when the id was already gone.
    pub fn unsubscribe(&mut self, id: SubscriberId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sid, _)| *sid != id);
        self.subscribers.len() != before
    }

    /// Recompute, persist, notify. Every mutation funnels through here.
    fn apply(&mut self) {
        self.recompute();
        self.persist();
        self.notify();
    }

    fn recompute(&mut self) {
        self.subtotal = self.items.iter().map(CartItem::line_total).sum();
        let freight_price = self.freight.as_ref().map_or(Decimal::ZERO, |f| f.price);
        self.total = self.subtotal + freight_price;
    }

    fn persist(&self) {
        let Some(persistence) = &self.persistence else {
            return;
        };
        let state = PersistedCart {
            items: self.items.clone(),
            freight: self.freight.clone(),
        };
        if let Err(err) = persistence.save(&state) {
            tracing::warn!("Failed to persist cart state: {err}");
        }
    }

    fn notify(&mut self) {
        let snapshot = CartSnapshot {
            items: self.items.clone(),
            subtotal: self.subtotal,
            freight: self.freight.clone(),
            total: self.total,
        };
        for (_, callback) in &mut self.subscribers {
            callback(&snapshot);
        }
    }
}
