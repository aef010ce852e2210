use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

use rentforge_catalog::{ComponentEdge, Item};
use rentforge_core::{ItemId, OrderId};
use rentforge_ledger::StockMovement;
use rentforge_orders::{Order, OrderLine, OrderStatus};

/// Store operation error.
///
/// Infrastructure failures only (storage, constraints, corruption). Domain
/// failures never originate here; callers compose this into their own error
/// types via `From`.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Internal lock poisoning (in-memory adapter).
    #[error("store lock poisoned")]
    LockPoisoned,

    /// A write targeted a row that does not exist.
    #[error("missing row: {0}")]
    MissingRow(String),

    /// A database constraint rejected the write.
    #[error("constraint violation: {0}")]
    Constraint(String),

    /// Persisted data failed to round-trip back into a domain value.
    #[error("corrupt row: {0}")]
    CorruptRow(String),

    /// Backend failure (connectivity, protocol). Surfaced unchanged; retry
    /// policy belongs to the caller's caller.
    #[error("backend failure: {0}")]
    Backend(String),
}

/// Read operations available inside any unit of work.
///
/// This is the whole contract the graph traversal and availability code see:
/// entities are fetched by id, children are re-fetched per node, and demand
/// comes from a parameterized overlap query - never from an in-memory object
/// graph.
pub trait StoreReader {
    fn item(&self, id: ItemId) -> Result<Option<Item>, StoreError>;

    /// BOM edges of `parent_id`, in their stored order. Empty for unknown or
    /// non-composite items.
    fn components_of(&self, parent_id: ItemId) -> Result<Vec<ComponentEdge>, StoreError>;

    fn order(&self, id: OrderId) -> Result<Option<Order>, StoreError>;

    /// Lines of an order, in line-number order.
    fn lines_of(&self, order_id: OrderId) -> Result<Vec<OrderLine>, StoreError>;

    /// Lines for `item_id` belonging to stock-holding orders (Reserved or
    /// CheckedOut) whose effective window overlaps `[start, end]`
    /// (inclusive), paired with their orders. `exclude` omits one order from
    /// the result - used when validating that order's own transition.
    fn active_lines_overlapping(
        &self,
        item_id: ItemId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude: Option<OrderId>,
    ) -> Result<Vec<(Order, OrderLine)>, StoreError>;

    /// All ledger rows for an item, oldest first.
    fn movements_for_item(&self, item_id: ItemId) -> Result<Vec<StockMovement>, StoreError>;
}

/// Write operations available inside a transaction.
///
/// The ledger is append-only by construction: there is no way to update or
/// delete a movement through this interface.
pub trait StoreWriter: StoreReader {
    fn put_item(&mut self, item: Item) -> Result<(), StoreError>;

    /// Set an Atomic item's on-hand count.
    fn set_quantity_on_hand(&mut self, id: ItemId, quantity: i64) -> Result<(), StoreError>;

    /// Insert a BOM edge, or replace its required quantity if it exists.
    fn upsert_component(&mut self, edge: ComponentEdge) -> Result<(), StoreError>;

    /// Remove a BOM edge. Returns whether it existed.
    fn remove_component(&mut self, parent_id: ItemId, child_id: ItemId)
    -> Result<bool, StoreError>;

    fn put_order(&mut self, order: Order) -> Result<(), StoreError>;

    fn update_order_status(&mut self, id: OrderId, status: OrderStatus) -> Result<(), StoreError>;

    fn put_line(&mut self, line: OrderLine) -> Result<(), StoreError>;

    /// Remove one line. Returns whether it existed.
    fn remove_line(&mut self, order_id: OrderId, line_no: u32) -> Result<bool, StoreError>;

    /// Delete an order and its lines. The lifecycle engine only calls this
    /// for Draft orders.
    fn delete_order(&mut self, id: OrderId) -> Result<(), StoreError>;

    fn append_movement(&mut self, movement: StockMovement) -> Result<(), StoreError>;
}

/// A store that can scope work into read-only and transactional units.
///
/// `transaction` runs the closure against a transactional writer: if the
/// closure returns `Err`, every write it made is rolled back. The store's
/// transaction isolation is the sole serialization point for concurrent
/// transitions (no in-process locking is layered on top), which is why an
/// availability check and the writes it guards must share one closure.
pub trait RentalStore: Send + Sync {
    fn read<R, E>(&self, f: impl FnOnce(&dyn StoreReader) -> Result<R, E>) -> Result<R, E>
    where
        E: From<StoreError>;

    fn transaction<R, E>(&self, f: impl FnOnce(&mut dyn StoreWriter) -> Result<R, E>) -> Result<R, E>
    where
        E: From<StoreError>;
}

impl<S> RentalStore for Arc<S>
where
    S: RentalStore,
{
    fn read<R, E>(&self, f: impl FnOnce(&dyn StoreReader) -> Result<R, E>) -> Result<R, E>
    where
        E: From<StoreError>,
    {
        (**self).read(f)
    }

    fn transaction<R, E>(&self, f: impl FnOnce(&mut dyn StoreWriter) -> Result<R, E>) -> Result<R, E>
    where
        E: From<StoreError>,
    {
        (**self).transaction(f)
    }
}
