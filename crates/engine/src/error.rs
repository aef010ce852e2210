use thiserror::Error;

use rentforge_availability::{AvailabilityError, LineConflict};
use rentforge_bom::BomError;
use rentforge_core::{DomainError, ItemId, OrderId};
use rentforge_ledger::MovementError;
use rentforge_orders::OrderStatus;
use rentforge_store::StoreError;

/// Unified failure taxonomy at the engine boundary.
///
/// Every kind is structured so callers can map it to a distinct response:
/// nothing is retried here, because a reservation conflict is a normal
/// business outcome, not a transient fault. Only `Store` wraps backend
/// failures, surfaced unchanged for the caller to treat as fatal.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("item {0} not found")]
    ItemNotFound(ItemId),

    #[error("order {0} not found")]
    OrderNotFound(OrderId),

    #[error("illegal transition {from} -> {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    /// One entry per under-available line, each carrying its shortfall and
    /// the overlapping orders behind it.
    #[error("availability conflict on {} line(s)", .conflicts.len())]
    AvailabilityConflict { conflicts: Vec<LineConflict> },

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Movement(#[from] MovementError),

    #[error(transparent)]
    Bom(BomError),

    #[error(transparent)]
    Availability(AvailabilityError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<BomError> for EngineError {
    fn from(value: BomError) -> Self {
        match value {
            BomError::ItemNotFound(id) => EngineError::ItemNotFound(id),
            BomError::Store(e) => EngineError::Store(e),
            other => EngineError::Bom(other),
        }
    }
}

impl From<AvailabilityError> for EngineError {
    fn from(value: AvailabilityError) -> Self {
        match value {
            AvailabilityError::ItemNotFound(id) => EngineError::ItemNotFound(id),
            AvailabilityError::Store(e) => EngineError::Store(e),
            AvailabilityError::Bom(e) => EngineError::from(e),
            other => EngineError::Availability(other),
        }
    }
}
