//! Stock ledger domain module: the append-only movement audit trail.
//!
//! Pure domain logic only: validation rules for movement rows and the
//! reconciliation report type. Persistence is the store's concern; rows are
//! never updated or deleted once written.

pub mod movement;

pub use movement::{MovementError, MovementReason, StockMovement, StockReconciliation};
