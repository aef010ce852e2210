//! Time-window availability calculation.
//!
//! How many units of an item are free over a window, after subtracting the
//! demand of every Reserved or CheckedOut order whose effective window
//! overlaps it. Availability is always computed live from the store - the
//! ledger is audit history, not a balance.

pub mod calculator;

pub use calculator::{
    AvailabilityError, AvailabilityRequest, BulkAvailability, ConflictingOrder, ItemAvailability,
    ItemAvailabilityCheck, LineConflict, check_item_availability, check_multiple, detect_conflicts,
};
