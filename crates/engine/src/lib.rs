//! The reservation and order-lifecycle engine.
//!
//! `RentalEngine` is the service boundary the (out-of-scope) HTTP layer
//! consumes: order status transitions, manual stock adjustments, BOM edge
//! mutation, draft order management, and availability queries. Every mutation
//! runs as one store transaction; a change notification goes out on the bus
//! only after commit.

pub mod change;
pub mod components;
pub mod drafts;
pub mod error;
pub mod inventory;
pub mod lifecycle;


use tracing::warn;

use rentforge_events::EventBus;
use rentforge_store::RentalStore;

pub use change::ChangeEvent;
pub use error::EngineError;
pub use lifecycle::{BulkTransitionOutcome, TransitionOutcome};

/// Orchestrates the domain crates over a store and a notification bus.
///
/// Generic over both so tests run against the in-memory pair and production
/// wires the Postgres store; the engine itself contains no IO.
#[derive(Debug)]
pub struct RentalEngine<S, B> {
    store: S,
    bus: B,
}

impl<S, B> RentalEngine<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self { store, bus }
    }

    pub fn into_parts(self) -> (S, B) {
        (self.store, self.bus)
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

impl<S, B> RentalEngine<S, B>
where
    S: RentalStore,
    B: EventBus<ChangeEvent>,
{
    /// Post-commit notification. The change is already durable, so a publish
    /// failure is logged and swallowed - subscribers re-read the store anyway.
    pub(crate) fn publish(&self, event: ChangeEvent) {
        if let Err(e) = self.bus.publish(event) {
            warn!(error = ?e, "change notification dropped");
        }
    }
}
