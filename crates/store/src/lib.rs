//! Backing-store abstraction and adapters.
//!
//! The engine consumes persistence through `RentalStore`: closure-scoped
//! reads and transactions over object-safe `StoreReader`/`StoreWriter`
//! sessions. Two adapters ship here: an in-memory store (tests/dev) and a
//! Postgres store (production). Both give a transition's availability check
//! and its ledger writes one atomic unit of work.

pub mod in_memory;
pub mod postgres;
pub mod traits;

pub use in_memory::InMemoryStore;
pub use postgres::PgStore;
pub use traits::{RentalStore, StoreError, StoreReader, StoreWriter};
