//! Change notification plumbing.
//!
//! The engine publishes a notification after every committed mutation so that
//! external layers (calendar caches, search indexes) can invalidate their
//! state. This crate owns the mechanics only: the `Event` contract and a
//! transport-agnostic pub/sub bus. The core never owns caches.

pub mod bus;
pub mod event;

pub use bus::{EventBus, InMemoryBusError, InMemoryEventBus, Subscription};
pub use event::Event;
