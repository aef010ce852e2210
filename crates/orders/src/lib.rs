//! Rental orders domain module: orders, lines, windows, and the status graph.
//!
//! Pure domain logic only: no IO, no HTTP, no persistence concerns.

pub mod order;
pub mod window;

pub use order::{Order, OrderLine, OrderStatus};
pub use window::RentalWindow;
