//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are **immutable** and **compared by value** - two with the
/// same attributes are the same value. To "modify" one, construct a new one;
/// construction is where their internal ordering rules are enforced.
///
/// Example: a rental window is a value object (any `[start, due]` pair with
/// the same bounds is interchangeable); an order is an entity (two orders with
/// identical fields are still distinct orders).
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
