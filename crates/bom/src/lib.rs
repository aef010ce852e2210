//! Bill-of-materials graph validation.
//!
//! The component graph lives in the store as parent→child id edges; every
//! traversal here re-fetches children by id, so no cyclic in-memory structure
//! ever exists. This crate keeps the graph acyclic and derives composite
//! stock from it.

pub mod graph;

pub use graph::{
    BomError, BomReport, composite_availability, composite_on_hand, detect_cycle,
    find_existing_cycle, validate_bom_structure,
};
