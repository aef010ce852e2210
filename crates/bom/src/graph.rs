use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use rentforge_catalog::{ComponentEdge, ItemKind};
use rentforge_core::ItemId;
use rentforge_store::{StoreError, StoreReader};

/// BOM graph failure.
#[derive(Debug, Error)]
pub enum BomError {
    #[error("item {0} not found")]
    ItemNotFound(ItemId),

    #[error("item {0} cannot be a component of itself")]
    SelfReference(ItemId),

    #[error("item {0} is not a composite")]
    NotComposite(ItemId),

    #[error("component {0} is not atomic")]
    NotAtomic(ItemId),

    /// The offending traversal path, child-end first, is carried for
    /// operator diagnostics.
    #[error("component edge would create a cycle ({} nodes on path)", .path.len())]
    CycleDetected { path: Vec<ItemId> },

    #[error("no component edge from {parent_id} to {child_id}")]
    ComponentNotFound { parent_id: ItemId, child_id: ItemId },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Would adding the edge `parent_id → child_id` close a cycle?
///
/// Depth-first search from `child_id` looking for `parent_id`. Returns the
/// traversal path `child_id → … → parent_id` when reachable, `None` when the
/// edge is safe. A *visited* set marks nodes fully explored (never worth
/// re-exploring), and the current path acts as the recursion stack: a child
/// already on it signals a pre-existing cycle and is not descended into.
/// Diamond-shaped BOMs (re-converging but acyclic) therefore never yield a
/// false positive.
pub fn detect_cycle(
    reader: &(impl StoreReader + ?Sized),
    parent_id: ItemId,
    child_id: ItemId,
) -> Result<Option<Vec<ItemId>>, BomError> {
    if parent_id == child_id {
        return Ok(Some(vec![child_id]));
    }
    let mut visited = HashSet::new();
    let mut stack = Vec::new();
    search(reader, child_id, parent_id, &mut visited, &mut stack)
}

fn search(
    reader: &(impl StoreReader + ?Sized),
    node: ItemId,
    target: ItemId,
    visited: &mut HashSet<ItemId>,
    stack: &mut Vec<ItemId>,
) -> Result<Option<Vec<ItemId>>, BomError> {
    stack.push(node);
    for edge in reader.components_of(node)? {
        let child = edge.child_id;
        if child == target {
            let mut path = stack.clone();
            path.push(child);
            return Ok(Some(path));
        }
        if stack.contains(&child) || visited.contains(&child) {
            continue;
        }
        if let Some(path) = search(reader, child, target, visited, stack)? {
            return Ok(Some(path));
        }
    }
    stack.pop();
    visited.insert(node);
    Ok(None)
}

/// Find a cycle already present in the graph, reachable from `start`.
///
/// Returns the closed path (first node repeated at the end) if one exists.
/// Used by structure validation; a healthy store never has one.
pub fn find_existing_cycle(
    reader: &(impl StoreReader + ?Sized),
    start: ItemId,
) -> Result<Option<Vec<ItemId>>, BomError> {
    let mut visited = HashSet::new();
    let mut stack = Vec::new();
    walk_for_cycle(reader, start, &mut visited, &mut stack)
}

fn walk_for_cycle(
    reader: &(impl StoreReader + ?Sized),
    node: ItemId,
    visited: &mut HashSet<ItemId>,
    stack: &mut Vec<ItemId>,
) -> Result<Option<Vec<ItemId>>, BomError> {
    stack.push(node);
    for edge in reader.components_of(node)? {
        let child = edge.child_id;
        if let Some(pos) = stack.iter().position(|&n| n == child) {
            let mut cycle = stack[pos..].to_vec();
            cycle.push(child);
            return Ok(Some(cycle));
        }
        if visited.contains(&child) {
            continue;
        }
        if let Some(cycle) = walk_for_cycle(reader, child, visited, stack)? {
            return Ok(Some(cycle));
        }
    }
    stack.pop();
    visited.insert(node);
    Ok(None)
}

/// How many complete sets the given components allow.
///
/// For each component, `possible_sets = floor(child_available / required)`;
/// the result is the minimum across components. Components with a required
/// quantity ≤ 0 are skipped; if nothing valid contributes, the result is 0.
/// The caller supplies child availability, which is how the time-window
/// calculator plugs windowed child stock into the same arithmetic.
pub fn composite_availability<E>(
    components: &[ComponentEdge],
    child_available: &mut dyn FnMut(ItemId) -> Result<i64, E>,
) -> Result<i64, E> {
    let mut min_sets: Option<i64> = None;
    for edge in components {
        if edge.required_quantity <= 0 {
            continue;
        }
        let available = child_available(edge.child_id)?.max(0);
        let sets = available / edge.required_quantity;
        min_sets = Some(match min_sets {
            Some(current) => current.min(sets),
            None => sets,
        });
    }
    Ok(min_sets.unwrap_or(0))
}

/// Composite stock derived from current on-hand counts, recursing into
/// nested composites. No window arithmetic; structure validation and plain
/// catalog displays use this.
pub fn composite_on_hand(
    reader: &(impl StoreReader + ?Sized),
    item_id: ItemId,
) -> Result<i64, BomError> {
    let mut stack = Vec::new();
    on_hand(reader, item_id, &mut stack)
}

fn on_hand(
    reader: &(impl StoreReader + ?Sized),
    item_id: ItemId,
    stack: &mut Vec<ItemId>,
) -> Result<i64, BomError> {
    let item = reader
        .item(item_id)?
        .ok_or(BomError::ItemNotFound(item_id))?;
    match item.kind() {
        ItemKind::Atomic => Ok(item.quantity_on_hand().unwrap_or(0).max(0)),
        // Services carry no stock; as a (historically invalid) component they
        // contribute nothing.
        ItemKind::Service => Ok(0),
        ItemKind::Composite => {
            if stack.contains(&item_id) {
                let mut path = stack.clone();
                path.push(item_id);
                return Err(BomError::CycleDetected { path });
            }
            stack.push(item_id);
            let components = reader.components_of(item_id)?;
            let result =
                composite_availability(&components, &mut |child| on_hand(reader, child, stack));
            stack.pop();
            result
        }
    }
}

/// Non-mutating health report for a composite definition, gathered before a
/// bundle is activated for sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BomReport {
    pub item_id: ItemId,
    /// Soft findings: missing components, components with zero or scarce
    /// stock.
    pub warnings: Vec<String>,
    /// Hard findings: invalid quantities, missing children, non-atomic
    /// children, cycles.
    pub errors: Vec<String>,
}

impl BomReport {
    pub fn is_sellable(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Inspect a composite definition without mutating anything.
pub fn validate_bom_structure(
    reader: &(impl StoreReader + ?Sized),
    item_id: ItemId,
) -> Result<BomReport, BomError> {
    let item = reader
        .item(item_id)?
        .ok_or(BomError::ItemNotFound(item_id))?;

    let mut report = BomReport {
        item_id,
        warnings: Vec::new(),
        errors: Vec::new(),
    };

    if !item.is_composite() {
        report
            .errors
            .push(format!("item {item_id} is not a composite"));
        return Ok(report);
    }

    let components = reader.components_of(item_id)?;
    if components.is_empty() {
        report
            .warnings
            .push("composite has no components".to_string());
    }

    for edge in &components {
        if edge.required_quantity <= 0 {
            report.errors.push(format!(
                "component {} has a non-positive required quantity ({})",
                edge.child_id, edge.required_quantity
            ));
            continue;
        }
        let Some(child) = reader.item(edge.child_id)? else {
            report
                .errors
                .push(format!("component {} does not exist", edge.child_id));
            continue;
        };
        if !child.is_atomic() {
            report.errors.push(format!(
                "component {} is {} - components must be atomic",
                edge.child_id,
                child.kind().as_str()
            ));
            continue;
        }
        let stock = child.quantity_on_hand().unwrap_or(0);
        if stock == 0 {
            report.warnings.push(format!(
                "component {} ({}) has no stock",
                edge.child_id,
                child.name()
            ));
        } else if stock < edge.required_quantity {
            report.warnings.push(format!(
                "component {} ({}) has {} on hand, below the {} required per set",
                edge.child_id,
                child.name(),
                stock,
                edge.required_quantity
            ));
        }
    }

    if let Some(cycle) = find_existing_cycle(reader, item_id)? {
        let rendered = cycle
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" -> ");
        report.errors.push(format!("component cycle: {rendered}"));
    }

    Ok(report)
}
