use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use rentforge_bom::{BomError, composite_availability};
use rentforge_catalog::{Item, ItemKind};
use rentforge_core::{CustomerId, ItemId, OrderId};
use rentforge_orders::{OrderLine, OrderStatus, RentalWindow};
use rentforge_store::{StoreError, StoreReader};

/// Availability calculation failure.
#[derive(Debug, Error)]
pub enum AvailabilityError {
    #[error("item {0} not found")]
    ItemNotFound(ItemId),

    #[error("invalid availability window: {0}")]
    InvalidWindow(String),

    #[error(transparent)]
    Bom(BomError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<BomError> for AvailabilityError {
    fn from(value: BomError) -> Self {
        match value {
            BomError::ItemNotFound(id) => AvailabilityError::ItemNotFound(id),
            BomError::Store(e) => AvailabilityError::Store(e),
            other => AvailabilityError::Bom(other),
        }
    }
}

/// Free quantity of one item over a window.
///
/// `base_quantity` is `None` for items that are not stock-tracked (services);
/// such items are always available and `available` is `None` too.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemAvailability {
    pub item_id: ItemId,
    pub base_quantity: Option<i64>,
    /// Demand from overlapping Reserved/CheckedOut orders.
    pub reserved_quantity: i64,
    /// `max(0, base - reserved)`, when stock-tracked.
    pub available: Option<i64>,
}

impl ItemAvailability {
    /// Whether `requested` units fit into the free quantity.
    pub fn satisfies(&self, requested: i64) -> bool {
        self.available.is_none_or(|a| a >= requested)
    }

    pub fn shortfall(&self, requested: i64) -> i64 {
        match self.available {
            Some(a) => (requested - a).max(0),
            None => 0,
        }
    }
}

/// The free quantity of `item_id` over `[start, end]` (inclusive bounds).
///
/// `exclude` omits one order's demand - used when validating that very
/// order's own transition, so an order never conflicts with itself.
pub fn check_item_availability(
    reader: &(impl StoreReader + ?Sized),
    item_id: ItemId,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    exclude: Option<OrderId>,
) -> Result<ItemAvailability, AvailabilityError> {
    ensure_window(start, end)?;
    let item = reader
        .item(item_id)?
        .ok_or(AvailabilityError::ItemNotFound(item_id))?;

    let reserved_quantity = demand(reader, item_id, start, end, exclude)?;
    let base_quantity = base_quantity(reader, &item, start, end, exclude, &mut Vec::new())?;
    let available = base_quantity.map(|base| (base - reserved_quantity).max(0));

    Ok(ItemAvailability {
        item_id,
        base_quantity,
        reserved_quantity,
        available,
    })
}

fn ensure_window(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<(), AvailabilityError> {
    if start > end {
        return Err(AvailabilityError::InvalidWindow(format!(
            "window start {start} is after end {end}"
        )));
    }
    Ok(())
}

/// Sum of line quantities across overlapping stock-holding orders.
fn demand(
    reader: &(impl StoreReader + ?Sized),
    item_id: ItemId,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    exclude: Option<OrderId>,
) -> Result<i64, AvailabilityError> {
    let overlapping = reader.active_lines_overlapping(item_id, start, end, exclude)?;
    Ok(overlapping.iter().map(|(_, line)| line.quantity).sum())
}

/// Base quantity before demand: on-hand for Atomic, derived for Composite
/// (each child constrained by its own windowed availability), untracked for
/// Service. The visited stack guards against corrupt cyclic data.
fn base_quantity(
    reader: &(impl StoreReader + ?Sized),
    item: &Item,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    exclude: Option<OrderId>,
    stack: &mut Vec<ItemId>,
) -> Result<Option<i64>, AvailabilityError> {
    let item_id = item.id_typed();
    match item.kind() {
        ItemKind::Atomic => Ok(Some(item.quantity_on_hand().unwrap_or(0))),
        ItemKind::Service => Ok(None),
        ItemKind::Composite => {
            if stack.contains(&item_id) {
                let mut path = stack.clone();
                path.push(item_id);
                return Err(BomError::CycleDetected { path }.into());
            }
            stack.push(item_id);
            let components = reader.components_of(item_id)?;
            let sets = composite_availability(&components, &mut |child_id| -> Result<i64, AvailabilityError> {
                let child = reader
                    .item(child_id)?
                    .ok_or(AvailabilityError::ItemNotFound(child_id))?;
                let child_base = base_quantity(reader, &child, start, end, exclude, stack)?;
                let child_demand = demand(reader, child_id, start, end, exclude)?;
                // a non-stock-tracked child contributes nothing to a bundle
                Ok(child_base.map_or(0, |base| (base - child_demand).max(0)))
            });
            stack.pop();
            Ok(Some(sets?))
        }
    }
}

/// One item/quantity pair of a bulk pre-screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityRequest {
    pub item_id: ItemId,
    pub quantity: i64,
}

/// Outcome for one request of a bulk pre-screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemAvailabilityCheck {
    pub item_id: ItemId,
    pub requested: i64,
    pub availability: ItemAvailability,
    pub satisfiable: bool,
    pub shortfall: i64,
}

/// Aggregate outcome of a bulk pre-screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkAvailability {
    pub all_available: bool,
    pub total_shortfall: i64,
    pub checks: Vec<ItemAvailabilityCheck>,
}

/// Evaluate each request independently over the same window - "what's
/// available for these dates" across a listing.
pub fn check_multiple(
    reader: &(impl StoreReader + ?Sized),
    requests: &[AvailabilityRequest],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    exclude: Option<OrderId>,
) -> Result<BulkAvailability, AvailabilityError> {
    ensure_window(start, end)?;
    let mut checks = Vec::with_capacity(requests.len());
    let mut total_shortfall = 0;
    for request in requests {
        let availability =
            check_item_availability(reader, request.item_id, start, end, exclude)?;
        let satisfiable = availability.satisfies(request.quantity);
        let shortfall = availability.shortfall(request.quantity);
        total_shortfall += shortfall;
        checks.push(ItemAvailabilityCheck {
            item_id: request.item_id,
            requested: request.quantity,
            availability,
            satisfiable,
            shortfall,
        });
    }
    Ok(BulkAvailability {
        all_available: checks.iter().all(|c| c.satisfiable),
        total_shortfall,
        checks,
    })
}

/// One order standing in the way of a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictingOrder {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub customer_id: CustomerId,
    pub window: RentalWindow,
    /// Quantity of the contested item this order holds.
    pub quantity: i64,
}

/// An under-available order line, with the orders causing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineConflict {
    pub item_id: ItemId,
    pub requested: i64,
    pub available: i64,
    pub shortfall: i64,
    pub conflicting_orders: Vec<ConflictingOrder>,
}

/// For every line whose requested quantity exceeds the free quantity, report
/// the shortfall and the specific overlapping orders behind it - actionable
/// diagnostics for an operator, not just a boolean.
pub fn detect_conflicts(
    reader: &(impl StoreReader + ?Sized),
    lines: &[OrderLine],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    exclude: Option<OrderId>,
) -> Result<Vec<LineConflict>, AvailabilityError> {
    ensure_window(start, end)?;
    let mut conflicts = Vec::new();
    for line in lines {
        let availability = check_item_availability(reader, line.item_id, start, end, exclude)?;
        let Some(available) = availability.available else {
            continue;
        };
        if line.quantity <= available {
            continue;
        }
        let conflicting_orders = reader
            .active_lines_overlapping(line.item_id, start, end, exclude)?
            .into_iter()
            .map(|(order, held)| ConflictingOrder {
                order_id: order.id_typed(),
                status: order.status(),
                customer_id: order.customer_id(),
                window: *order.window(),
                quantity: held.quantity,
            })
            .collect();
        conflicts.push(LineConflict {
            item_id: line.item_id,
            requested: line.quantity,
            available,
            shortfall: line.quantity - available,
            conflicting_orders,
        });
    }
    Ok(conflicts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rentforge_catalog::ComponentEdge;
    use rentforge_core::UserId;
    use rentforge_orders::Order;
    use rentforge_store::{InMemoryStore, RentalStore};

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, d, 0, 0, 0).unwrap()
    }

    fn seed_atomic(store: &InMemoryStore, name: &str, stock: i64) -> ItemId {
        let item = Item::atomic(ItemId::new(), name, stock, Utc::now()).unwrap();
        let id = item.id_typed();
        store
            .transaction(|tx| -> Result<(), StoreError> { tx.put_item(item) })
            .unwrap();
        id
    }

    fn seed_composite(
        store: &InMemoryStore,
        name: &str,
        components: &[(ItemId, i64)],
    ) -> ItemId {
        let item = Item::composite(ItemId::new(), name, Utc::now()).unwrap();
        let id = item.id_typed();
        store
            .transaction(|tx| -> Result<(), StoreError> {
                tx.put_item(item)?;
                for &(child, qty) in components {
                    tx.upsert_component(ComponentEdge::new(id, child, qty).unwrap())?;
                }
                Ok(())
            })
            .unwrap();
        id
    }

    fn seed_active_order(
        store: &InMemoryStore,
        item_id: ItemId,
        quantity: i64,
        from: u32,
        to: u32,
        status: OrderStatus,
    ) -> OrderId {
        let order_id = OrderId::new();
        let mut order = Order::draft(
            order_id,
            CustomerId::new(),
            UserId::new(),
            RentalWindow::simple(day(from), day(to)).unwrap(),
            Utc::now(),
        );
        order.set_status(status);
        store
            .transaction(|tx| -> Result<(), StoreError> {
                tx.put_order(order.clone())?;
                tx.put_line(OrderLine::new(order_id, 1, item_id, quantity, 100).unwrap())
            })
            .unwrap();
        order_id
    }

    fn availability(
        store: &InMemoryStore,
        item_id: ItemId,
        from: u32,
        to: u32,
        exclude: Option<OrderId>,
    ) -> ItemAvailability {
        store
            .read(|r| check_item_availability(r, item_id, day(from), day(to), exclude))
            .unwrap()
    }

    #[test]
    fn overlapping_demand_reduces_availability() {
        let store = InMemoryStore::new();
        let item_id = seed_atomic(&store, "projector", 10);
        seed_active_order(&store, item_id, 7, 10, 15, OrderStatus::Reserved);

        let result = availability(&store, item_id, 14, 20, None);
        assert_eq!(result.base_quantity, Some(10));
        assert_eq!(result.reserved_quantity, 7);
        assert_eq!(result.available, Some(3));
    }

    #[test]
    fn disjoint_window_sees_full_stock() {
        let store = InMemoryStore::new();
        let item_id = seed_atomic(&store, "projector", 10);
        seed_active_order(&store, item_id, 7, 10, 15, OrderStatus::Reserved);

        let result = availability(&store, item_id, 20, 25, None);
        assert_eq!(result.available, Some(10));
    }

    #[test]
    fn touching_endpoints_still_overlap() {
        let store = InMemoryStore::new();
        let item_id = seed_atomic(&store, "projector", 10);
        seed_active_order(&store, item_id, 4, 10, 15, OrderStatus::CheckedOut);

        // day 15 is the last blocked instant; inclusive overlap counts it
        assert_eq!(availability(&store, item_id, 15, 18, None).available, Some(6));
        assert_eq!(availability(&store, item_id, 16, 18, None).available, Some(10));
    }

    #[test]
    fn excluded_order_does_not_compete_with_itself() {
        let store = InMemoryStore::new();
        let item_id = seed_atomic(&store, "projector", 10);
        let own = seed_active_order(&store, item_id, 8, 10, 15, OrderStatus::Reserved);

        assert_eq!(availability(&store, item_id, 10, 15, None).available, Some(2));
        assert_eq!(
            availability(&store, item_id, 10, 15, Some(own)).available,
            Some(10)
        );
    }

    #[test]
    fn availability_never_goes_negative() {
        let store = InMemoryStore::new();
        let item_id = seed_atomic(&store, "projector", 2);
        seed_active_order(&store, item_id, 5, 10, 15, OrderStatus::Reserved);

        let result = availability(&store, item_id, 10, 15, None);
        assert_eq!(result.reserved_quantity, 5);
        assert_eq!(result.available, Some(0));
    }

    #[test]
    fn composite_base_uses_windowed_child_stock() {
        let store = InMemoryStore::new();
        let light = seed_atomic(&store, "light", 10);
        let stand = seed_atomic(&store, "stand", 4);
        let bundle = seed_composite(&store, "light kit", &[(light, 2), (stand, 1)]);

        // idle window: floor(10/2)=5 vs floor(4/1)=4
        assert_eq!(availability(&store, bundle, 1, 5, None).available, Some(4));

        // four lights rented out over the window: floor(6/2)=3 becomes the min
        seed_active_order(&store, light, 4, 10, 15, OrderStatus::CheckedOut);
        assert_eq!(availability(&store, bundle, 12, 14, None).available, Some(3));
    }

    #[test]
    fn composite_demand_subtracts_from_derived_base() {
        let store = InMemoryStore::new();
        let light = seed_atomic(&store, "light", 10);
        let bundle = seed_composite(&store, "light kit", &[(light, 2)]);
        seed_active_order(&store, bundle, 3, 10, 15, OrderStatus::Reserved);

        let result = availability(&store, bundle, 10, 15, None);
        assert_eq!(result.base_quantity, Some(5));
        assert_eq!(result.reserved_quantity, 3);
        assert_eq!(result.available, Some(2));
    }

    #[test]
    fn service_items_are_always_available() {
        let store = InMemoryStore::new();
        let service = Item::service(ItemId::new(), "delivery crew", Utc::now()).unwrap();
        let id = service.id_typed();
        store
            .transaction(|tx| -> Result<(), StoreError> { tx.put_item(service) })
            .unwrap();
        seed_active_order(&store, id, 3, 10, 15, OrderStatus::Reserved);

        let result = availability(&store, id, 10, 15, None);
        assert_eq!(result.base_quantity, None);
        assert_eq!(result.reserved_quantity, 3);
        assert_eq!(result.available, None);
        assert!(result.satisfies(1_000));
        assert_eq!(result.shortfall(1_000), 0);
    }

    #[test]
    fn unknown_item_and_malformed_window_are_reported() {
        let store = InMemoryStore::new();
        let ghost = ItemId::new();
        let err = store
            .read(|r| check_item_availability(r, ghost, day(10), day(15), None))
            .unwrap_err();
        assert!(matches!(err, AvailabilityError::ItemNotFound(id) if id == ghost));

        let item_id = seed_atomic(&store, "projector", 1);
        let err = store
            .read(|r| check_item_availability(r, item_id, day(15), day(10), None))
            .unwrap_err();
        assert!(matches!(err, AvailabilityError::InvalidWindow(_)));
    }

    #[test]
    fn requerying_without_writes_is_idempotent() {
        let store = InMemoryStore::new();
        let item_id = seed_atomic(&store, "projector", 10);
        seed_active_order(&store, item_id, 7, 10, 15, OrderStatus::Reserved);

        let first = availability(&store, item_id, 12, 18, None);
        let second = availability(&store, item_id, 12, 18, None);
        assert_eq!(first, second);
    }

    #[test]
    fn bulk_check_reports_per_item_and_aggregate_shortfall() {
        let store = InMemoryStore::new();
        let plenty = seed_atomic(&store, "cable", 50);
        let scarce = seed_atomic(&store, "mixer", 2);
        seed_active_order(&store, scarce, 1, 10, 15, OrderStatus::Reserved);

        let result = store
            .read(|r| {
                check_multiple(
                    r,
                    &[
                        AvailabilityRequest {
                            item_id: plenty,
                            quantity: 10,
                        },
                        AvailabilityRequest {
                            item_id: scarce,
                            quantity: 3,
                        },
                    ],
                    day(12),
                    day(14),
                    None,
                )
            })
            .unwrap();

        assert!(!result.all_available);
        assert_eq!(result.total_shortfall, 2);
        assert!(result.checks[0].satisfiable);
        assert_eq!(result.checks[1].shortfall, 2);
    }

    #[test]
    fn conflicts_name_the_orders_in_the_way() {
        let store = InMemoryStore::new();
        let item_id = seed_atomic(&store, "stage deck", 10);
        let first = seed_active_order(&store, item_id, 6, 10, 15, OrderStatus::Reserved);
        let second = seed_active_order(&store, item_id, 3, 14, 20, OrderStatus::CheckedOut);

        let lines = vec![OrderLine::new(OrderId::new(), 1, item_id, 5, 100).unwrap()];
        let conflicts = store
            .read(|r| detect_conflicts(r, &lines, day(14), day(16), None))
            .unwrap();

        assert_eq!(conflicts.len(), 1);
        let conflict = &conflicts[0];
        assert_eq!(conflict.requested, 5);
        assert_eq!(conflict.available, 1);
        assert_eq!(conflict.shortfall, 4);
        let ids: Vec<OrderId> = conflict
            .conflicting_orders
            .iter()
            .map(|c| c.order_id)
            .collect();
        assert!(ids.contains(&first));
        assert!(ids.contains(&second));
    }

    #[test]
    fn satisfied_lines_produce_no_conflicts() {
        let store = InMemoryStore::new();
        let item_id = seed_atomic(&store, "stage deck", 10);
        seed_active_order(&store, item_id, 2, 10, 15, OrderStatus::Reserved);

        let lines = vec![OrderLine::new(OrderId::new(), 1, item_id, 5, 100).unwrap()];
        let conflicts = store
            .read(|r| detect_conflicts(r, &lines, day(10), day(15), None))
            .unwrap();
        assert!(conflicts.is_empty());
    }
}
