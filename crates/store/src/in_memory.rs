use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use rentforge_catalog::{ComponentEdge, Item};
use rentforge_core::{ItemId, OrderId};
use rentforge_ledger::StockMovement;
use rentforge_orders::{Order, OrderLine, OrderStatus};

use crate::traits::{RentalStore, StoreError, StoreReader, StoreWriter};

#[derive(Debug, Default, Clone)]
struct InMemoryState {
    items: HashMap<ItemId, Item>,
    components: HashMap<ItemId, Vec<ComponentEdge>>,
    orders: HashMap<OrderId, Order>,
    lines: HashMap<OrderId, Vec<OrderLine>>,
    movements: Vec<StockMovement>,
}

impl StoreReader for InMemoryState {
    fn item(&self, id: ItemId) -> Result<Option<Item>, StoreError> {
        Ok(self.items.get(&id).cloned())
    }

    fn components_of(&self, parent_id: ItemId) -> Result<Vec<ComponentEdge>, StoreError> {
        Ok(self.components.get(&parent_id).cloned().unwrap_or_default())
    }

    fn order(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        Ok(self.orders.get(&id).cloned())
    }

    fn lines_of(&self, order_id: OrderId) -> Result<Vec<OrderLine>, StoreError> {
        Ok(self.lines.get(&order_id).cloned().unwrap_or_default())
    }

    fn active_lines_overlapping(
        &self,
        item_id: ItemId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude: Option<OrderId>,
    ) -> Result<Vec<(Order, OrderLine)>, StoreError> {
        let mut hits = Vec::new();
        for order in self.orders.values() {
            if !order.status().holds_stock() {
                continue;
            }
            if Some(order.id_typed()) == exclude {
                continue;
            }
            if !order.window().overlaps(start, end) {
                continue;
            }
            for line in self.lines.get(&order.id_typed()).into_iter().flatten() {
                if line.item_id == item_id {
                    hits.push((order.clone(), line.clone()));
                }
            }
        }
        // Deterministic output regardless of hash order.
        hits.sort_by_key(|(o, l)| (o.id_typed(), l.line_no));
        Ok(hits)
    }

    fn movements_for_item(&self, item_id: ItemId) -> Result<Vec<StockMovement>, StoreError> {
        Ok(self
            .movements
            .iter()
            .filter(|m| m.item_id == item_id)
            .cloned()
            .collect())
    }
}

impl StoreWriter for InMemoryState {
    fn put_item(&mut self, item: Item) -> Result<(), StoreError> {
        self.items.insert(item.id_typed(), item);
        Ok(())
    }

    fn set_quantity_on_hand(&mut self, id: ItemId, quantity: i64) -> Result<(), StoreError> {
        let item = self
            .items
            .get_mut(&id)
            .ok_or_else(|| StoreError::MissingRow(format!("item {id}")))?;
        item.set_quantity_on_hand(quantity)
            .map_err(|e| StoreError::Constraint(e.to_string()))
    }

    fn upsert_component(&mut self, edge: ComponentEdge) -> Result<(), StoreError> {
        let edges = self.components.entry(edge.parent_id).or_default();
        match edges.iter_mut().find(|e| e.child_id == edge.child_id) {
            Some(existing) => existing.required_quantity = edge.required_quantity,
            None => edges.push(edge),
        }
        Ok(())
    }

    fn remove_component(
        &mut self,
        parent_id: ItemId,
        child_id: ItemId,
    ) -> Result<bool, StoreError> {
        let Some(edges) = self.components.get_mut(&parent_id) else {
            return Ok(false);
        };
        let before = edges.len();
        edges.retain(|e| e.child_id != child_id);
        Ok(edges.len() < before)
    }

    fn put_order(&mut self, order: Order) -> Result<(), StoreError> {
        self.orders.insert(order.id_typed(), order);
        Ok(())
    }

    fn update_order_status(&mut self, id: OrderId, status: OrderStatus) -> Result<(), StoreError> {
        let order = self
            .orders
            .get_mut(&id)
            .ok_or_else(|| StoreError::MissingRow(format!("order {id}")))?;
        order.set_status(status);
        Ok(())
    }

    fn put_line(&mut self, line: OrderLine) -> Result<(), StoreError> {
        let lines = self.lines.entry(line.order_id).or_default();
        match lines.iter_mut().find(|l| l.line_no == line.line_no) {
            Some(existing) => *existing = line,
            None => lines.push(line),
        }
        Ok(())
    }

    fn remove_line(&mut self, order_id: OrderId, line_no: u32) -> Result<bool, StoreError> {
        let Some(lines) = self.lines.get_mut(&order_id) else {
            return Ok(false);
        };
        let before = lines.len();
        lines.retain(|l| l.line_no != line_no);
        Ok(lines.len() < before)
    }

    fn delete_order(&mut self, id: OrderId) -> Result<(), StoreError> {
        self.lines.remove(&id);
        self.orders.remove(&id);
        Ok(())
    }

    fn append_movement(&mut self, movement: StockMovement) -> Result<(), StoreError> {
        self.movements.push(movement);
        Ok(())
    }
}

/// In-memory store for tests/dev. Not optimized for performance.
///
/// A transaction takes the whole-state write lock, clones a snapshot, and
/// restores it if the closure fails - giving the same all-or-nothing and
/// serialization semantics the Postgres adapter gets from real transactions.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<InMemoryState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RentalStore for InMemoryStore {
    fn read<R, E>(&self, f: impl FnOnce(&dyn StoreReader) -> Result<R, E>) -> Result<R, E>
    where
        E: From<StoreError>,
    {
        let state = self.state.read().map_err(|_| StoreError::LockPoisoned)?;
        f(&*state)
    }

    fn transaction<R, E>(&self, f: impl FnOnce(&mut dyn StoreWriter) -> Result<R, E>) -> Result<R, E>
    where
        E: From<StoreError>,
    {
        let mut state = self.state.write().map_err(|_| StoreError::LockPoisoned)?;
        let snapshot = state.clone();
        match f(&mut *state) {
            Ok(value) => Ok(value),
            Err(e) => {
                *state = snapshot;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rentforge_core::{CustomerId, MovementId, UserId};
    use rentforge_ledger::MovementReason;
    use rentforge_orders::RentalWindow;

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, d, 0, 0, 0).unwrap()
    }

    fn seed_order(
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
                tx.put_line(OrderLine::new(order_id, 1, item_id, quantity, 100).unwrap())?;
                Ok(())
            })
            .unwrap();
        order_id
    }

    #[test]
    fn put_and_get_round_trips() {
        let store = InMemoryStore::new();
        let item = Item::atomic(ItemId::new(), "Fog machine", 3, Utc::now()).unwrap();
        let id = item.id_typed();

        store
            .transaction(|tx| -> Result<(), StoreError> { tx.put_item(item.clone()) })
            .unwrap();

        let loaded = store
            .read(|r| -> Result<_, StoreError> { r.item(id) })
            .unwrap();
        assert_eq!(loaded, Some(item));
    }

    #[test]
    fn overlap_query_filters_status_window_and_exclusion() {
        let store = InMemoryStore::new();
        let item_id = ItemId::new();

        let reserved = seed_order(&store, item_id, 4, 10, 15, OrderStatus::Reserved);
        seed_order(&store, item_id, 2, 14, 20, OrderStatus::CheckedOut);
        // draft and cancelled orders never hold stock
        seed_order(&store, item_id, 9, 10, 15, OrderStatus::Draft);
        seed_order(&store, item_id, 9, 10, 15, OrderStatus::Cancelled);
        // disjoint window
        seed_order(&store, item_id, 9, 21, 25, OrderStatus::Reserved);

        let hits = store
            .read(|r| -> Result<_, StoreError> {
                r.active_lines_overlapping(item_id, day(14), day(16), None)
            })
            .unwrap();
        let total: i64 = hits.iter().map(|(_, l)| l.quantity).sum();
        assert_eq!(hits.len(), 2);
        assert_eq!(total, 6);

        let without_reserved = store
            .read(|r| -> Result<_, StoreError> {
                r.active_lines_overlapping(item_id, day(14), day(16), Some(reserved))
            })
            .unwrap();
        assert_eq!(without_reserved.len(), 1);
        assert_eq!(without_reserved[0].1.quantity, 2);
    }

    #[test]
    fn failed_transaction_rolls_back_every_write() {
        let store = InMemoryStore::new();
        let item = Item::atomic(ItemId::new(), "Speaker stack", 5, Utc::now()).unwrap();
        let id = item.id_typed();
        store
            .transaction(|tx| -> Result<(), StoreError> { tx.put_item(item) })
            .unwrap();

        let result = store.transaction(|tx| -> Result<(), StoreError> {
            tx.set_quantity_on_hand(id, 1)?;
            tx.append_movement(
                StockMovement::new(
                    MovementId::new(),
                    id,
                    None,
                    -4,
                    MovementReason::Loss,
                    UserId::new(),
                    None,
                    Utc::now(),
                )
                .unwrap(),
            )?;
            Err(StoreError::Backend("simulated failure".into()))
        });
        assert!(result.is_err());

        store
            .read(|r| -> Result<(), StoreError> {
                assert_eq!(r.item(id)?.unwrap().quantity_on_hand(), Some(5));
                assert!(r.movements_for_item(id)?.is_empty());
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn upsert_component_replaces_quantity_in_place() {
        let store = InMemoryStore::new();
        let parent = ItemId::new();
        let first = ItemId::new();
        let second = ItemId::new();

        store
            .transaction(|tx| -> Result<(), StoreError> {
                tx.upsert_component(ComponentEdge::new(parent, first, 2).unwrap())?;
                tx.upsert_component(ComponentEdge::new(parent, second, 1).unwrap())?;
                tx.upsert_component(ComponentEdge::new(parent, first, 5).unwrap())?;
                Ok(())
            })
            .unwrap();

        let edges = store
            .read(|r| -> Result<_, StoreError> { r.components_of(parent) })
            .unwrap();
        // upsert keeps the original position in the ordered set
        assert_eq!(edges.len(), 2);
        assert_eq!(edges[0].child_id, first);
        assert_eq!(edges[0].required_quantity, 5);
        assert_eq!(edges[1].child_id, second);
    }

    #[test]
    fn remove_component_reports_absence() {
        let store = InMemoryStore::new();
        let parent = ItemId::new();
        let child = ItemId::new();

        store
            .transaction(|tx| -> Result<(), StoreError> {
                tx.upsert_component(ComponentEdge::new(parent, child, 1).unwrap())?;
                assert!(tx.remove_component(parent, child)?);
                assert!(!tx.remove_component(parent, child)?);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn delete_order_removes_its_lines() {
        let store = InMemoryStore::new();
        let item_id = ItemId::new();
        let order_id = seed_order(&store, item_id, 1, 10, 12, OrderStatus::Draft);

        store
            .transaction(|tx| -> Result<(), StoreError> { tx.delete_order(order_id) })
            .unwrap();

        store
            .read(|r| -> Result<(), StoreError> {
                assert!(r.order(order_id)?.is_none());
                assert!(r.lines_of(order_id)?.is_empty());
                Ok(())
            })
            .unwrap();
    }
}
