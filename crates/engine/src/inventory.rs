//! Manual stock operations and availability queries.
//!
//! The manual path (adjustment, repair, loss, found) is the only code that
//! mutates an Atomic item's on-hand count. Order-driven transitions write
//! ledger rows without touching on-hand; `current_stock` surfaces the drift
//! between the two views for operators.

use chrono::{DateTime, Utc};
use tracing::{info, instrument};

use rentforge_availability::{
    AvailabilityRequest, BulkAvailability, ItemAvailability, LineConflict, check_item_availability,
    check_multiple, detect_conflicts,
};
use rentforge_catalog::Item;
use rentforge_core::{DomainError, ItemId, MovementId, OrderId, UserId};
use rentforge_events::EventBus;
use rentforge_ledger::{MovementReason, StockMovement, StockReconciliation};
use rentforge_orders::OrderLine;
use rentforge_store::RentalStore;

use crate::RentalEngine;
use crate::change::ChangeEvent;
use crate::error::EngineError;

impl<S, B> RentalEngine<S, B>
where
    S: RentalStore,
    B: EventBus<ChangeEvent>,
{
    /// Record a manual stock movement and apply it to the item's on-hand
    /// count, which must stay ≥ 0. Atomic items only; order-driven reasons
    /// are rejected here.
    #[instrument(skip(self, notes), fields(item_id = %item_id, reason = reason.as_str()))]
    pub fn record_manual_adjustment(
        &self,
        item_id: ItemId,
        delta: i64,
        reason: MovementReason,
        actor: UserId,
        notes: Option<&str>,
    ) -> Result<(Item, StockMovement), EngineError> {
        if reason.requires_order() {
            return Err(DomainError::validation(format!(
                "{} is an order-driven reason; use an order transition",
                reason.as_str()
            ))
            .into());
        }

        let (item, movement) = self.store().transaction(|tx| -> Result<(Item, StockMovement), EngineError> {
            let mut item = tx
                .item(item_id)?
                .ok_or(EngineError::ItemNotFound(item_id))?;
            if !item.is_atomic() {
                return Err(DomainError::validation(
                    "only atomic items carry an on-hand quantity",
                )
                .into());
            }

            let current = item.quantity_on_hand().unwrap_or(0);
            let next = current + delta;
            if next < 0 {
                return Err(DomainError::validation(format!(
                    "movement of {delta} would drive on-hand below zero (currently {current})"
                ))
                .into());
            }

            let movement = StockMovement::new(
                MovementId::new(),
                item_id,
                None,
                delta,
                reason,
                actor,
                notes.map(str::to_string),
                Utc::now(),
            )?;

            tx.set_quantity_on_hand(item_id, next)?;
            tx.append_movement(movement.clone())?;
            item.set_quantity_on_hand(next)?;
            Ok((item, movement))
        })?;

        info!(item_id = %item_id, delta, reason = reason.as_str(), "manual stock movement recorded");
        self.publish(ChangeEvent::StockAdjusted {
            item_id,
            delta,
            occurred_at: Utc::now(),
        });
        Ok((item, movement))
    }

    /// Declared on-hand vs. ledger-derived total.
    ///
    /// Diagnostic only: a persistent nonzero drift means operator attention,
    /// never an automatic correction.
    pub fn current_stock(&self, item_id: ItemId) -> Result<StockReconciliation, EngineError> {
        self.store().read(|r| {
            let item = r
                .item(item_id)?
                .ok_or(EngineError::ItemNotFound(item_id))?;
            let ledger_total = r
                .movements_for_item(item_id)?
                .iter()
                .map(|m| m.delta)
                .sum();
            Ok(StockReconciliation::new(
                item_id,
                item.quantity_on_hand(),
                ledger_total,
            ))
        })
    }

    /// Free quantity of one item over `[start, end]`, optionally excluding
    /// one order's own demand.
    pub fn check_item_availability(
        &self,
        item_id: ItemId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude_order_id: Option<OrderId>,
    ) -> Result<ItemAvailability, EngineError> {
        self.store().read(|r| {
            check_item_availability(r, item_id, start, end, exclude_order_id)
                .map_err(EngineError::from)
        })
    }

    /// Pre-screen many item/quantity pairs over one window.
    pub fn check_multiple_items_availability(
        &self,
        requests: &[AvailabilityRequest],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude_order_id: Option<OrderId>,
    ) -> Result<BulkAvailability, EngineError> {
        self.store().read(|r| {
            check_multiple(r, requests, start, end, exclude_order_id).map_err(EngineError::from)
        })
    }

    /// Conflict diagnostics for a set of lines over a window: shortfalls and
    /// the overlapping orders causing them.
    pub fn detect_availability_conflicts(
        &self,
        lines: &[OrderLine],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude_order_id: Option<OrderId>,
    ) -> Result<Vec<LineConflict>, EngineError> {
        self.store().read(|r| {
            detect_conflicts(r, lines, start, end, exclude_order_id).map_err(EngineError::from)
        })
    }
}
