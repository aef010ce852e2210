//! The order status state machine.
//!
//! A transition is one atomic unit of work: legality check, availability
//! re-validation, ledger writes, and the status update all happen inside a
//! single store transaction, so two racing transitions cannot both pass the
//! availability check and both commit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use rentforge_availability::detect_conflicts;
use rentforge_core::{MovementId, OrderId, UserId};
use rentforge_events::EventBus;
use rentforge_ledger::{MovementError, MovementReason, StockMovement};
use rentforge_orders::{Order, OrderLine, OrderStatus};
use rentforge_store::RentalStore;

use crate::change::ChangeEvent;
use crate::error::EngineError;
use crate::RentalEngine;

/// Result of a committed transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub order: Order,
    pub movements: Vec<StockMovement>,
    pub previous_status: OrderStatus,
    pub new_status: OrderStatus,
}

/// Per-order outcomes of a bulk transition. Partial failure is the expected
/// shape: each order commits (or fails) independently.
#[derive(Debug)]
pub struct BulkTransitionOutcome {
    pub succeeded: Vec<TransitionOutcome>,
    pub failed: Vec<(OrderId, EngineError)>,
}

impl<S, B> RentalEngine<S, B>
where
    S: RentalStore,
    B: EventBus<ChangeEvent>,
{
    /// Drive an order to `new_status`.
    ///
    /// 1. Load the order (`OrderNotFound` if absent).
    /// 2. Check the status graph (`InvalidTransition`).
    /// 3. Entering Reserved or CheckedOut: re-validate every line's
    ///    availability over the order's effective window, excluding the
    ///    order itself (`AvailabilityConflict` with per-line shortfall).
    /// 4. Write one ledger row per line, per the reason implied by the edge.
    /// 5. Persist the status; steps 3-5 share one transaction.
    #[instrument(skip(self, notes), fields(order_id = %order_id, to = %new_status))]
    pub fn transition(
        &self,
        order_id: OrderId,
        new_status: OrderStatus,
        actor: UserId,
        notes: Option<&str>,
    ) -> Result<TransitionOutcome, EngineError> {
        let outcome = self.store().transaction(|tx| {
            let order = tx
                .order(order_id)?
                .ok_or(EngineError::OrderNotFound(order_id))?;
            let previous_status = order.status();
            if !previous_status.can_transition_to(new_status) {
                return Err(EngineError::InvalidTransition {
                    from: previous_status,
                    to: new_status,
                });
            }

            let lines = tx.lines_of(order_id)?;

            if new_status.holds_stock() {
                let (start, end) = order.window().effective_bounds();
                let conflicts = detect_conflicts(&*tx, &lines, start, end, Some(order_id))?;
                if !conflicts.is_empty() {
                    return Err(EngineError::AvailabilityConflict { conflicts });
                }
            }

            let now = Utc::now();
            let movements = plan_movements(previous_status, new_status, &lines, actor, notes, now)?;
            for movement in &movements {
                tx.append_movement(movement.clone())?;
            }
            tx.update_order_status(order_id, new_status)?;

            let mut order = order;
            order.set_status(new_status);
            Ok(TransitionOutcome {
                order,
                movements,
                previous_status,
                new_status,
            })
        })?;

        info!(
            order_id = %order_id,
            from = %outcome.previous_status,
            to = %outcome.new_status,
            movements = outcome.movements.len(),
            "order transitioned"
        );
        self.publish(ChangeEvent::OrderStatusChanged {
            order_id,
            previous_status: outcome.previous_status,
            new_status: outcome.new_status,
            occurred_at: Utc::now(),
        });
        Ok(outcome)
    }

    pub fn reserve(&self, order_id: OrderId, actor: UserId) -> Result<TransitionOutcome, EngineError> {
        self.transition(order_id, OrderStatus::Reserved, actor, None)
    }

    pub fn checkout(&self, order_id: OrderId, actor: UserId) -> Result<TransitionOutcome, EngineError> {
        self.transition(order_id, OrderStatus::CheckedOut, actor, None)
    }

    pub fn return_order(
        &self,
        order_id: OrderId,
        actor: UserId,
    ) -> Result<TransitionOutcome, EngineError> {
        self.transition(order_id, OrderStatus::Returned, actor, None)
    }

    pub fn cancel(
        &self,
        order_id: OrderId,
        actor: UserId,
        notes: Option<&str>,
    ) -> Result<TransitionOutcome, EngineError> {
        self.transition(order_id, OrderStatus::Cancelled, actor, notes)
    }

    /// Apply the same transition to many orders, each independently atomic.
    /// The batch never rolls back across orders; failures are reported
    /// per-id alongside the successes.
    pub fn bulk_transition(
        &self,
        order_ids: &[OrderId],
        new_status: OrderStatus,
        actor: UserId,
    ) -> BulkTransitionOutcome {
        let mut succeeded = Vec::new();
        let mut failed = Vec::new();
        for &order_id in order_ids {
            match self.transition(order_id, new_status, actor, None) {
                Ok(outcome) => succeeded.push(outcome),
                Err(e) => failed.push((order_id, e)),
            }
        }
        BulkTransitionOutcome { succeeded, failed }
    }
}

/// The ledger rows implied by a status edge: one movement per line, signed
/// per the reason table. `Draft → Cancelled` implies nothing - no stock was
/// ever committed.
fn plan_movements(
    from: OrderStatus,
    to: OrderStatus,
    lines: &[OrderLine],
    actor: UserId,
    notes: Option<&str>,
    now: DateTime<Utc>,
) -> Result<Vec<StockMovement>, MovementError> {
    let Some(reason) = movement_reason(from, to) else {
        return Ok(Vec::new());
    };
    lines
        .iter()
        .map(|line| {
            let delta = match reason.required_sign() {
                Some(sign) if sign < 0 => -line.quantity,
                _ => line.quantity,
            };
            StockMovement::new(
                MovementId::new(),
                line.item_id,
                Some(line.order_id),
                delta,
                reason,
                actor,
                notes.map(str::to_string),
                now,
            )
        })
        .collect()
}

fn movement_reason(from: OrderStatus, to: OrderStatus) -> Option<MovementReason> {
    match (from, to) {
        (OrderStatus::Draft, OrderStatus::Reserved) => Some(MovementReason::Reserve),
        (OrderStatus::Reserved, OrderStatus::CheckedOut) => Some(MovementReason::Checkout),
        (OrderStatus::CheckedOut, OrderStatus::Returned) => Some(MovementReason::Return),
        (OrderStatus::Reserved, OrderStatus::Cancelled) => Some(MovementReason::Release),
        _ => None,
    }
}
