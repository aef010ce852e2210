//! Draft order and line management.
//!
//! Lines are mutable only while an order is Draft; afterwards every change
//! request is a `StateConflict`. Deleting an order is only possible while it
//! is still Draft - anything later is history and must go through
//! cancellation.

use chrono::Utc;
use tracing::{info, instrument};

use rentforge_core::{CustomerId, DomainError, ItemId, OrderId, UserId};
use rentforge_events::EventBus;
use rentforge_orders::{Order, OrderLine, RentalWindow};
use rentforge_store::RentalStore;

use crate::RentalEngine;
use crate::change::ChangeEvent;
use crate::error::EngineError;

impl<S, B> RentalEngine<S, B>
where
    S: RentalStore,
    B: EventBus<ChangeEvent>,
{
    /// Create a new Draft order. The window's internal ordering was already
    /// enforced when the `RentalWindow` was built.
    #[instrument(skip(self, window), fields(customer = %customer_id))]
    pub fn create_draft_order(
        &self,
        customer_id: CustomerId,
        sales_person_id: UserId,
        window: RentalWindow,
    ) -> Result<Order, EngineError> {
        let order = Order::draft(
            OrderId::new(),
            customer_id,
            sales_person_id,
            window,
            Utc::now(),
        );
        self.store()
            .transaction(|tx| tx.put_order(order.clone()).map_err(EngineError::from))?;
        info!(order_id = %order.id_typed(), "draft order created");
        Ok(order)
    }

    /// Append a line to a Draft order. The referenced item must exist.
    pub fn add_line(
        &self,
        order_id: OrderId,
        item_id: ItemId,
        quantity: i64,
        price_per_day: i64,
    ) -> Result<OrderLine, EngineError> {
        let line = self.store().transaction(|tx| -> Result<OrderLine, EngineError> {
            let order = tx
                .order(order_id)?
                .ok_or(EngineError::OrderNotFound(order_id))?;
            order.ensure_modifiable()?;
            tx.item(item_id)?
                .ok_or(EngineError::ItemNotFound(item_id))?;

            let next_line_no = tx
                .lines_of(order_id)?
                .iter()
                .map(|l| l.line_no)
                .max()
                .unwrap_or(0)
                + 1;
            let line = OrderLine::new(order_id, next_line_no, item_id, quantity, price_per_day)?;
            tx.put_line(line.clone())?;
            Ok(line)
        })?;

        self.publish(ChangeEvent::OrderLinesChanged {
            order_id,
            occurred_at: Utc::now(),
        });
        Ok(line)
    }

    /// Remove one line from a Draft order.
    pub fn remove_line(&self, order_id: OrderId, line_no: u32) -> Result<(), EngineError> {
        self.store().transaction(|tx| -> Result<(), EngineError> {
            let order = tx
                .order(order_id)?
                .ok_or(EngineError::OrderNotFound(order_id))?;
            order.ensure_modifiable()?;
            if !tx.remove_line(order_id, line_no)? {
                return Err(DomainError::not_found().into());
            }
            Ok(())
        })?;

        self.publish(ChangeEvent::OrderLinesChanged {
            order_id,
            occurred_at: Utc::now(),
        });
        Ok(())
    }

    /// Delete a Draft order and its lines.
    pub fn delete_draft_order(&self, order_id: OrderId) -> Result<(), EngineError> {
        self.store().transaction(|tx| -> Result<(), EngineError> {
            let order = tx
                .order(order_id)?
                .ok_or(EngineError::OrderNotFound(order_id))?;
            if !order.is_modifiable() {
                return Err(DomainError::state_conflict(format!(
                    "only draft orders can be deleted (status: {})",
                    order.status()
                ))
                .into());
            }
            tx.delete_order(order_id)?;
            Ok(())
        })?;

        self.publish(ChangeEvent::OrderLinesChanged {
            order_id,
            occurred_at: Utc::now(),
        });
        Ok(())
    }
}
