use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use rentforge_core::{ItemId, OrderId};
use rentforge_events::Event;
use rentforge_orders::OrderStatus;

/// Notification of a committed mutation.
///
/// Published after commit for external cache invalidation (the calendar feed
/// layer clears its cache on every order mutation). Carries identifiers, not
/// state - subscribers re-read the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeEvent {
    OrderStatusChanged {
        order_id: OrderId,
        previous_status: OrderStatus,
        new_status: OrderStatus,
        occurred_at: DateTime<Utc>,
    },
    OrderLinesChanged {
        order_id: OrderId,
        occurred_at: DateTime<Utc>,
    },
    StockAdjusted {
        item_id: ItemId,
        delta: i64,
        occurred_at: DateTime<Utc>,
    },
    ComponentChanged {
        parent_id: ItemId,
        occurred_at: DateTime<Utc>,
    },
}

impl Event for ChangeEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ChangeEvent::OrderStatusChanged { .. } => "order.status_changed",
            ChangeEvent::OrderLinesChanged { .. } => "order.lines_changed",
            ChangeEvent::StockAdjusted { .. } => "inventory.stock_adjusted",
            ChangeEvent::ComponentChanged { .. } => "catalog.component_changed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match *self {
            ChangeEvent::OrderStatusChanged { occurred_at, .. }
            | ChangeEvent::OrderLinesChanged { occurred_at, .. }
            | ChangeEvent::StockAdjusted { occurred_at, .. }
            | ChangeEvent::ComponentChanged { occurred_at, .. } => occurred_at,
        }
    }
}
