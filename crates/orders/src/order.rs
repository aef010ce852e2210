use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use rentforge_core::{CustomerId, DomainError, DomainResult, Entity, ItemId, OrderId, UserId};

use crate::window::RentalWindow;

/// Rental order status lifecycle.
///
/// Legal transitions: Draft → Reserved → CheckedOut → Returned, plus
/// Draft → Cancelled and Reserved → Cancelled. Returned and Cancelled are
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Draft,
    Reserved,
    CheckedOut,
    Returned,
    Cancelled,
}

impl OrderStatus {
    /// The statuses this one may advance to. Terminal states return nothing.
    pub fn allowed_next(self) -> &'static [OrderStatus] {
        match self {
            OrderStatus::Draft => &[OrderStatus::Reserved, OrderStatus::Cancelled],
            OrderStatus::Reserved => &[OrderStatus::CheckedOut, OrderStatus::Cancelled],
            OrderStatus::CheckedOut => &[OrderStatus::Returned],
            OrderStatus::Returned | OrderStatus::Cancelled => &[],
        }
    }

    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        self.allowed_next().contains(&next)
    }

    pub fn is_terminal(self) -> bool {
        self.allowed_next().is_empty()
    }

    /// Statuses whose orders hold quantity against availability.
    pub fn holds_stock(self) -> bool {
        matches!(self, OrderStatus::Reserved | OrderStatus::CheckedOut)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Draft => "draft",
            OrderStatus::Reserved => "reserved",
            OrderStatus::CheckedOut => "checked_out",
            OrderStatus::Returned => "returned",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl core::str::FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(OrderStatus::Draft),
            "reserved" => Ok(OrderStatus::Reserved),
            "checked_out" => Ok(OrderStatus::CheckedOut),
            "returned" => Ok(OrderStatus::Returned),
            "cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(DomainError::validation(format!("unknown order status: {other}"))),
        }
    }
}

impl core::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order line: item, quantity, daily price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub order_id: OrderId,
    pub line_no: u32,
    pub item_id: ItemId,
    pub quantity: i64,
    /// Daily price in smallest currency unit (e.g., cents).
    pub price_per_day: i64,
}

impl OrderLine {
    pub fn new(
        order_id: OrderId,
        line_no: u32,
        item_id: ItemId,
        quantity: i64,
        price_per_day: i64,
    ) -> DomainResult<Self> {
        if quantity <= 0 {
            return Err(DomainError::validation("line quantity must be positive"));
        }
        if price_per_day < 0 {
            return Err(DomainError::validation("price per day cannot be negative"));
        }
        Ok(Self {
            order_id,
            line_no,
            item_id,
            quantity,
            price_per_day,
        })
    }

    /// Derived line total over the order's billable days.
    pub fn line_total(&self, window: &RentalWindow) -> i64 {
        self.quantity * self.price_per_day * window.billable_days()
    }
}

/// A rental order. Lines are stored separately and owned by the order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    id: OrderId,
    customer_id: CustomerId,
    sales_person_id: UserId,
    status: OrderStatus,
    window: RentalWindow,
    created_at: DateTime<Utc>,
}

impl Order {
    /// Create a new order in Draft.
    pub fn draft(
        id: OrderId,
        customer_id: CustomerId,
        sales_person_id: UserId,
        window: RentalWindow,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            customer_id,
            sales_person_id,
            status: OrderStatus::Draft,
            window,
            created_at,
        }
    }

    pub fn id_typed(&self) -> OrderId {
        self.id
    }

    pub fn customer_id(&self) -> CustomerId {
        self.customer_id
    }

    pub fn sales_person_id(&self) -> UserId {
        self.sales_person_id
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn window(&self) -> &RentalWindow {
        &self.window
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_modifiable(&self) -> bool {
        self.status == OrderStatus::Draft
    }

    pub fn ensure_modifiable(&self) -> DomainResult<()> {
        if self.is_modifiable() {
            Ok(())
        } else {
            Err(DomainError::state_conflict(format!(
                "order lines can only change while draft (status: {})",
                self.status
            )))
        }
    }

    /// Set the stored status. Legality of the change is the lifecycle
    /// engine's responsibility; this only records the outcome.
    pub fn set_status(&mut self, status: OrderStatus) {
        self.status = status;
    }

    /// Rehydrate a persisted order. The caller vouches for the stored status.
    pub fn from_parts(
        id: OrderId,
        customer_id: CustomerId,
        sales_person_id: UserId,
        status: OrderStatus,
        window: RentalWindow,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            customer_id,
            sales_person_id,
            status,
            window,
            created_at,
        }
    }
}

impl Entity for Order {
    type Id = OrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, d, 0, 0, 0).unwrap()
    }

    fn test_window() -> RentalWindow {
        RentalWindow::simple(day(10), day(15)).unwrap()
    }

    fn test_order(status: OrderStatus) -> Order {
        let mut order = Order::draft(
            OrderId::new(),
            CustomerId::new(),
            UserId::new(),
            test_window(),
            Utc::now(),
        );
        order.set_status(status);
        order
    }

    #[test]
    fn happy_path_transitions_are_allowed() {
        assert!(OrderStatus::Draft.can_transition_to(OrderStatus::Reserved));
        assert!(OrderStatus::Reserved.can_transition_to(OrderStatus::CheckedOut));
        assert!(OrderStatus::CheckedOut.can_transition_to(OrderStatus::Returned));
        assert!(OrderStatus::Draft.can_transition_to(OrderStatus::Cancelled));
        assert!(OrderStatus::Reserved.can_transition_to(OrderStatus::Cancelled));
    }

    #[test]
    fn skipping_reservation_is_illegal() {
        assert!(!OrderStatus::Draft.can_transition_to(OrderStatus::CheckedOut));
        assert!(!OrderStatus::Draft.can_transition_to(OrderStatus::Returned));
    }

    #[test]
    fn terminal_states_allow_nothing() {
        for terminal in [OrderStatus::Returned, OrderStatus::Cancelled] {
            assert!(terminal.is_terminal());
            for next in [
                OrderStatus::Draft,
                OrderStatus::Reserved,
                OrderStatus::CheckedOut,
                OrderStatus::Returned,
                OrderStatus::Cancelled,
            ] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn checked_out_cannot_be_cancelled() {
        assert!(!OrderStatus::CheckedOut.can_transition_to(OrderStatus::Cancelled));
    }

    #[test]
    fn only_reserved_and_checked_out_hold_stock() {
        assert!(OrderStatus::Reserved.holds_stock());
        assert!(OrderStatus::CheckedOut.holds_stock());
        assert!(!OrderStatus::Draft.holds_stock());
        assert!(!OrderStatus::Returned.holds_stock());
        assert!(!OrderStatus::Cancelled.holds_stock());
    }

    #[test]
    fn line_validation_rejects_bad_quantities() {
        let order_id = OrderId::new();
        let item_id = ItemId::new();
        assert!(OrderLine::new(order_id, 1, item_id, 0, 100).is_err());
        assert!(OrderLine::new(order_id, 1, item_id, -3, 100).is_err());
        assert!(OrderLine::new(order_id, 1, item_id, 2, -1).is_err());
        assert!(OrderLine::new(order_id, 1, item_id, 2, 0).is_ok());
    }

    #[test]
    fn line_total_multiplies_quantity_price_and_days() {
        let line = OrderLine::new(OrderId::new(), 1, ItemId::new(), 3, 250).unwrap();
        // five billable days
        assert_eq!(line.line_total(&test_window()), 3 * 250 * 5);
    }

    #[test]
    fn lines_are_only_mutable_while_draft() {
        assert!(test_order(OrderStatus::Draft).ensure_modifiable().is_ok());
        for status in [
            OrderStatus::Reserved,
            OrderStatus::CheckedOut,
            OrderStatus::Returned,
            OrderStatus::Cancelled,
        ] {
            let err = test_order(status).ensure_modifiable().unwrap_err();
            assert!(matches!(err, DomainError::StateConflict(_)));
        }
    }

    #[test]
    fn status_round_trips_through_str() {
        for status in [
            OrderStatus::Draft,
            OrderStatus::Reserved,
            OrderStatus::CheckedOut,
            OrderStatus::Returned,
            OrderStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), status);
        }
    }
}
