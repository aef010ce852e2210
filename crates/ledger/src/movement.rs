use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use rentforge_core::{DomainError, Entity, ItemId, MovementId, OrderId, UserId};

/// Why a quantity changed. Closed set; every reason carries its own sign and
/// order-coupling rules, dispatched by `match`, never by string comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementReason {
    Checkout,
    Return,
    Reserve,
    Release,
    Adjustment,
    Repair,
    Loss,
    Found,
}

impl MovementReason {
    pub const ALL: [MovementReason; 8] = [
        MovementReason::Checkout,
        MovementReason::Return,
        MovementReason::Reserve,
        MovementReason::Release,
        MovementReason::Adjustment,
        MovementReason::Repair,
        MovementReason::Loss,
        MovementReason::Found,
    ];

    /// Order-driven reasons must reference the order that caused them.
    pub fn requires_order(self) -> bool {
        matches!(
            self,
            MovementReason::Checkout
                | MovementReason::Return
                | MovementReason::Reserve
                | MovementReason::Release
        )
    }

    /// Manual reasons must not reference an order.
    pub fn is_manual(self) -> bool {
        !self.requires_order()
    }

    /// The sign the delta must have, if the reason constrains it.
    /// `Some(-1)` means strictly negative, `Some(1)` strictly positive,
    /// `None` either sign (Repair, Adjustment).
    pub fn required_sign(self) -> Option<i64> {
        match self {
            MovementReason::Checkout | MovementReason::Reserve | MovementReason::Loss => Some(-1),
            MovementReason::Return | MovementReason::Release | MovementReason::Found => Some(1),
            MovementReason::Adjustment | MovementReason::Repair => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MovementReason::Checkout => "checkout",
            MovementReason::Return => "return",
            MovementReason::Reserve => "reserve",
            MovementReason::Release => "release",
            MovementReason::Adjustment => "adjustment",
            MovementReason::Repair => "repair",
            MovementReason::Loss => "loss",
            MovementReason::Found => "found",
        }
    }
}

impl core::str::FromStr for MovementReason {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "checkout" => Ok(MovementReason::Checkout),
            "return" => Ok(MovementReason::Return),
            "reserve" => Ok(MovementReason::Reserve),
            "release" => Ok(MovementReason::Release),
            "adjustment" => Ok(MovementReason::Adjustment),
            "repair" => Ok(MovementReason::Repair),
            "loss" => Ok(MovementReason::Loss),
            "found" => Ok(MovementReason::Found),
            other => Err(DomainError::validation(format!("unknown movement reason: {other}"))),
        }
    }
}

/// Ledger rule violation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MovementError {
    #[error("invalid movement: {0}")]
    InvalidMovement(String),
}

/// One append-only ledger row. Immutable once written - the audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMovement {
    pub id: MovementId,
    pub item_id: ItemId,
    /// Present for order-driven movements, absent for manual adjustments.
    pub order_id: Option<OrderId>,
    pub delta: i64,
    pub reason: MovementReason,
    pub created_by: UserId,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl StockMovement {
    /// Build a movement, enforcing the reason rules up front.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: MovementId,
        item_id: ItemId,
        order_id: Option<OrderId>,
        delta: i64,
        reason: MovementReason,
        created_by: UserId,
        notes: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Result<Self, MovementError> {
        let movement = Self {
            id,
            item_id,
            order_id,
            delta,
            reason,
            created_by,
            notes,
            created_at,
        };
        movement.validate()?;
        Ok(movement)
    }

    /// Check the reason/sign/order-coupling rules. Run before every insert.
    pub fn validate(&self) -> Result<(), MovementError> {
        if self.delta == 0 {
            return Err(MovementError::InvalidMovement("delta cannot be zero".into()));
        }

        match self.reason.required_sign() {
            Some(sign) if sign < 0 && self.delta >= 0 => {
                return Err(MovementError::InvalidMovement(format!(
                    "{} movements must have a negative delta",
                    self.reason.as_str()
                )));
            }
            Some(sign) if sign > 0 && self.delta <= 0 => {
                return Err(MovementError::InvalidMovement(format!(
                    "{} movements must have a positive delta",
                    self.reason.as_str()
                )));
            }
            _ => {}
        }

        if self.reason.requires_order() && self.order_id.is_none() {
            return Err(MovementError::InvalidMovement(format!(
                "{} movements must reference an order",
                self.reason.as_str()
            )));
        }
        if self.reason.is_manual() && self.order_id.is_some() {
            return Err(MovementError::InvalidMovement(format!(
                "{} movements must not reference an order",
                self.reason.as_str()
            )));
        }

        if self.reason == MovementReason::Adjustment
            && self.notes.as_deref().map_or(true, |n| n.trim().is_empty())
        {
            return Err(MovementError::InvalidMovement(
                "adjustment movements require non-empty notes".into(),
            ));
        }

        Ok(())
    }
}

impl Entity for StockMovement {
    type Id = MovementId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Declared on-hand vs. ledger-derived total for one item.
///
/// Diagnostic output only: a persistent nonzero drift signals operator
/// attention, never an automatic correction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockReconciliation {
    pub item_id: ItemId,
    /// Declared on-hand count (None for items that are not stock-tracked).
    pub quantity_on_hand: Option<i64>,
    /// Running sum of all movement deltas for the item.
    pub ledger_total: i64,
    /// `quantity_on_hand - ledger_total`, when on-hand is tracked.
    pub drift: Option<i64>,
}

impl StockReconciliation {
    pub fn new(item_id: ItemId, quantity_on_hand: Option<i64>, ledger_total: i64) -> Self {
        Self {
            item_id,
            quantity_on_hand,
            ledger_total,
            drift: quantity_on_hand.map(|q| q - ledger_total),
        }
    }

    pub fn is_consistent(&self) -> bool {
        self.drift.is_none_or(|d| d == 0)
    }
}
