use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use rentforge_core::{DomainError, DomainResult, ValueObject};

/// The time span an order occupies.
///
/// Either a plain rental span or an extended span with setup/cleanup buffers
/// around it. The buffers, when present, are what actually block the resource:
/// overlap and availability checks always use the effective (outermost)
/// bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RentalWindow {
    Simple {
        start: DateTime<Utc>,
        due: DateTime<Utc>,
    },
    Extended {
        setup_start: DateTime<Utc>,
        order_start: DateTime<Utc>,
        order_end: DateTime<Utc>,
        cleanup_end: DateTime<Utc>,
    },
}

impl RentalWindow {
    pub fn simple(start: DateTime<Utc>, due: DateTime<Utc>) -> DomainResult<Self> {
        if start > due {
            return Err(DomainError::validation("window start must not be after due date"));
        }
        Ok(Self::Simple { start, due })
    }

    pub fn extended(
        setup_start: DateTime<Utc>,
        order_start: DateTime<Utc>,
        order_end: DateTime<Utc>,
        cleanup_end: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if !(setup_start <= order_start && order_start < order_end && order_end <= cleanup_end) {
            return Err(DomainError::validation(
                "extended window must satisfy setup_start <= order_start < order_end <= cleanup_end",
            ));
        }
        Ok(Self::Extended {
            setup_start,
            order_start,
            order_end,
            cleanup_end,
        })
    }

    /// First instant at which the order blocks its items.
    pub fn effective_start(&self) -> DateTime<Utc> {
        match *self {
            RentalWindow::Simple { start, .. } => start,
            RentalWindow::Extended { setup_start, .. } => setup_start,
        }
    }

    /// Last instant at which the order blocks its items.
    pub fn effective_end(&self) -> DateTime<Utc> {
        match *self {
            RentalWindow::Simple { due, .. } => due,
            RentalWindow::Extended { cleanup_end, .. } => cleanup_end,
        }
    }

    pub fn effective_bounds(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        (self.effective_start(), self.effective_end())
    }

    /// The billable rental span, without setup/cleanup buffers.
    pub fn rental_span(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        match *self {
            RentalWindow::Simple { start, due } => (start, due),
            RentalWindow::Extended {
                order_start,
                order_end,
                ..
            } => (order_start, order_end),
        }
    }

    /// Number of billable days of the rental span, partial days rounded up,
    /// never less than one.
    pub fn billable_days(&self) -> i64 {
        let (start, end) = self.rental_span();
        let secs = (end - start).num_seconds();
        let days = (secs + 86_399) / 86_400;
        days.max(1)
    }

    /// Inclusive-interval overlap with `[window_start, window_end]` on the
    /// effective bounds.
    pub fn overlaps(&self, window_start: DateTime<Utc>, window_end: DateTime<Utc>) -> bool {
        self.effective_start() <= window_end && self.effective_end() >= window_start
    }
}

impl ValueObject for RentalWindow {}
