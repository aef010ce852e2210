use chrono::{DateTime, Utc};

/// A notification emitted after a committed change.
///
/// Events are:
/// - **immutable** (treat them as facts)
/// - **versioned** (schema evolution)
/// - delivered best-effort, after commit - consumers must tolerate loss and
///   duplicates, and must re-read the store for authoritative state.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable event name/type identifier (e.g. "order.status_changed").
    fn event_type(&self) -> &'static str;

    /// Schema version for this event type.
    fn version(&self) -> u32;

    /// When the change was committed (business time).
    fn occurred_at(&self) -> DateTime<Utc>;
}
