//! Core projection traits and position tracking.

use async_trait::async_trait;
use event_bus::EventFilter;
use write_store::EventEnvelope;

use crate::Result;
use crate::read_model::View;

/// Tracks how many events a projection has applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProjectionPosition {
    pub events_applied: u64,
    pub duplicates_skipped: u64,
}

impl ProjectionPosition {
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn applied(&self) -> Self {
        Self {
            events_applied: self.events_applied + 1,
            ..*self
        }
    }

    pub fn skipped(&self) -> Self {
        Self {
            duplicates_skipped: self.duplicates_skipped + 1,
            ..*self
        }
    }
}

impl std::fmt::Display for ProjectionPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "position(applied={}, skipped={})",
            self.events_applied, self.duplicates_skipped
        )
    }
}

/// Maps events of one aggregate type to a view.
///
/// Projectors are pure: storage, idempotency and version bookkeeping belong
/// to the [`ProjectionUpdater`](crate::ProjectionUpdater).
pub trait Projector: Send + Sync + 'static {
    type View: View;

    fn name(&self) -> &'static str;

    /// Aggregate type whose events this projector reads.
    fn aggregate_type(&self) -> &'static str;

    /// Event types this projector reads.
    fn event_types(&self) -> &'static [&'static str];

    /// Folds one event into the view. `current` is `None` before the
    /// aggregate's first event.
    fn project(&self, current: Option<Self::View>, event: &EventEnvelope) -> Result<Self::View>;

    fn handles(&self, event: &EventEnvelope) -> bool {
        event.aggregate_type == self.aggregate_type()
            && self.event_types().contains(&event.event_type.as_str())
    }

    /// Bus subscription filter covering every event type, so one aggregate's
    /// events stay on one ordered stream.
    fn filter(&self) -> EventFilter {
        EventFilter::types(self.event_types().iter().copied())
    }
}

/// A projection that can be rebuilt from the event log.
#[async_trait]
pub trait Replay: Send + Sync {
    fn name(&self) -> &'static str;

    /// Applies one event from the log.
    async fn replay(&self, event: &EventEnvelope) -> Result<()>;

    /// Drops all derived state.
    async fn reset(&self) -> Result<()>;

    async fn position(&self) -> ProjectionPosition;
}
