//! Idempotent projection updater.

use async_trait::async_trait;
use event_bus::{EventHandler, HandlerError};
use tokio::sync::RwLock;
use write_store::EventEnvelope;

use crate::{ProjectionError, Result};
use crate::projection::{ProjectionPosition, Projector, Replay};
use crate::read_model::{ReadRepository, View};

/// What happened to one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// Already reflected in the view; nothing changed.
    Duplicate,
    /// Not an event this projector reads.
    Ignored,
}

/// Applies events to views through a [`Projector`], at most once per event.
///
/// The bus may deliver an event more than once. An event whose version is not
/// above the view's `last_applied_version` is discarded, and the repository's
/// conditional upsert covers two deliveries racing each other. An event that
/// skips a version is refused with [`ProjectionError::VersionGap`], so a view
/// never moves past an event it has not applied.
pub struct ProjectionUpdater<R, P> {
    repository: R,
    projector: P,
    position: RwLock<ProjectionPosition>,
}

impl<R, P> ProjectionUpdater<R, P>
where
    P: Projector,
    R: ReadRepository<P::View>,
{
    pub fn new(repository: R, projector: P) -> Self {
        Self {
            repository,
            projector,
            position: RwLock::new(ProjectionPosition::zero()),
        }
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    pub fn projector(&self) -> &P {
        &self.projector
    }

    /// Applies one event to its view.
    #[tracing::instrument(
        skip(self, event),
        fields(
            projection = self.projector.name(),
            event_type = %event.event_type,
            aggregate_id = %event.aggregate_id,
            version = %event.version,
        )
    )]
    pub async fn apply(&self, event: &EventEnvelope) -> Result<ApplyOutcome> {
        if !self.projector.handles(event) {
            return Ok(ApplyOutcome::Ignored);
        }

        let current = self.repository.get(event.aggregate_id).await?;
        let last_applied = current
            .as_ref()
            .map(View::last_applied_version)
            .unwrap_or_default();

        if event.version <= last_applied {
            tracing::debug!(%last_applied, "duplicate event skipped");
            return Ok(self.skipped().await);
        }
        if event.version != last_applied.next() {
            tracing::warn!(
                %last_applied,
                "version gap: earlier events of this aggregate were not applied"
            );
            return Err(ProjectionError::VersionGap {
                view: self.projector.name(),
                aggregate_id: event.aggregate_id,
                expected: last_applied.next(),
                actual: event.version,
            });
        }

        let mut view = self.projector.project(current, event)?;
        view.set_last_applied_version(event.version);

        if !self.repository.upsert(view).await? {
            tracing::debug!("view already advanced by a concurrent delivery");
            return Ok(self.skipped().await);
        }

        metrics::counter!(
            "projection_events_applied_total",
            "projection" => self.projector.name()
        )
        .increment(1);
        let mut position = self.position.write().await;
        *position = position.applied();
        Ok(ApplyOutcome::Applied)
    }

    async fn skipped(&self) -> ApplyOutcome {
        metrics::counter!(
            "projection_duplicates_skipped_total",
            "projection" => self.projector.name()
        )
        .increment(1);
        let mut position = self.position.write().await;
        *position = position.skipped();
        ApplyOutcome::Duplicate
    }
}

#[async_trait]
impl<R, P> EventHandler for ProjectionUpdater<R, P>
where
    P: Projector,
    R: ReadRepository<P::View>,
{
    fn name(&self) -> &str {
        self.projector.name()
    }

    async fn handle(&self, event: &EventEnvelope) -> std::result::Result<(), HandlerError> {
        self.apply(event).await.map(|_| ()).map_err(HandlerError::from)
    }
}

#[async_trait]
impl<R, P> Replay for ProjectionUpdater<R, P>
where
    P: Projector,
    R: ReadRepository<P::View>,
{
    fn name(&self) -> &'static str {
        self.projector.name()
    }

    async fn replay(&self, event: &EventEnvelope) -> Result<()> {
        self.apply(event).await.map(|_| ())
    }

    async fn reset(&self) -> Result<()> {
        self.repository.reset().await?;
        *self.position.write().await = ProjectionPosition::zero();
        tracing::info!(projection = self.projector.name(), "projection reset");
        Ok(())
    }

    async fn position(&self) -> ProjectionPosition {
        *self.position.read().await
    }
}
