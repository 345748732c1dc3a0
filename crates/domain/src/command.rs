//! Command handling infrastructure.

use std::marker::PhantomData;
use std::time::{Duration, Instant};

use common::{AggregateId, Deadline, RetryConfig, retry_on_transient};
use write_store::{
    AggregateRecord, Commit, EventEnvelope, Version, WriteRepository, WriteRepositoryExt,
    WriteStoreError,
};

use crate::aggregate::{Aggregate, DomainEvent, Processed, VersionedEvent};
use crate::error::{DomainError, ValidationError};

/// Commands check their own payload before any aggregate is loaded.
pub trait Validate {
    fn validate(&self) -> Result<(), ValidationError>;
}

/// A command plus the routing and concurrency data the handler needs.
#[derive(Debug, Clone)]
pub struct CommandEnvelope<C> {
    /// Aggregate to change; `None` creates a new one.
    pub target: Option<AggregateId>,

    pub command: C,

    /// When set, the command only applies if the aggregate is still at this
    /// version. Conflicts are then reported instead of retried.
    pub expected_version: Option<Version>,

    /// Key that makes a repeated submission return the first outcome.
    pub idempotency_key: Option<String>,

    /// Identifier assigned when `target` is `None`. Fixed at construction so a
    /// resubmitted envelope addresses the same aggregate.
    new_id: AggregateId,
}

impl<C> CommandEnvelope<C> {
    /// A creation command with a freshly generated identifier.
    pub fn create(command: C) -> Self {
        Self::create_with_id(AggregateId::new(), command)
    }

    /// A creation command with a caller-chosen identifier.
    pub fn create_with_id(aggregate_id: AggregateId, command: C) -> Self {
        Self {
            target: None,
            command,
            expected_version: None,
            idempotency_key: None,
            new_id: aggregate_id,
        }
    }

    /// A command against an existing aggregate.
    pub fn for_aggregate(aggregate_id: AggregateId, command: C) -> Self {
        Self {
            target: Some(aggregate_id),
            command,
            expected_version: None,
            idempotency_key: None,
            new_id: aggregate_id,
        }
    }

    pub fn expect_version(mut self, version: Version) -> Self {
        self.expected_version = Some(version);
        self
    }

    pub fn with_expected_version(mut self, version: Option<Version>) -> Self {
        self.expected_version = version;
        self
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    /// The aggregate this envelope addresses.
    pub fn aggregate_id(&self) -> AggregateId {
        self.target.unwrap_or(self.new_id)
    }

    pub fn is_creation(&self) -> bool {
        self.target.is_none()
    }
}

/// Result of command execution.
#[derive(Debug)]
pub struct CommandOutcome<A: Aggregate> {
    pub aggregate_id: AggregateId,

    /// The aggregate after the command.
    pub aggregate: A,

    /// Events produced and committed. Empty when `replayed` is set.
    pub events: Vec<VersionedEvent<A::Event>>,

    /// Version the command committed.
    pub new_version: Version,

    /// True when the idempotency key matched an earlier commit.
    pub replayed: bool,

    /// Load/decide/save cycles it took.
    pub attempts: u32,
}

/// Tuning for the command handler.
#[derive(Debug, Clone)]
pub struct HandlerConfig {
    /// Extra cycles after a version conflict when the caller did not pin a
    /// version.
    pub max_conflict_retries: u32,

    /// Base pause between conflict retries, multiplied by the attempt number.
    pub conflict_backoff: Duration,

    /// Backoff for transient storage failures.
    pub infrastructure_retry: RetryConfig,

    /// Deadline for each load and save call.
    pub operation_timeout: Duration,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            max_conflict_retries: 3,
            conflict_backoff: Duration::from_millis(5),
            infrastructure_retry: RetryConfig {
                max_attempts: 3,
                initial_delay: Duration::from_millis(50),
                max_delay: Duration::from_secs(1),
                multiplier: 2.0,
            },
            operation_timeout: Duration::from_secs(2),
        }
    }
}

/// Executes commands against aggregates held in a write repository.
///
/// Each attempt loads the aggregate, runs [`Aggregate::process`], and saves
/// state and events with the loaded version as the expected version. The
/// repository either commits everything or nothing.
pub struct CommandHandler<S, A>
where
    S: WriteRepository,
    A: Aggregate,
{
    store: S,
    config: HandlerConfig,
    _phantom: PhantomData<A>,
}

impl<S, A> CommandHandler<S, A>
where
    S: WriteRepository,
    A: Aggregate,
{
    pub fn new(store: S) -> Self {
        Self::with_config(store, HandlerConfig::default())
    }

    pub fn with_config(store: S, config: HandlerConfig) -> Self {
        Self {
            store,
            config,
            _phantom: PhantomData,
        }
    }

    /// Returns a reference to the underlying write repository.
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &HandlerConfig {
        &self.config
    }

    /// Loads an aggregate, `None` if it was never created.
    pub async fn load(&self, aggregate_id: AggregateId) -> Result<Option<A>, DomainError> {
        match self.load_record(aggregate_id).await? {
            Some(record) => Ok(Some(Self::restore(&record)?)),
            None => Ok(None),
        }
    }

    /// Executes a command.
    ///
    /// Conflicts are retried from a fresh load up to `max_conflict_retries`
    /// times unless the envelope pins an expected version. Business rule
    /// violations are never retried. A save that times out is reported as
    /// `OutcomeUnknown`; resubmitting with the same idempotency key is safe.
    #[tracing::instrument(
        skip(self, envelope),
        fields(
            aggregate_type = A::aggregate_type(),
            aggregate_id = %envelope.aggregate_id(),
        )
    )]
    pub async fn execute(
        &self,
        envelope: CommandEnvelope<A::Command>,
    ) -> Result<CommandOutcome<A>, DomainError>
    where
        A::Command: Validate,
    {
        let started = Instant::now();
        let result = self.execute_inner(&envelope).await;

        let outcome = match &result {
            Ok(outcome) if outcome.replayed => "replayed",
            Ok(_) => "committed",
            Err(e) => e.error_code(),
        };
        metrics::counter!(
            "commands_total",
            "aggregate" => A::aggregate_type(),
            "outcome" => outcome
        )
        .increment(1);
        metrics::histogram!("command_duration_seconds", "aggregate" => A::aggregate_type())
            .record(started.elapsed().as_secs_f64());

        match &result {
            Ok(outcome) => tracing::debug!(
                new_version = %outcome.new_version,
                replayed = outcome.replayed,
                attempts = outcome.attempts,
                "command accepted"
            ),
            Err(e) if e.is_business_facing() => {
                tracing::debug!(error = %e, code = e.error_code(), "command rejected")
            }
            Err(e) => tracing::error!(error = %e, code = e.error_code(), "command failed"),
        }

        result
    }

    async fn execute_inner(
        &self,
        envelope: &CommandEnvelope<A::Command>,
    ) -> Result<CommandOutcome<A>, DomainError>
    where
        A::Command: Validate,
    {
        envelope.command.validate()?;

        let aggregate_id = envelope.aggregate_id();
        let mut attempt = 0;

        loop {
            attempt += 1;

            let record = self.load_record(aggregate_id).await?;
            let current = match &record {
                Some(record) => Self::restore(record)?,
                None if !envelope.is_creation() => {
                    return Err(DomainError::AggregateNotFound {
                        aggregate_type: A::aggregate_type(),
                        aggregate_id,
                    });
                }
                None => A::default(),
            };

            if let Some(key) = &envelope.idempotency_key
                && let Some(record) = &record
                && let Some(committed) = record.committed_version_for(key)
            {
                tracing::info!(
                    idempotency_key = %key,
                    committed_version = %committed,
                    "command already applied, replaying outcome"
                );
                return Ok(CommandOutcome {
                    aggregate_id,
                    aggregate: current,
                    events: Vec::new(),
                    new_version: committed,
                    replayed: true,
                    attempts: attempt,
                });
            }

            let current_version = current.version();
            if let Some(expected) = envelope.expected_version
                && expected != current_version
            {
                return Err(DomainError::ConcurrencyConflict {
                    aggregate_id,
                    expected,
                    actual: current_version,
                });
            }

            let processed = current
                .process(aggregate_id, &envelope.command)
                .map_err(|e| DomainError::BusinessRule(e.into()))?;

            if processed.is_noop() {
                return Ok(CommandOutcome {
                    aggregate_id,
                    aggregate: processed.state,
                    events: Vec::new(),
                    new_version: current_version,
                    replayed: false,
                    attempts: attempt,
                });
            }

            let commit =
                Self::build_commit(aggregate_id, &processed, envelope.idempotency_key.clone())?;

            match self.save(commit, current_version).await {
                Ok(new_version) => {
                    return Ok(CommandOutcome {
                        aggregate_id,
                        aggregate: processed.state,
                        events: processed.events,
                        new_version,
                        replayed: false,
                        attempts: attempt,
                    });
                }
                Err(WriteStoreError::ConcurrencyConflict {
                    expected, actual, ..
                }) => {
                    metrics::counter!(
                        "command_conflicts_total",
                        "aggregate" => A::aggregate_type()
                    )
                    .increment(1);

                    if envelope.expected_version.is_some()
                        || attempt > self.config.max_conflict_retries
                    {
                        return Err(DomainError::ConcurrencyConflict {
                            aggregate_id,
                            expected,
                            actual,
                        });
                    }

                    tracing::debug!(
                        attempt,
                        expected = %expected,
                        actual = %actual,
                        "version conflict, retrying from a fresh load"
                    );
                    tokio::time::sleep(self.config.conflict_backoff * attempt).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn load_record(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<Option<AggregateRecord>, DomainError> {
        let store = &self.store;
        let timeout = self.config.operation_timeout;

        let result = retry_on_transient(&self.config.infrastructure_retry, |_| async move {
            match store.load_within(aggregate_id, Deadline::after(timeout)).await {
                Ok(record) => Ok(Some(record)),
                Err(WriteStoreError::AggregateNotFound(_)) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await;

        match result {
            Ok(record) => Ok(record),
            // Nothing was written, so a slow read is a plain infrastructure failure.
            Err(e @ WriteStoreError::Timeout { .. }) => Err(DomainError::Infrastructure(e)),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, commit: Commit, expected_version: Version) -> Result<Version, WriteStoreError> {
        let store = &self.store;
        let timeout = self.config.operation_timeout;

        retry_on_transient(&self.config.infrastructure_retry, |_| {
            let commit = commit.clone();
            async move {
                store
                    .save_within(commit, expected_version, Deadline::after(timeout))
                    .await
            }
        })
        .await
    }

    fn restore(record: &AggregateRecord) -> Result<A, DomainError> {
        let mut aggregate: A = record.state()?;
        aggregate.set_version(record.version);
        Ok(aggregate)
    }

    fn build_commit(
        aggregate_id: AggregateId,
        processed: &Processed<A>,
        idempotency_key: Option<String>,
    ) -> Result<Commit, DomainError> {
        let mut envelopes = Vec::with_capacity(processed.events.len());
        for versioned in &processed.events {
            let envelope = EventEnvelope::builder()
                .aggregate_id(aggregate_id)
                .aggregate_type(A::aggregate_type())
                .event_type(versioned.event.event_type())
                .version(versioned.version)
                .payload(&versioned.event)?
                .build()?;
            envelopes.push(envelope);
        }

        Ok(
            Commit::from_state(aggregate_id, A::aggregate_type(), &processed.state)?
                .with_events(envelopes)
                .with_idempotency_key(idempotency_key),
        )
    }
}
