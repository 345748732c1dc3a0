//! Write side persistence for the command engine.
//!
//! - [`WriteRepository`]: load aggregate records and save commits with an
//!   optimistic version check
//! - [`EventEnvelope`]: the persisted and wire form of a domain event
//! - [`OutboxEntry`]: events committed together with the aggregate and awaiting
//!   handoff to the event bus
//! - [`InMemoryWriteRepository`]: the in-process implementation

pub mod error;
pub mod event;
pub mod memory;
pub mod outbox;
pub mod record;
pub mod store;

pub use common::AggregateId;
pub use error::{Result, WriteStoreError};
pub use event::{EnvelopeError, EventEnvelope, EventEnvelopeBuilder, EventId, Version};
pub use memory::InMemoryWriteRepository;
pub use outbox::{OutboxEntry, OutboxStatus};
pub use record::{AggregateRecord, Commit, MAX_IDEMPOTENCY_KEYS};
pub use store::{EventStream, WriteRepository, WriteRepositoryExt, validate_commit};
