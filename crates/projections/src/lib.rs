//! Read side of the command engine.
//!
//! - [`Projector`]: pure mapping from events to a view
//! - [`ProjectionUpdater`]: idempotent bus handler that writes views
//! - [`ReadRepository`]: query-optimized view storage
//! - [`ProjectQueryHandler`]: queries over project views
//! - [`ProjectionProcessor`]: catch-up and rebuild from the event log

pub mod error;
pub mod processor;
pub mod projection;
pub mod query;
pub mod read_model;
pub mod updater;
pub mod views;

pub use error::{ProjectionError, QueryError, Result};
pub use processor::ProjectionProcessor;
pub use projection::{ProjectionPosition, Projector, Replay};
pub use query::{ProjectQuery, ProjectQueryHandler, QueryConfig, QueryResult};
pub use read_model::{InMemoryReadRepository, ReadRepository, View};
pub use updater::{ApplyOutcome, ProjectionUpdater};
pub use views::{ProjectProjector, ProjectView};
