//! Domain layer of the command engine.
//!
//! - [`Aggregate`]: capability trait for consistency boundaries
//! - [`CommandHandler`]: load → process → save with optimistic concurrency
//! - [`project`]: the Project aggregate and its service

pub mod aggregate;
pub mod command;
pub mod error;
pub mod project;

pub use aggregate::{Aggregate, DomainEvent, Processed, VersionedEvent};
pub use command::{CommandEnvelope, CommandHandler, CommandOutcome, HandlerConfig, Validate};
pub use error::{BusinessRuleViolation, DomainError, ValidationError};
pub use project::{
    CancelProject, CreateProject, LogWork, Project, ProjectCommand, ProjectError, ProjectEvent,
    ProjectService, ProjectStatus,
};
