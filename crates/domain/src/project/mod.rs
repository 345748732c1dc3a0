//! Project aggregate and related types.

mod aggregate;
mod commands;
mod events;
mod service;
mod state;

pub use aggregate::Project;
pub use commands::{
    CancelProject, CreateProject, LogWork, MAX_HOURS_PER_ENTRY, MAX_NAME_LEN, MAX_TEXT_LEN,
    ProjectCommand,
};
pub use events::{
    ProjectActivatedData, ProjectCancelledData, ProjectCompletedData, ProjectCreatedData,
    ProjectEvent, WorkLoggedData,
};
pub use service::ProjectService;
pub use state::{ParseStatusError, ProjectStatus};

use thiserror::Error;

use crate::error::BusinessRuleViolation;

/// Reasons a project refuses a command.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProjectError {
    #[error("Project already created")]
    AlreadyCreated,

    #[error("Project does not exist yet")]
    NotCreated,

    #[error("Invalid state transition: cannot {action} from {current} state")]
    InvalidStateTransition {
        current: ProjectStatus,
        action: &'static str,
    },

    #[error("Budget exceeded: {logged} of {budget} hours logged, {requested} more requested")]
    BudgetExceeded {
        budget: u32,
        logged: u32,
        requested: u32,
    },

    #[error("Invariant violated: {0}")]
    InvariantViolated(String),
}

impl ProjectError {
    /// Stable rule code.
    pub fn rule(&self) -> &'static str {
        match self {
            ProjectError::AlreadyCreated => "AlreadyCreated",
            ProjectError::NotCreated => "NotCreated",
            ProjectError::InvalidStateTransition { .. } => "InvalidTransition",
            ProjectError::BudgetExceeded { .. } => "BudgetExceeded",
            ProjectError::InvariantViolated(_) => "InvariantViolated",
        }
    }
}

impl From<ProjectError> for BusinessRuleViolation {
    fn from(err: ProjectError) -> Self {
        BusinessRuleViolation {
            rule: err.rule(),
            message: err.to_string(),
        }
    }
}
