//! Project lifecycle.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The status of a project in its lifecycle.
///
/// ```text
/// Created ──► Active ──► Completed
///    │          │
///    └──────────┴──────► Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ProjectStatus {
    #[default]
    Created,
    Active,
    Completed,
    Cancelled,
}

impl ProjectStatus {
    /// Returns true if the lifecycle allows moving to `next`.
    pub fn can_transition_to(&self, next: ProjectStatus) -> bool {
        use ProjectStatus::*;
        matches!(
            (self, next),
            (Created, Active) | (Active, Completed) | (Active, Cancelled) | (Created, Cancelled)
        )
    }

    /// Work can only be logged against an active project.
    pub fn accepts_work(&self) -> bool {
        matches!(self, ProjectStatus::Active)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ProjectStatus::Completed | ProjectStatus::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Created => "Created",
            ProjectStatus::Active => "Active",
            ProjectStatus::Completed => "Completed",
            ProjectStatus::Cancelled => "Cancelled",
        }
    }
}

impl std::fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Unknown status name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown project status '{0}'")]
pub struct ParseStatusError(pub String);

impl FromStr for ProjectStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Created" => Ok(ProjectStatus::Created),
            "Active" => Ok(ProjectStatus::Active),
            "Completed" => Ok(ProjectStatus::Completed),
            "Cancelled" => Ok(ProjectStatus::Cancelled),
            other => Err(ParseStatusError(other.to_string())),
        }
    }
}
