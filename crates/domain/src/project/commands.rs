//! Project commands.

use serde::{Deserialize, Serialize};

use crate::command::Validate;
use crate::error::ValidationError;

pub const MAX_NAME_LEN: usize = 120;
pub const MAX_TEXT_LEN: usize = 500;
pub const MAX_HOURS_PER_ENTRY: u32 = 24;

/// Commands accepted by the [`Project`](super::Project) aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ProjectCommand {
    Create(CreateProject),
    Activate,
    LogWork(LogWork),
    Complete,
    Cancel(CancelProject),
}

impl ProjectCommand {
    /// Returns the command name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            ProjectCommand::Create(_) => "CreateProject",
            ProjectCommand::Activate => "ActivateProject",
            ProjectCommand::LogWork(_) => "LogWork",
            ProjectCommand::Complete => "CompleteProject",
            ProjectCommand::Cancel(_) => "CancelProject",
        }
    }
}

/// Command to create a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProject {
    pub name: String,

    /// Upper bound on logged hours, `None` for unbounded.
    #[serde(default)]
    pub budget_hours: Option<u32>,
}

/// Command to log hours against an active project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogWork {
    pub hours: u32,

    #[serde(default)]
    pub note: Option<String>,
}

/// Command to cancel a project.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelProject {
    #[serde(default)]
    pub reason: Option<String>,
}

fn check_text(field: &'static str, value: &Option<String>) -> Result<(), ValidationError> {
    if let Some(text) = value
        && text.chars().count() > MAX_TEXT_LEN
    {
        return Err(ValidationError::new(
            field,
            format!("must be at most {MAX_TEXT_LEN} characters"),
        ));
    }
    Ok(())
}

impl Validate for ProjectCommand {
    fn validate(&self) -> Result<(), ValidationError> {
        match self {
            ProjectCommand::Create(cmd) => {
                let name = cmd.name.trim();
                if name.is_empty() {
                    return Err(ValidationError::new("name", "must not be empty"));
                }
                if name.chars().count() > MAX_NAME_LEN {
                    return Err(ValidationError::new(
                        "name",
                        format!("must be at most {MAX_NAME_LEN} characters"),
                    ));
                }
                if cmd.budget_hours == Some(0) {
                    return Err(ValidationError::new(
                        "budgetHours",
                        "must be greater than 0",
                    ));
                }
                Ok(())
            }
            ProjectCommand::LogWork(cmd) => {
                if cmd.hours == 0 || cmd.hours > MAX_HOURS_PER_ENTRY {
                    return Err(ValidationError::new(
                        "hours",
                        format!("must be between 1 and {MAX_HOURS_PER_ENTRY}"),
                    ));
                }
                check_text("note", &cmd.note)
            }
            ProjectCommand::Cancel(cmd) => check_text("reason", &cmd.reason),
            ProjectCommand::Activate | ProjectCommand::Complete => Ok(()),
        }
    }
}
