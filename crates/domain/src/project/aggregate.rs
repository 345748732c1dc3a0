//! Project aggregate implementation.

use chrono::{DateTime, Utc};
use common::AggregateId;
use serde::{Deserialize, Serialize};
use write_store::Version;

use crate::aggregate::Aggregate;

use super::{ProjectCommand, ProjectError, ProjectEvent, ProjectStatus};

/// Project aggregate root.
///
/// A project moves through [`ProjectStatus`] and accumulates logged hours,
/// which may never exceed its budget.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Project {
    id: Option<AggregateId>,

    #[serde(default)]
    version: Version,

    name: String,
    status: ProjectStatus,
    budget_hours: Option<u32>,
    hours_logged: u32,
    work_entries: u32,
    created_at: Option<DateTime<Utc>>,
}

impl Aggregate for Project {
    type Command = ProjectCommand;
    type Event = ProjectEvent;
    type Error = ProjectError;

    fn aggregate_type() -> &'static str {
        "Project"
    }

    fn id(&self) -> Option<AggregateId> {
        self.id
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    fn decide(
        &self,
        aggregate_id: AggregateId,
        command: &ProjectCommand,
    ) -> Result<Vec<ProjectEvent>, ProjectError> {
        match command {
            ProjectCommand::Create(cmd) => {
                if self.id.is_some() {
                    return Err(ProjectError::AlreadyCreated);
                }
                Ok(vec![ProjectEvent::created(
                    aggregate_id,
                    cmd.name.trim().to_string(),
                    cmd.budget_hours,
                )])
            }
            _ if self.id.is_none() => Err(ProjectError::NotCreated),
            ProjectCommand::Activate => {
                self.ensure_transition(ProjectStatus::Active, "activate")?;
                Ok(vec![ProjectEvent::activated()])
            }
            ProjectCommand::LogWork(cmd) => {
                if !self.status.accepts_work() {
                    return Err(ProjectError::InvalidStateTransition {
                        current: self.status,
                        action: "log work",
                    });
                }
                let total = self.hours_logged.saturating_add(cmd.hours);
                if let Some(budget) = self.budget_hours
                    && total > budget
                {
                    return Err(ProjectError::BudgetExceeded {
                        budget,
                        logged: self.hours_logged,
                        requested: cmd.hours,
                    });
                }
                Ok(vec![ProjectEvent::work_logged(
                    cmd.hours,
                    cmd.note.clone(),
                    total,
                )])
            }
            ProjectCommand::Complete => {
                self.ensure_transition(ProjectStatus::Completed, "complete")?;
                Ok(vec![ProjectEvent::completed(self.hours_logged)])
            }
            ProjectCommand::Cancel(cmd) => {
                self.ensure_transition(ProjectStatus::Cancelled, "cancel")?;
                Ok(vec![ProjectEvent::cancelled(cmd.reason.clone())])
            }
        }
    }

    fn apply(&mut self, event: ProjectEvent) {
        match event {
            ProjectEvent::Created(data) => {
                self.id = Some(data.project_id);
                self.name = data.name;
                self.budget_hours = data.budget_hours;
                self.status = ProjectStatus::Created;
                self.created_at = Some(data.created_at);
            }
            ProjectEvent::Activated(_) => self.status = ProjectStatus::Active,
            ProjectEvent::WorkLogged(data) => {
                self.hours_logged = data.total_hours;
                self.work_entries += 1;
            }
            ProjectEvent::Completed(_) => self.status = ProjectStatus::Completed,
            ProjectEvent::Cancelled(_) => self.status = ProjectStatus::Cancelled,
        }
    }

    fn check_invariants(&self) -> Result<(), ProjectError> {
        if self.id.is_some() && self.name.trim().is_empty() {
            return Err(ProjectError::InvariantViolated(
                "a created project must have a name".into(),
            ));
        }
        if let Some(budget) = self.budget_hours
            && self.hours_logged > budget
        {
            return Err(ProjectError::InvariantViolated(format!(
                "{} hours logged against a budget of {budget}",
                self.hours_logged
            )));
        }
        Ok(())
    }
}

impl Project {
    fn ensure_transition(
        &self,
        next: ProjectStatus,
        action: &'static str,
    ) -> Result<(), ProjectError> {
        if self.status.can_transition_to(next) {
            Ok(())
        } else {
            Err(ProjectError::InvalidStateTransition {
                current: self.status,
                action,
            })
        }
    }
}

// Query methods
impl Project {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> ProjectStatus {
        self.status
    }

    pub fn budget_hours(&self) -> Option<u32> {
        self.budget_hours
    }

    pub fn hours_logged(&self) -> u32 {
        self.hours_logged
    }

    pub fn work_entries(&self) -> u32 {
        self.work_entries
    }

    /// Hours left before the budget is exhausted, `None` without a budget.
    pub fn remaining_hours(&self) -> Option<u32> {
        self.budget_hours
            .map(|budget| budget.saturating_sub(self.hours_logged))
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
