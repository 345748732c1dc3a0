//! Project summary view: one row per project, tombstoned on cancellation.

use chrono::{DateTime, Utc};
use common::AggregateId;
use domain::{ProjectEvent, ProjectStatus};
use serde::{Deserialize, Serialize};
use write_store::{EventEnvelope, Version};

use crate::projection::Projector;
use crate::read_model::View;
use crate::{ProjectionError, Result};

/// Query-side summary of a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectView {
    pub id: AggregateId,
    pub name: String,
    pub status: ProjectStatus,
    pub budget_hours: Option<u32>,
    pub hours_logged: u32,
    pub work_entries: u32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancel_reason: Option<String>,

    /// Set once the project is cancelled. Tombstoned views are hidden from
    /// queries unless asked for.
    pub tombstoned: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_applied_version: Version,
}

impl ProjectView {
    pub fn remaining_hours(&self) -> Option<u32> {
        self.budget_hours
            .map(|budget| budget.saturating_sub(self.hours_logged))
    }
}

impl View for ProjectView {
    fn id(&self) -> AggregateId {
        self.id
    }

    fn last_applied_version(&self) -> Version {
        self.last_applied_version
    }

    fn set_last_applied_version(&mut self, version: Version) {
        self.last_applied_version = version;
    }
}

/// Builds [`ProjectView`]s from Project events.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProjectProjector;

impl Projector for ProjectProjector {
    type View = ProjectView;

    fn name(&self) -> &'static str {
        "ProjectView"
    }

    fn aggregate_type(&self) -> &'static str {
        "Project"
    }

    fn event_types(&self) -> &'static [&'static str] {
        &ProjectEvent::TYPES
    }

    fn project(&self, current: Option<ProjectView>, event: &EventEnvelope) -> Result<ProjectView> {
        let project_event: ProjectEvent = serde_json::from_value(event.payload.clone())?;

        let view = match (current, project_event) {
            (None, ProjectEvent::Created(data)) => {
                return Ok(ProjectView {
                    id: event.aggregate_id,
                    name: data.name,
                    status: ProjectStatus::Created,
                    budget_hours: data.budget_hours,
                    hours_logged: 0,
                    work_entries: 0,
                    cancel_reason: None,
                    tombstoned: false,
                    created_at: data.created_at,
                    updated_at: data.created_at,
                    last_applied_version: Version::initial(),
                });
            }
            (Some(view), ProjectEvent::Created(_)) => {
                return Err(ProjectionError::Projection(format!(
                    "project {} was created twice",
                    view.id
                )));
            }
            (None, _) => {
                return Err(ProjectionError::MissingView {
                    view: self.name(),
                    aggregate_id: event.aggregate_id,
                    version: event.version,
                });
            }
            (Some(view), ProjectEvent::Activated(data)) => ProjectView {
                status: ProjectStatus::Active,
                updated_at: data.activated_at,
                ..view
            },
            (Some(view), ProjectEvent::WorkLogged(data)) => ProjectView {
                hours_logged: data.total_hours,
                work_entries: view.work_entries + 1,
                updated_at: data.logged_at,
                ..view
            },
            (Some(view), ProjectEvent::Completed(data)) => ProjectView {
                status: ProjectStatus::Completed,
                hours_logged: data.total_hours,
                updated_at: data.completed_at,
                ..view
            },
            (Some(view), ProjectEvent::Cancelled(data)) => ProjectView {
                status: ProjectStatus::Cancelled,
                cancel_reason: data.reason,
                tombstoned: true,
                updated_at: data.cancelled_at,
                ..view
            },
        };
        Ok(view)
    }
}
