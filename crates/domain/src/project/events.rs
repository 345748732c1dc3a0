//! Project domain events.

use chrono::{DateTime, Utc};
use common::AggregateId;
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;

/// Events that can occur on a project aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ProjectEvent {
    Created(ProjectCreatedData),
    Activated(ProjectActivatedData),
    WorkLogged(WorkLoggedData),
    Completed(ProjectCompletedData),
    Cancelled(ProjectCancelledData),
}

impl ProjectEvent {
    /// Every event type a project emits, for subscription filters.
    pub const TYPES: [&'static str; 5] =
        ["Created", "Activated", "WorkLogged", "Completed", "Cancelled"];

    pub fn created(project_id: AggregateId, name: String, budget_hours: Option<u32>) -> Self {
        ProjectEvent::Created(ProjectCreatedData {
            project_id,
            name,
            budget_hours,
            created_at: Utc::now(),
        })
    }

    pub fn activated() -> Self {
        ProjectEvent::Activated(ProjectActivatedData {
            activated_at: Utc::now(),
        })
    }

    pub fn work_logged(hours: u32, note: Option<String>, total_hours: u32) -> Self {
        ProjectEvent::WorkLogged(WorkLoggedData {
            hours,
            note,
            total_hours,
            logged_at: Utc::now(),
        })
    }

    pub fn completed(total_hours: u32) -> Self {
        ProjectEvent::Completed(ProjectCompletedData {
            total_hours,
            completed_at: Utc::now(),
        })
    }

    pub fn cancelled(reason: Option<String>) -> Self {
        ProjectEvent::Cancelled(ProjectCancelledData {
            reason,
            cancelled_at: Utc::now(),
        })
    }
}

impl DomainEvent for ProjectEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ProjectEvent::Created(_) => "Created",
            ProjectEvent::Activated(_) => "Activated",
            ProjectEvent::WorkLogged(_) => "WorkLogged",
            ProjectEvent::Completed(_) => "Completed",
            ProjectEvent::Cancelled(_) => "Cancelled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectCreatedData {
    pub project_id: AggregateId,
    pub name: String,
    pub budget_hours: Option<u32>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectActivatedData {
    pub activated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkLoggedData {
    pub hours: u32,
    pub note: Option<String>,

    /// Hours logged on the project including this entry.
    pub total_hours: u32,
    pub logged_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectCompletedData {
    pub total_hours: u32,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectCancelledData {
    pub reason: Option<String>,
    pub cancelled_at: DateTime<Utc>,
}
