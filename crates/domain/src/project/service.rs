//! Project service providing a simplified API for project operations.

use common::AggregateId;
use write_store::{Version, WriteRepository};

use crate::command::{CommandEnvelope, CommandHandler, CommandOutcome, HandlerConfig};
use crate::error::DomainError;

use super::{CancelProject, CreateProject, LogWork, Project, ProjectCommand};

/// Service for managing projects.
///
/// Wraps the command handler with one method per command. `expected_version`
/// pins the command to a version the caller has seen.
pub struct ProjectService<S: WriteRepository> {
    handler: CommandHandler<S, Project>,
}

impl<S: WriteRepository> ProjectService<S> {
    pub fn new(store: S) -> Self {
        Self {
            handler: CommandHandler::new(store),
        }
    }

    pub fn with_config(store: S, config: HandlerConfig) -> Self {
        Self {
            handler: CommandHandler::with_config(store, config),
        }
    }

    /// Returns a reference to the underlying command handler.
    pub fn handler(&self) -> &CommandHandler<S, Project> {
        &self.handler
    }

    /// Executes a prepared envelope.
    pub async fn execute(
        &self,
        envelope: CommandEnvelope<ProjectCommand>,
    ) -> Result<CommandOutcome<Project>, DomainError> {
        self.handler.execute(envelope).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn create_project(
        &self,
        cmd: CreateProject,
    ) -> Result<CommandOutcome<Project>, DomainError> {
        self.handler
            .execute(CommandEnvelope::create(ProjectCommand::Create(cmd)))
            .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn activate(
        &self,
        project_id: AggregateId,
        expected_version: Option<Version>,
    ) -> Result<CommandOutcome<Project>, DomainError> {
        self.send(project_id, ProjectCommand::Activate, expected_version)
            .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn log_work(
        &self,
        project_id: AggregateId,
        cmd: LogWork,
        expected_version: Option<Version>,
    ) -> Result<CommandOutcome<Project>, DomainError> {
        self.send(project_id, ProjectCommand::LogWork(cmd), expected_version)
            .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn complete(
        &self,
        project_id: AggregateId,
        expected_version: Option<Version>,
    ) -> Result<CommandOutcome<Project>, DomainError> {
        self.send(project_id, ProjectCommand::Complete, expected_version)
            .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn cancel(
        &self,
        project_id: AggregateId,
        cmd: CancelProject,
        expected_version: Option<Version>,
    ) -> Result<CommandOutcome<Project>, DomainError> {
        self.send(project_id, ProjectCommand::Cancel(cmd), expected_version)
            .await
    }

    /// Loads the current write-side state of a project.
    pub async fn get_project(&self, project_id: AggregateId) -> Result<Option<Project>, DomainError> {
        self.handler.load(project_id).await
    }

    async fn send(
        &self,
        project_id: AggregateId,
        command: ProjectCommand,
        expected_version: Option<Version>,
    ) -> Result<CommandOutcome<Project>, DomainError> {
        self.handler
            .execute(
                CommandEnvelope::for_aggregate(project_id, command)
                    .with_expected_version(expected_version),
            )
            .await
    }
}
