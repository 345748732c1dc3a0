//! The single entry point adapters call: maps contracts onto commands and
//! queries and outcomes onto responses.

use std::str::FromStr;

use common::AggregateId;
use domain::{CommandEnvelope, ProjectCommand, ProjectService, ProjectStatus};
use projections::{ProjectQuery, ProjectQueryHandler, ProjectView, QueryError, ReadRepository};
use serde::de::DeserializeOwned;
use write_store::WriteRepository;

use crate::contract::{
    CommandRequest, CommandResponse, GetProjectFilter, ListProjectsFilter, QueryRequest,
    QueryResponse, Request, Response,
};
use crate::error::GatewayError;

pub const COMMAND_TYPES: [&str; 5] = [
    "CreateProject",
    "ActivateProject",
    "LogWork",
    "CompleteProject",
    "CancelProject",
];

pub const QUERY_TYPES: [&str; 2] = ["GetProject", "ListProjects"];

/// Scope for ids derived from creation idempotency keys.
const PROJECT_SCOPE: &str = "Project";

pub struct Gateway<S: WriteRepository, R> {
    projects: ProjectService<S>,
    queries: ProjectQueryHandler<R>,
}

impl<S, R> Gateway<S, R>
where
    S: WriteRepository + 'static,
    R: ReadRepository<ProjectView>,
{
    pub fn new(projects: ProjectService<S>, queries: ProjectQueryHandler<R>) -> Self {
        Self { projects, queries }
    }

    pub fn projects(&self) -> &ProjectService<S> {
        &self.projects
    }

    pub fn queries(&self) -> &ProjectQueryHandler<R> {
        &self.queries
    }

    pub async fn handle(&self, request: Request) -> Response {
        match request {
            Request::Command(command) => Response::Command(self.handle_command(command).await),
            Request::Query(query) => Response::Query(self.handle_query(query).await),
        }
    }

    /// Executes a command. Failures are reported in the response, never raised.
    #[tracing::instrument(skip(self, request), fields(command = %request.command_type))]
    pub async fn handle_command(&self, request: CommandRequest) -> CommandResponse {
        let result = match command_envelope(request) {
            Ok(envelope) => self.projects.execute(envelope).await.map_err(GatewayError::from),
            Err(e) => Err(e),
        };

        match result {
            Ok(outcome) => CommandResponse::accepted(outcome.aggregate_id, outcome.new_version),
            Err(e) => {
                tracing::debug!(code = e.error_code(), error = %e, "command rejected");
                CommandResponse::rejected(e.error_code(), e.to_string())
            }
        }
    }

    /// Runs a query. Failures are reported in the response, never raised.
    #[tracing::instrument(skip(self, request), fields(query = %request.query_type))]
    pub async fn handle_query(&self, request: QueryRequest) -> QueryResponse {
        let result = match project_query(request) {
            Ok(query) => self.queries.execute(query).await.map_err(GatewayError::from),
            Err(e) => Err(e),
        }
        .and_then(|data| serde_json::to_value(data).map_err(GatewayError::from));

        match result {
            Ok(data) => QueryResponse::found(data),
            Err(e) => {
                tracing::debug!(code = e.error_code(), error = %e, "query rejected");
                QueryResponse::rejected(e.error_code(), e.to_string())
            }
        }
    }
}

/// Maps a command contract onto an envelope for the Project aggregate.
pub fn command_envelope(
    request: CommandRequest,
) -> Result<CommandEnvelope<ProjectCommand>, GatewayError> {
    let CommandRequest {
        command_type,
        aggregate_id,
        payload,
        expected_version,
        idempotency_key,
    } = request;

    let envelope = if command_type == "CreateProject" {
        let command = ProjectCommand::Create(parse_payload(&command_type, payload)?);
        match (aggregate_id, &idempotency_key) {
            (Some(id), _) => CommandEnvelope::create_with_id(id, command),
            // A keyed retry must land on the aggregate the first attempt created.
            (None, Some(key)) => {
                CommandEnvelope::create_with_id(AggregateId::derived(PROJECT_SCOPE, key), command)
            }
            (None, None) => CommandEnvelope::create(command),
        }
    } else {
        let command = match command_type.as_str() {
            "ActivateProject" => ProjectCommand::Activate,
            "LogWork" => ProjectCommand::LogWork(parse_payload(&command_type, payload)?),
            "CompleteProject" => ProjectCommand::Complete,
            "CancelProject" => ProjectCommand::Cancel(parse_optional(&command_type, payload)?),
            _ => return Err(GatewayError::UnknownCommand(command_type)),
        };
        let id = aggregate_id.ok_or(GatewayError::MissingAggregateId(command_type))?;
        CommandEnvelope::for_aggregate(id, command)
    };

    let envelope = envelope.with_expected_version(expected_version);
    Ok(match idempotency_key {
        Some(key) => envelope.with_idempotency_key(key),
        None => envelope,
    })
}

/// Maps a query contract onto a [`ProjectQuery`].
pub fn project_query(request: QueryRequest) -> Result<ProjectQuery, GatewayError> {
    match request.query_type.as_str() {
        "GetProject" => {
            let filter: GetProjectFilter = parse_payload(&request.query_type, request.filter)?;
            Ok(ProjectQuery::Get {
                id: filter.id,
                min_version: filter.min_version,
            })
        }
        "ListProjects" => {
            let filter: ListProjectsFilter = parse_optional(&request.query_type, request.filter)?;
            let status = filter
                .status
                .map(|s| ProjectStatus::from_str(&s))
                .transpose()
                .map_err(|e| QueryError::InvalidFilter(e.to_string()))?;
            Ok(ProjectQuery::List {
                status,
                include_tombstoned: filter.include_tombstoned,
            })
        }
        _ => Err(GatewayError::UnknownQuery(request.query_type)),
    }
}

fn parse_payload<T: DeserializeOwned>(
    kind: &str,
    payload: serde_json::Value,
) -> Result<T, GatewayError> {
    serde_json::from_value(payload).map_err(|source| GatewayError::InvalidPayload {
        kind: kind.to_string(),
        source,
    })
}

/// Like `parse_payload`, with a missing payload meaning all defaults.
fn parse_optional<T: DeserializeOwned + Default>(
    kind: &str,
    payload: serde_json::Value,
) -> Result<T, GatewayError> {
    if payload.is_null() {
        return Ok(T::default());
    }
    parse_payload(kind, payload)
}
