//! Query handling over project views.

use std::time::{Duration, Instant};

use common::{AggregateId, Deadline};
use domain::ProjectStatus;
use serde::Serialize;
use write_store::Version;

use crate::error::QueryError;
use crate::read_model::ReadRepository;
use crate::views::ProjectView;

/// Queries over project views.
#[derive(Debug, Clone, PartialEq)]
pub enum ProjectQuery {
    /// One project. With `min_version` the handler waits, within
    /// `read_wait_timeout`, for the view to catch up to that version.
    Get {
        id: AggregateId,
        min_version: Option<Version>,
    },

    List {
        status: Option<ProjectStatus>,
        include_tombstoned: bool,
    },
}

impl ProjectQuery {
    pub fn name(&self) -> &'static str {
        match self {
            ProjectQuery::Get { .. } => "GetProject",
            ProjectQuery::List { .. } => "ListProjects",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QueryResult {
    Project(ProjectView),
    Projects(Vec<ProjectView>),
}

#[derive(Debug, Clone)]
pub struct QueryConfig {
    /// Upper bound on waiting for `min_version`.
    pub read_wait_timeout: Duration,

    /// Pause between reads while waiting.
    pub poll_interval: Duration,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            read_wait_timeout: Duration::from_secs(1),
            poll_interval: Duration::from_millis(10),
        }
    }
}

/// Answers project queries from the read repository.
///
/// Results reflect what the projections have applied so far and may lag the
/// write side.
pub struct ProjectQueryHandler<R> {
    repository: R,
    config: QueryConfig,
}

impl<R> ProjectQueryHandler<R>
where
    R: ReadRepository<ProjectView>,
{
    pub fn new(repository: R, config: QueryConfig) -> Self {
        Self { repository, config }
    }

    #[tracing::instrument(skip(self), fields(query = query.name()))]
    pub async fn execute(&self, query: ProjectQuery) -> Result<QueryResult, QueryError> {
        let started = Instant::now();
        let name = query.name();

        let result = match query {
            ProjectQuery::Get { id, min_version } => {
                self.get(id, min_version).await.map(QueryResult::Project)
            }
            ProjectQuery::List {
                status,
                include_tombstoned,
            } => self
                .list(status, include_tombstoned)
                .await
                .map(QueryResult::Projects),
        };

        let outcome = match &result {
            Ok(_) => "ok",
            Err(e) => e.error_code(),
        };
        metrics::counter!("queries_total", "query" => name, "outcome" => outcome).increment(1);
        metrics::histogram!("query_duration_seconds", "query" => name)
            .record(started.elapsed().as_secs_f64());

        result
    }

    /// One project view. Tombstoned views are not found.
    pub async fn get(
        &self,
        id: AggregateId,
        min_version: Option<Version>,
    ) -> Result<ProjectView, QueryError> {
        let view = match min_version {
            Some(min_version) => self.wait_for(id, min_version).await?,
            None => self.repository.get(id).await?,
        };

        match view {
            Some(view) if !view.tombstoned => Ok(view),
            _ => Err(QueryError::NotFound(id)),
        }
    }

    /// Project views, oldest first.
    pub async fn list(
        &self,
        status: Option<ProjectStatus>,
        include_tombstoned: bool,
    ) -> Result<Vec<ProjectView>, QueryError> {
        let mut views: Vec<ProjectView> = self
            .repository
            .list()
            .await?
            .into_iter()
            .filter(|v| include_tombstoned || !v.tombstoned)
            .filter(|v| status.is_none_or(|s| v.status == s))
            .collect();
        views.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(views)
    }

    async fn wait_for(
        &self,
        id: AggregateId,
        min_version: Version,
    ) -> Result<Option<ProjectView>, QueryError> {
        let deadline = Deadline::after(self.config.read_wait_timeout);
        loop {
            let view = self.repository.get(id).await?;
            if view
                .as_ref()
                .is_some_and(|v| v.last_applied_version >= min_version)
            {
                return Ok(view);
            }
            if deadline.is_expired() {
                tracing::debug!(
                    %id,
                    %min_version,
                    seen = ?view.as_ref().map(|v| v.last_applied_version),
                    "read wait timed out, returning latest view"
                );
                return Ok(view);
            }
            tokio::time::sleep(self.config.poll_interval.min(deadline.remaining())).await;
        }
    }
}
