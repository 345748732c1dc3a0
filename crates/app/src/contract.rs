//! Wire contracts between adapters and the engine.

use common::AggregateId;
use serde::{Deserialize, Serialize};
use write_store::Version;

/// A command submitted by an adapter.
///
/// `payload` carries the command's fields; its shape depends on `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandRequest {
    #[serde(rename = "type")]
    pub command_type: String,

    /// Target aggregate. Optional on creation, where it pins the new id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregate_id: Option<AggregateId>,

    #[serde(default)]
    pub payload: serde_json::Value,

    /// When set, the command fails with `ConcurrencyConflict` unless the
    /// aggregate is at exactly this version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_version: Option<Version>,

    /// Resubmitting with the same key after an unknown outcome returns the
    /// earlier result instead of applying the command twice.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

impl CommandRequest {
    pub fn new(command_type: impl Into<String>) -> Self {
        Self {
            command_type: command_type.into(),
            aggregate_id: None,
            payload: serde_json::Value::Null,
            expected_version: None,
            idempotency_key: None,
        }
    }

    pub fn aggregate(mut self, id: AggregateId) -> Self {
        self.aggregate_id = Some(id);
        self
    }

    pub fn payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn expected_version(mut self, version: Version) -> Self {
        self.expected_version = Some(version);
        self
    }

    pub fn idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResponse {
    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregate_id: Option<AggregateId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_version: Option<Version>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl CommandResponse {
    pub fn accepted(aggregate_id: AggregateId, new_version: Version) -> Self {
        Self {
            success: true,
            aggregate_id: Some(aggregate_id),
            new_version: Some(new_version),
            error_code: None,
            error_message: None,
        }
    }

    pub fn rejected(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            aggregate_id: None,
            new_version: None,
            error_code: Some(code.into()),
            error_message: Some(message.into()),
        }
    }
}

/// A query submitted by an adapter. Results may lag the write side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    #[serde(rename = "type")]
    pub query_type: String,

    #[serde(default)]
    pub filter: serde_json::Value,
}

impl QueryRequest {
    pub fn new(query_type: impl Into<String>, filter: serde_json::Value) -> Self {
        Self {
            query_type: query_type.into(),
            filter,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl QueryResponse {
    pub fn found(data: serde_json::Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error_code: None,
            error_message: None,
        }
    }

    pub fn rejected(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error_code: Some(code.into()),
            error_message: Some(message.into()),
        }
    }
}

/// One line of input for line-oriented adapters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Request {
    Command(CommandRequest),
    Query(QueryRequest),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Response {
    Command(CommandResponse),
    Query(QueryResponse),
}

/// Filter of `GetProject`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct GetProjectFilter {
    pub id: AggregateId,
    #[serde(default)]
    pub min_version: Option<Version>,
}

/// Filter of `ListProjects`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct ListProjectsFilter {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub include_tombstoned: bool,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn command_request_uses_camel_case() {
        let id = AggregateId::new();
        let request: CommandRequest = serde_json::from_value(json!({
            "type": "LogWork",
            "aggregateId": id.to_string(),
            "payload": { "hours": 3 },
            "expectedVersion": 2,
            "idempotencyKey": "k-1"
        }))
        .unwrap();

        assert_eq!(request.command_type, "LogWork");
        assert_eq!(request.aggregate_id, Some(id));
        assert_eq!(request.expected_version, Some(Version::new(2)));
        assert_eq!(request.idempotency_key.as_deref(), Some("k-1"));
    }

    #[test]
    fn optional_command_fields_default() {
        let request: CommandRequest =
            serde_json::from_value(json!({ "type": "CreateProject" })).unwrap();
        assert_eq!(request, CommandRequest::new("CreateProject"));
    }

    #[test]
    fn responses_omit_absent_fields() {
        let accepted = serde_json::to_value(CommandResponse::accepted(
            AggregateId::new(),
            Version::new(1),
        ))
        .unwrap();
        assert_eq!(accepted["success"], true);
        assert_eq!(accepted["newVersion"], 1);
        assert!(accepted.get("errorCode").is_none());

        let rejected =
            serde_json::to_value(QueryResponse::rejected("NotFound", "missing")).unwrap();
        assert_eq!(rejected, json!({
            "success": false,
            "errorCode": "NotFound",
            "errorMessage": "missing"
        }));
    }

    #[test]
    fn request_lines_are_tagged_by_kind() {
        let line = r#"{"kind":"query","type":"ListProjects","filter":{}}"#;
        let request: Request = serde_json::from_str(line).unwrap();
        assert_eq!(
            request,
            Request::Query(QueryRequest::new("ListProjects", json!({})))
        );
    }
}
