//! Backend wire types
//!
//! Request and response bodies for the backend HTTPS API:
//!
//! - `POST /v1/sessions/register`
//! - `POST /v1/sessions/heartbeat`
//! - `GET /v1/tools`
//! - `POST /v1/tools/invoke`
//! - `DELETE /v1/sessions/connections/{connection_id}`

use crate::mask::Secret;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const REGISTER_PATH: &str = "/v1/sessions/register";
pub const HEARTBEAT_PATH: &str = "/v1/sessions/heartbeat";
pub const TOOLS_PATH: &str = "/v1/tools";
pub const INVOKE_PATH: &str = "/v1/tools/invoke";

/// Path of the disconnect endpoint for one connection.
pub fn disconnect_path(connection_id: &str) -> String {
    format!("/v1/sessions/connections/{}", connection_id)
}

/// Registration request (sent unauthenticated)
#[derive(Debug, Serialize)]
pub struct RegisterRequest<'a> {
    pub api_key: &'a str,
    pub friendly_name: &'a str,
    pub client_tool: &'a str,
}

/// Registration response
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterResponse {
    pub session_id: String,
    pub session_token: Secret,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub profile_id: Option<String>,
    pub connection_id: String,
}

/// One tool descriptor as served by the backend
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolDescriptor {
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// JSON Schema for the tool arguments (opaque here)
    #[serde(default = "empty_object_schema")]
    pub input_schema: Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ToolMetadata>,
}

fn empty_object_schema() -> Value {
    serde_json::json!({"type": "object"})
}

/// Optional descriptor metadata
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ToolMetadata {
    /// Origin server tag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// `GET /v1/tools` response
#[derive(Debug, Clone, Deserialize)]
pub struct ToolCatalogResponse {
    pub tools: Vec<ToolDescriptor>,

    #[serde(default)]
    pub api_version: Option<String>,
}

/// `POST /v1/tools/invoke` request
#[derive(Debug, Serialize)]
pub struct InvokeRequest<'a> {
    pub tool_name: &'a str,
    pub arguments: &'a Value,
}

/// `POST /v1/tools/invoke` response
#[derive(Debug, Clone, Deserialize)]
pub struct InvokeResponse {
    #[serde(default)]
    pub result: Value,

    #[serde(default)]
    pub request_id: Option<String>,
}

/// Structured error body, nested or flat.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ErrorPayload {
    Nested { error: ErrorBody },
    Flat(ErrorBody),
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub code: Option<String>,

    #[serde(default)]
    pub message: Option<String>,
}

impl ErrorPayload {
    pub fn into_body(self) -> ErrorBody {
        match self {
            Self::Nested { error } => error,
            Self::Flat(body) => body,
        }
    }
}
