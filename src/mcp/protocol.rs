//! MCP Protocol Types (JSON-RPC 2.0)
//!
//! Host-facing message types for the relay's server side of the Model Context
//! Protocol.
//!
//! # Protocol Specification
//!
//! - JSON-RPC 2.0: <https://www.jsonrpc.org/specification>
//! - MCP Spec: <https://modelcontextprotocol.io/specification/2024-11-05>
//!
//! # Architecture
//!
//! Parsing happens in two steps, both at the boundary:
//!
//! 1. [`IncomingMessage::parse`] checks the JSON-RPC envelope (object,
//!    `jsonrpc: "2.0"`, string `method`) and separates requests from
//!    notifications by the presence of `id`
//! 2. [`HostRequest::from_parts`] turns the method and params into one of a
//!    closed set of variants, or the JSON-RPC error the host should see
//!
//! Downstream dispatch therefore matches exhaustively on [`HostRequest`].

use crate::backend::types::ToolDescriptor;
use serde::de::{Deserialize, Deserializer};
use serde::Serialize;
use serde_json::Value;

/// JSON-RPC 2.0 version constant
pub const JSONRPC_VERSION: &str = "2.0";

/// MCP protocol revision advertised in `initialize`
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Server name advertised in `initialize`
pub const SERVER_NAME: &str = "mcp-relay";

// JSON-RPC standard error codes
pub const PARSE_ERROR: i32 = -32700;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;

/// Request identifier: number, string, or an explicit `null`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(serde_json::Number),
    String(String),
    Null,
}

impl From<u64> for RequestId {
    fn from(id: u64) -> Self {
        Self::Number(id.into())
    }
}

impl From<&str> for RequestId {
    fn from(id: &str) -> Self {
        Self::String(id.to_string())
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", n),
            Self::String(s) => write!(f, "{:?}", s),
            Self::Null => f.write_str("null"),
        }
    }
}

/// Why a line could not be read as a JSON-RPC message
#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("not a JSON-RPC 2.0 message: {0}")]
    Envelope(&'static str),
}

/// Raw envelope, deserialized from an already-checked JSON object
#[derive(serde::Deserialize)]
struct Envelope {
    #[serde(default)]
    jsonrpc: Option<String>,

    // Absent => None (notification); explicit null => Some(RequestId::Null)
    #[serde(default, deserialize_with = "deserialize_present")]
    id: Option<RequestId>,

    method: Option<Value>,

    #[serde(default)]
    params: Option<Value>,
}

fn deserialize_present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

/// One host message with a valid JSON-RPC 2.0 envelope
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingMessage {
    /// `None` for notifications
    pub id: Option<RequestId>,
    pub method: String,
    pub params: Option<Value>,
}

impl IncomingMessage {
    /// Parse one line of host input.
    ///
    /// # Errors
    ///
    /// Returns [`MessageError`] when the text is not JSON, not an object,
    /// lacks `jsonrpc: "2.0"`, has no string `method`, or carries an id that
    /// is neither number, string nor null.
    pub fn parse(line: &str) -> Result<Self, MessageError> {
        let value: Value = serde_json::from_str(line)?;
        if !value.is_object() {
            return Err(MessageError::Envelope("expected a JSON object"));
        }

        let envelope: Envelope = serde_json::from_value(value)?;
        if envelope.jsonrpc.as_deref() != Some(JSONRPC_VERSION) {
            return Err(MessageError::Envelope("missing jsonrpc \"2.0\""));
        }
        let method = match envelope.method {
            Some(Value::String(method)) => method,
            _ => return Err(MessageError::Envelope("missing string method")),
        };

        Ok(Self {
            id: envelope.id,
            method,
            params: envelope.params,
        })
    }

    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// The closed set of methods the relay serves
#[derive(Debug, Clone, PartialEq)]
pub enum HostRequest {
    Initialize(InitializeParams),
    ListTools,
    CallTool(ToolCallParams),
}

impl HostRequest {
    /// Validate method and params.
    ///
    /// # Errors
    ///
    /// `-32601` for unknown methods, `-32602` for a `tools/call` without a
    /// string `name`.
    pub fn from_parts(method: &str, params: Option<Value>) -> Result<Self, McpError> {
        match method {
            "initialize" => Ok(Self::Initialize(InitializeParams::lenient(params))),
            "tools/list" => Ok(Self::ListTools),
            "tools/call" => ToolCallParams::from_params(params).map(Self::CallTool),
            other => Err(McpError::method_not_found(other)),
        }
    }

    pub fn method(&self) -> &'static str {
        match self {
            Self::Initialize(_) => "initialize",
            Self::ListTools => "tools/list",
            Self::CallTool(_) => "tools/call",
        }
    }
}

/// A JSON-RPC 2.0 response message
///
/// A response either contains a `result` or an `error`, but never both.
///
/// # Example (Error)
///
/// ```json
/// {
///   "jsonrpc": "2.0",
///   "id": 1,
///   "error": {"code": -32601, "message": "Method not found: resources/list"}
/// }
/// ```
#[derive(Debug, Clone, Serialize, serde::Deserialize, PartialEq)]
pub struct McpResponse {
    /// JSON-RPC version (always "2.0")
    pub jsonrpc: String,

    /// Identifier echoed from the request (null for parse errors)
    pub id: RequestId,

    /// Result payload (present on success)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    /// Error information (present on failure)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<McpError>,
}

impl McpResponse {
    /// Create a successful response
    pub fn ok(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response
    pub fn err(id: RequestId, error: McpError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }

    /// Serialize as one line (no trailing newline).
    pub fn to_frame(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// A JSON-RPC 2.0 error object
///
/// Messages are fixed strings chosen by the relay; backend details never go here.
#[derive(Debug, Clone, Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct McpError {
    pub code: i32,
    pub message: String,
}

impl McpError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Parse error (-32700): Invalid JSON was received
    pub fn parse_error() -> Self {
        Self::new(PARSE_ERROR, "Parse error")
    }

    /// Method not found (-32601)
    pub fn method_not_found(method: impl Into<String>) -> Self {
        Self::new(METHOD_NOT_FOUND, format!("Method not found: {}", method.into()))
    }

    /// Invalid params (-32602)
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(INVALID_PARAMS, message)
    }

    /// Internal error (-32603)
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(INTERNAL_ERROR, message)
    }
}

impl std::fmt::Display for McpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[Error {}] {}", self.code, self.message)
    }
}

impl std::error::Error for McpError {}

/// `initialize` parameters; only used for logging, so unknown shapes are tolerated
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize)]
pub struct InitializeParams {
    #[serde(rename = "protocolVersion", default)]
    pub protocol_version: Option<String>,

    #[serde(rename = "clientInfo", default)]
    pub client_info: Option<ClientInfo>,
}

impl InitializeParams {
    fn lenient(params: Option<Value>) -> Self {
        params
            .and_then(|value| serde_json::from_value(value).ok())
            .unwrap_or_default()
    }
}

/// Client identification information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, serde::Deserialize)]
pub struct ClientInfo {
    pub name: String,

    #[serde(default)]
    pub version: String,
}

/// `tools/call` parameters
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallParams {
    /// Name of the tool to call
    pub name: String,

    /// Tool arguments (`{}` when absent or null)
    pub arguments: Value,
}

impl ToolCallParams {
    fn from_params(params: Option<Value>) -> Result<Self, McpError> {
        let mut params = match params {
            Some(Value::Object(map)) => map,
            _ => return Err(McpError::invalid_params("Invalid params: missing tool name")),
        };

        let name = match params.remove("name") {
            Some(Value::String(name)) => name,
            _ => return Err(McpError::invalid_params("Invalid params: missing tool name")),
        };

        let arguments = match params.remove("arguments") {
            None | Some(Value::Null) => Value::Object(serde_json::Map::new()),
            Some(arguments) => arguments,
        };

        Ok(Self { name, arguments })
    }
}

/// `initialize` result
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct InitializeResult {
    #[serde(rename = "protocolVersion")]
    pub protocol_version: &'static str,

    pub capabilities: Value,

    #[serde(rename = "serverInfo")]
    pub server_info: ServerInfo,
}

impl InitializeResult {
    /// Static server metadata
    pub fn relay() -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            capabilities: serde_json::json!({"tools": {"listChanged": false}}),
            server_info: ServerInfo {
                name: SERVER_NAME,
                version: env!("CARGO_PKG_VERSION"),
            },
        }
    }
}

/// Server identification information
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ServerInfo {
    pub name: &'static str,
    pub version: &'static str,
}

/// Host-facing tool definition
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Tool {
    pub name: String,
    pub description: String,

    /// Tool input schema (JSON Schema)
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

impl From<&ToolDescriptor> for Tool {
    fn from(descriptor: &ToolDescriptor) -> Self {
        Self {
            name: descriptor.name.clone(),
            description: descriptor.description.clone(),
            input_schema: descriptor.input_schema.clone(),
        }
    }
}
