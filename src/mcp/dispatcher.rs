//! Protocol Dispatcher
//!
//! Parses each host line, routes it by method and builds the response.
//!
//! Per message: `Received -> Parsed -> {Routed, ParseError}`.
//!
//! - Parse errors are always answered with `-32700` and a null id
//! - Notifications run for their side effects and are never answered
//! - Backend failures are logged in full and mapped to a fixed `-32603`
//!   message; nothing from the backend reaches the host

use crate::backend::catalog::{CatalogSnapshot, CatalogSource};
use crate::backend::error::BackendResult;
use crate::backend::session::SessionManager;
use crate::mcp::protocol::{
    HostRequest, IncomingMessage, InitializeParams, InitializeResult, McpError, McpResponse,
    RequestId, Tool, ToolCallParams,
};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// What the dispatcher needs from the backend side
#[async_trait]
pub trait ToolBackend: Send + Sync {
    /// Current tool catalog (possibly cached or stale)
    async fn list_tools(&self) -> BackendResult<CatalogSnapshot>;

    /// Invoke one tool and return the backend's `result` payload
    async fn call_tool(&self, name: &str, arguments: &Value) -> BackendResult<Value>;
}

#[async_trait]
impl ToolBackend for SessionManager {
    async fn list_tools(&self) -> BackendResult<CatalogSnapshot> {
        self.tool_catalog().await
    }

    async fn call_tool(&self, name: &str, arguments: &Value) -> BackendResult<Value> {
        self.invoke_tool(name, arguments)
            .await
            .map(|response| response.result)
    }
}

/// Routes host messages to the backend
#[derive(Clone)]
pub struct Dispatcher {
    backend: Arc<dyn ToolBackend>,
}

impl Dispatcher {
    pub fn new(backend: Arc<dyn ToolBackend>) -> Self {
        Self { backend }
    }

    /// Handle one raw line; `None` means nothing is written back.
    pub async fn handle_line(&self, line: &str) -> Option<McpResponse> {
        match IncomingMessage::parse(line) {
            Ok(message) => self.dispatch(message).await,
            Err(err) => {
                warn!(error = %err, "Rejecting unparsable message");
                Some(McpResponse::err(RequestId::Null, McpError::parse_error()))
            }
        }
    }

    /// Route one parsed message.
    pub async fn dispatch(&self, message: IncomingMessage) -> Option<McpResponse> {
        let IncomingMessage { id, method, params } = message;

        let outcome = match HostRequest::from_parts(&method, params) {
            Ok(request) => self.route(request).await,
            Err(err) => Err(err),
        };

        match id {
            Some(id) => Some(match outcome {
                Ok(result) => McpResponse::ok(id, result),
                Err(err) => McpResponse::err(id, err),
            }),
            None => {
                if let Err(err) = outcome {
                    debug!(method = %method, code = err.code, "Notification not handled");
                }
                None
            }
        }
    }

    async fn route(&self, request: HostRequest) -> Result<Value, McpError> {
        debug!(method = request.method(), "Routing host request");
        match request {
            HostRequest::Initialize(params) => Ok(self.initialize(params)),
            HostRequest::ListTools => self.list_tools().await,
            HostRequest::CallTool(params) => self.call_tool(params).await,
        }
    }

    fn initialize(&self, params: InitializeParams) -> Value {
        match &params.client_info {
            Some(client) => debug!(
                client = %client.name,
                client_version = %client.version,
                protocol_version = params.protocol_version.as_deref().unwrap_or("unspecified"),
                "Host initialized"
            ),
            None => debug!("Host initialized without clientInfo"),
        }
        json!(InitializeResult::relay())
    }

    async fn list_tools(&self) -> Result<Value, McpError> {
        let snapshot = self.backend.list_tools().await.map_err(|err| {
            error!(error = %err, "Failed to list tools");
            McpError::internal_error("Failed to list tools")
        })?;

        if snapshot.source == CatalogSource::Stale {
            warn!(tools = snapshot.tools.len(), "Serving stale tool catalog");
        }

        let tools: Vec<Tool> = snapshot.tools.iter().map(Tool::from).collect();
        Ok(json!({ "tools": tools }))
    }

    async fn call_tool(&self, params: ToolCallParams) -> Result<Value, McpError> {
        let result = self
            .backend
            .call_tool(&params.name, &params.arguments)
            .await
            .map_err(|err| {
                error!(
                    tool = %params.name,
                    error = %err,
                    status = err.status(),
                    code = err.code(),
                    "Tool invocation failed"
                );
                McpError::internal_error("Tool invocation failed")
            })?;

        Ok(into_call_result(result))
    }
}

/// Shape a backend result as an MCP `tools/call` result.
///
/// Results that already carry a `content` array pass through; anything else
/// becomes a single text item.
pub fn into_call_result(result: Value) -> Value {
    if result.get("content").map(Value::is_array).unwrap_or(false) {
        return result;
    }
    let text = match result {
        Value::String(text) => text,
        other => other.to_string(),
    };
    json!({ "content": [{ "type": "text", "text": text }] })
}
