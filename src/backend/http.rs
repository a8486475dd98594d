//! Backend HTTP Transport
//!
//! One request/response cycle against the backend HTTPS API.
//!
//! # Behavior
//!
//! - Every request carries `Content-Type: application/json`, a `User-Agent`
//!   and a fresh `X-Request-Id`; authenticated requests add `X-Session-Token`
//! - TLS certificates are validated unless `allow_self_signed` is set, which
//!   is logged as a warning when the client is built
//! - Response bodies are streamed and the connection is dropped as soon as
//!   the accumulated size crosses `max_response_bytes`
//! - Failures are classified into [`BackendError`] variants: network, decode,
//!   401 (with [`AuthFailure`]), other statuses (with backend code + message)

use crate::backend::error::{AuthFailure, BackendError, BackendResult};
use crate::backend::types::{ErrorBody, ErrorPayload};
use crate::config::BackendConfig;
use crate::mask::{redact, Secret};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// Header carrying the session token on authenticated requests
pub const SESSION_TOKEN_HEADER: &str = "X-Session-Token";

/// Header carrying a per-request correlation id
pub const REQUEST_ID_HEADER: &str = "X-Request-Id";

const USER_AGENT: &str = concat!("mcp-relay/", env!("CARGO_PKG_VERSION"));

/// Longest raw error body kept in an error message
const MAX_ERROR_TEXT: usize = 512;

/// HTTP transport for the backend API
///
/// Cheap to share behind an `Arc`; the underlying `reqwest::Client` pools
/// connections.
#[derive(Debug)]
pub struct HttpTransport {
    /// Reqwest HTTP client
    client: reqwest::Client,

    /// Backend base URL (may carry a path prefix)
    base_url: Url,

    /// Hard ceiling on response body size
    max_response_bytes: usize,

    /// Preshared credential, kept only to scrub it from error text
    credential: Secret,
}

impl HttpTransport {
    /// Build a transport from the backend configuration
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Config`] if the server URL cannot be used as a
    /// base URL or the HTTP client cannot be built.
    pub fn new(config: &BackendConfig) -> BackendResult<Self> {
        let base_url = Url::parse(&config.server_url).map_err(|e| {
            BackendError::Config(format!("invalid server URL '{}': {}", config.server_url, e))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(BackendError::Config(format!(
                "server URL '{}' cannot be used as a base URL",
                config.server_url
            )));
        }

        let mut builder = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(USER_AGENT);

        if config.allow_self_signed {
            warn!(
                server = %base_url,
                "TLS certificate validation is disabled (allow_self_signed); use only for development"
            );
            builder = builder.danger_accept_invalid_certs(true);
        }

        let client = builder
            .build()
            .map_err(|e| BackendError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            max_response_bytes: config.max_response_bytes,
            credential: config.api_key.clone(),
        })
    }

    /// Perform one request and decode the JSON response body into `T`
    ///
    /// An empty 2xx body decodes as JSON `null`, so `T = Value` or `T = ()`
    /// work for endpoints that answer without content.
    ///
    /// # Arguments
    ///
    /// * `method` - HTTP method
    /// * `path` - Endpoint path, appended segment by segment to the base URL
    /// * `body` - Optional JSON body
    /// * `session_token` - Attached as `X-Session-Token` when present
    pub async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        session_token: Option<&Secret>,
    ) -> BackendResult<T> {
        let url = self.endpoint(path)?;
        let request_id = Uuid::new_v4();

        let mut builder = self
            .client
            .request(method.clone(), url)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .header(REQUEST_ID_HEADER, request_id.to_string());

        if let Some(token) = session_token {
            builder = builder.header(SESSION_TOKEN_HEADER, token.expose());
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }

        debug!(
            %method,
            path,
            %request_id,
            authenticated = session_token.is_some(),
            "Sending backend request"
        );

        let response = builder.send().await.map_err(BackendError::Network)?;
        let status = response.status();
        let bytes = read_body_with_limit(response, self.max_response_bytes).await?;

        debug!(
            status = status.as_u16(),
            bytes = bytes.len(),
            %request_id,
            "Backend responded"
        );

        if status.is_success() {
            decode_body(&bytes)
        } else {
            Err(self.classify_failure(status, &bytes, session_token))
        }
    }

    /// Append `path` to the base URL, one percent-encoded segment at a time.
    fn endpoint(&self, path: &str) -> BackendResult<Url> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                BackendError::Config(format!(
                    "server URL '{}' cannot be used as a base URL",
                    self.base_url
                ))
            })?;
            segments
                .pop_if_empty()
                .extend(path.split('/').filter(|s| !s.is_empty()));
        }
        Ok(url)
    }

    /// Turn a non-2xx response into a typed error.
    fn classify_failure(
        &self,
        status: StatusCode,
        bytes: &[u8],
        session_token: Option<&Secret>,
    ) -> BackendError {
        let structured = serde_json::from_slice::<ErrorPayload>(bytes)
            .ok()
            .map(ErrorPayload::into_body);

        let (code, message) = match structured {
            Some(ErrorBody { code, message }) if code.is_some() || message.is_some() => {
                let message = message.unwrap_or_else(|| reason(status));
                (code, message)
            }
            _ => (None, raw_error_text(status, bytes)),
        };

        let mut secrets = vec![self.credential.expose()];
        if let Some(token) = session_token {
            secrets.push(token.expose());
        }
        // Redact before truncating so a cut cannot leave part of a secret behind
        let message: String = redact(&message, &secrets)
            .chars()
            .take(MAX_ERROR_TEXT)
            .collect();

        if status == StatusCode::UNAUTHORIZED {
            BackendError::Unauthorized {
                failure: AuthFailure::from_code(code.as_deref()),
                message,
            }
        } else {
            BackendError::Status {
                status: status.as_u16(),
                code,
                message,
            }
        }
    }
}

/// Read a response body while enforcing a hard byte limit.
///
/// Returning early drops the response, which aborts the connection.
async fn read_body_with_limit(
    mut response: reqwest::Response,
    limit: usize,
) -> BackendResult<Vec<u8>> {
    if let Some(declared) = response.content_length() {
        if declared > limit as u64 {
            return Err(BackendError::ResponseTooLarge { limit });
        }
    }

    let mut body = Vec::new();
    while let Some(chunk) = response.chunk().await.map_err(BackendError::Network)? {
        if body.len().saturating_add(chunk.len()) > limit {
            return Err(BackendError::ResponseTooLarge { limit });
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

fn decode_body<T: DeserializeOwned>(bytes: &[u8]) -> BackendResult<T> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return serde_json::from_value(Value::Null).map_err(BackendError::Decode);
    }
    serde_json::from_slice(bytes).map_err(BackendError::Decode)
}

fn raw_error_text(status: StatusCode, bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    let text = text.trim();
    if text.is_empty() {
        return reason(status);
    }
    text.to_string()
}

fn reason(status: StatusCode) -> String {
    status
        .canonical_reason()
        .unwrap_or("unknown error")
        .to_string()
}
