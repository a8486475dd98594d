//! Backend error taxonomy
//!
//! Every failure produced while talking to the backend is a [`BackendError`].
//! Callers branch on the variant, the HTTP status and the backend error code,
//! never on the rendered message.

use std::fmt;

/// Why the backend answered `401`.
///
/// Expired and suspended sessions take the same re-registration path; they are
/// distinguished only so the log line tells the operator what happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthFailure {
    /// Session token outlived its expiry
    SessionExpired,

    /// Session was suspended server-side
    SessionSuspended,

    /// Preshared credential was rejected at registration
    InvalidCredentials,

    /// Any other 401 cause (backend code, if one was sent)
    Unrecognized(Option<String>),
}

impl AuthFailure {
    /// Classify a backend error code carried by a 401 response.
    pub fn from_code(code: Option<&str>) -> Self {
        match code {
            Some("session_expired") => Self::SessionExpired,
            Some("session_suspended") => Self::SessionSuspended,
            Some("invalid_api_key") | Some("invalid_credentials") => Self::InvalidCredentials,
            other => Self::Unrecognized(other.map(str::to_string)),
        }
    }

    /// Operator-facing description used in log lines.
    pub fn describe(&self) -> &'static str {
        match self {
            Self::SessionExpired => "Session expired, re-registering",
            Self::SessionSuspended => "Session suspended by backend, re-registering",
            Self::InvalidCredentials => "Backend rejected the preshared credential",
            Self::Unrecognized(_) => "Backend rejected the session, re-registering",
        }
    }
}

impl fmt::Display for AuthFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SessionExpired => f.write_str("session_expired"),
            Self::SessionSuspended => f.write_str("session_suspended"),
            Self::InvalidCredentials => f.write_str("invalid_credentials"),
            Self::Unrecognized(Some(code)) => write!(f, "unrecognized ({})", code),
            Self::Unrecognized(None) => f.write_str("unrecognized"),
        }
    }
}

/// Errors surfaced by the HTTP transport and the session manager.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// Connection refused/reset, DNS, TLS handshake, timeouts
    #[error("failed to reach backend: {0}")]
    Network(#[source] reqwest::Error),

    /// Response body crossed the configured ceiling
    #[error("backend response exceeded {limit} bytes")]
    ResponseTooLarge { limit: usize },

    /// 2xx response whose body was not the expected JSON
    #[error("failed to decode backend response: {0}")]
    Decode(#[source] serde_json::Error),

    /// 401 from the backend
    #[error("backend rejected the request ({failure}): {message}")]
    Unauthorized { failure: AuthFailure, message: String },

    /// Any other non-2xx status
    #[error("backend returned HTTP {status}: {message}")]
    Status {
        status: u16,
        code: Option<String>,
        message: String,
    },

    /// Re-registration after a 401 failed
    #[error("re-authentication failed: {0}")]
    Reauthentication(#[source] Box<BackendError>),

    /// A concurrent re-registration attempt failed while this caller waited for it
    #[error("re-authentication attempt already failed")]
    ReauthenticationUnavailable,

    /// Invalid URL or client setup
    #[error("invalid backend configuration: {0}")]
    Config(String),
}

impl BackendError {
    /// HTTP status associated with this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Unauthorized { .. } => Some(401),
            Self::Status { status, .. } => Some(*status),
            Self::Network(e) => e.status().map(|s| s.as_u16()),
            Self::Reauthentication(inner) => inner.status(),
            _ => None,
        }
    }

    /// Backend-provided error code, if any.
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Status { code, .. } => code.as_deref(),
            Self::Unauthorized {
                failure: AuthFailure::Unrecognized(code),
                ..
            } => code.as_deref(),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::Status { status: 429, .. })
    }
}

/// Result alias for backend operations
pub type BackendResult<T> = Result<T, BackendError>;
