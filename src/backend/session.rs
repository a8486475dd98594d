//! Session Manager
//!
//! Owns the single authentication session with the backend and keeps it alive.
//!
//! # Lifecycle
//!
//! 1. [`SessionManager::register`] obtains a session, replacing any previous one
//!    wholesale, invalidates the catalog cache and (re)starts the heartbeat
//! 2. A heartbeat task sends an authenticated no-op on a fixed interval
//! 3. [`SessionManager::invoke`] performs authenticated requests and, on `401`,
//!    re-registers once and retries the request once
//! 4. [`SessionManager::shutdown`] stops the heartbeat, sends a best-effort
//!    disconnect bounded by a timeout, and clears the session
//!
//! # Re-authentication gate
//!
//! Only the holder of `reauth_gate` may register. Every request records the
//! session epoch and the number of registration attempts it saw when it was
//! sent. A caller that hit `401` takes the gate and then:
//!
//! - epoch moved: another caller already re-registered, just retry
//! - an attempt ran but the epoch did not move: that attempt failed, fail fast
//! - neither: register itself
//!
//! Concurrent `401`s therefore share one registration. Heartbeats never touch
//! the gate.

use crate::backend::catalog::{CatalogCache, CatalogSnapshot};
use crate::backend::error::{BackendError, BackendResult};
use crate::backend::http::HttpTransport;
use crate::backend::types::{
    disconnect_path, InvokeRequest, InvokeResponse, RegisterRequest, RegisterResponse,
    ToolCatalogResponse, HEARTBEAT_PATH, INVOKE_PATH, REGISTER_PATH, TOOLS_PATH,
};
use crate::mask::Secret;
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// One authenticated relationship with the backend.
///
/// Held only in memory. A session is either fully present or absent.
#[derive(Debug, Clone)]
pub struct Session {
    pub session_id: String,
    pub token: Secret,
    pub connection_id: String,
    pub profile_id: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl From<RegisterResponse> for Session {
    fn from(resp: RegisterResponse) -> Self {
        Self {
            session_id: resp.session_id,
            token: resp.session_token,
            connection_id: resp.connection_id,
            profile_id: resp.profile_id,
            expires_at: resp.expires_at,
        }
    }
}

/// Registration identity and timing knobs
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Preshared credential
    pub api_key: Secret,

    /// Human-readable name for this connection
    pub friendly_name: String,

    /// Identifier of the host tool (e.g. "claude-desktop")
    pub tool_tag: String,

    /// Heartbeat period (already clamped by the config layer)
    pub heartbeat_interval: Duration,

    /// Upper bound on the disconnect notification
    pub disconnect_timeout: Duration,
}

/// Result of one heartbeat
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatOutcome {
    /// Backend acknowledged the heartbeat
    Alive,

    /// 429: treated as a normal outcome
    RateLimited,

    /// 401: session will be refreshed by the next regular request
    SessionInvalid,

    /// No session to keep alive
    NoSession,
}

#[derive(Debug, Default)]
struct SessionState {
    session: Option<Session>,

    /// Incremented on every successful registration
    epoch: u64,
}

/// What a request saw when it was sent
#[derive(Debug, Clone, Copy)]
struct Observed {
    epoch: u64,
    reauth_attempts: u64,
}

struct Inner {
    transport: HttpTransport,
    settings: SessionSettings,
    catalog: CatalogCache,
    state: Mutex<SessionState>,
    reauth_gate: tokio::sync::Mutex<()>,
    reauth_attempts: AtomicU64,
    heartbeat: Mutex<Option<JoinHandle<()>>>,
}

/// Session manager handle (cheap to clone)
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl SessionManager {
    pub fn new(transport: HttpTransport, settings: SessionSettings, catalog: CatalogCache) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                settings,
                catalog,
                state: Mutex::new(SessionState::default()),
                reauth_gate: tokio::sync::Mutex::new(()),
                reauth_attempts: AtomicU64::new(0),
                heartbeat: Mutex::new(None),
            }),
        }
    }

    /// Current session, if any
    pub fn session(&self) -> Option<Session> {
        self.state().session.clone()
    }

    pub fn has_session(&self) -> bool {
        self.state().session.is_some()
    }

    pub fn catalog(&self) -> &CatalogCache {
        &self.inner.catalog
    }

    /// Whether the heartbeat task is scheduled
    pub fn is_heartbeat_running(&self) -> bool {
        self.heartbeat_slot()
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// Register with the backend and install the new session.
    ///
    /// # Errors
    ///
    /// The transport error is returned unchanged; the previous session (if
    /// any) is left untouched.
    pub async fn register(&self) -> BackendResult<()> {
        let _gate = self.inner.reauth_gate.lock().await;
        self.inner.reauth_attempts.fetch_add(1, Ordering::SeqCst);
        self.register_locked().await
    }

    /// Registration body; caller holds `reauth_gate`.
    async fn register_locked(&self) -> BackendResult<()> {
        let settings = &self.inner.settings;
        info!(
            friendly_name = %settings.friendly_name,
            client_tool = %settings.tool_tag,
            credential = %settings.api_key,
            "Registering with backend"
        );

        let body = serde_json::to_value(RegisterRequest {
            api_key: settings.api_key.expose(),
            friendly_name: &settings.friendly_name,
            client_tool: &settings.tool_tag,
        })
        .map_err(BackendError::Decode)?;

        let response: RegisterResponse = match self
            .inner
            .transport
            .request(Method::POST, REGISTER_PATH, Some(&body), None)
            .await
        {
            Ok(response) => response,
            Err(err) => {
                warn!(error = %err, credential = %settings.api_key, "Registration failed");
                return Err(err);
            }
        };

        let session = Session::from(response);
        info!(
            session_id = %session.session_id,
            connection_id = %session.connection_id,
            expires_at = %session.expires_at,
            "Session established"
        );

        {
            let mut state = self.state();
            state.session = Some(session);
            state.epoch += 1;
        }

        // A new session may see a different tool set
        self.inner.catalog.invalidate();
        self.restart_heartbeat();
        Ok(())
    }

    /// Send one heartbeat.
    ///
    /// `429` and `401` are normal outcomes here; a `401` is left for the next
    /// regular request to repair, so heartbeats never register.
    pub async fn heartbeat(&self) -> BackendResult<HeartbeatOutcome> {
        let Some(session) = self.session() else {
            return Ok(HeartbeatOutcome::NoSession);
        };

        let result = self
            .inner
            .transport
            .request::<Value>(Method::POST, HEARTBEAT_PATH, None, Some(&session.token))
            .await;

        match result {
            Ok(_) => Ok(HeartbeatOutcome::Alive),
            Err(err) if err.is_rate_limited() => {
                debug!("Heartbeat rate limited");
                Ok(HeartbeatOutcome::RateLimited)
            }
            Err(BackendError::Unauthorized { failure, .. }) => {
                info!(
                    cause = %failure,
                    "Heartbeat rejected; session will be refreshed on the next request"
                );
                Ok(HeartbeatOutcome::SessionInvalid)
            }
            Err(err) => Err(err),
        }
    }

    /// General request primitive.
    ///
    /// # Arguments
    ///
    /// * `method` - HTTP method
    /// * `path` - Endpoint path
    /// * `body` - Optional JSON body
    /// * `authenticated` - Attach the session token (registering first if there is no session)
    /// * `allow_retry_on_401` - Re-register once and retry once on `401`
    ///
    /// # Errors
    ///
    /// A second `401` after the retry is returned as is. A failed
    /// re-registration is wrapped in [`BackendError::Reauthentication`].
    pub async fn invoke<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        authenticated: bool,
        allow_retry_on_401: bool,
    ) -> BackendResult<T> {
        if authenticated && allow_retry_on_401 && !self.has_session() {
            debug!(path, "No active session, registering before request");
            self.reauthenticate(self.observe()).await?;
        }

        let (result, observed) = self
            .send(method.clone(), path, body.as_ref(), authenticated)
            .await;

        match result {
            Err(BackendError::Unauthorized { failure, .. })
                if authenticated && allow_retry_on_401 =>
            {
                warn!(cause = %failure, path, "{}", failure.describe());
                self.reauthenticate(observed).await?;
                let (retried, _) = self.send(method, path, body.as_ref(), authenticated).await;
                retried
            }
            other => other,
        }
    }

    /// Fetch the tool catalog through the cache
    pub async fn tool_catalog(&self) -> BackendResult<CatalogSnapshot> {
        self.inner
            .catalog
            .get_or_fetch(|| async {
                let response: ToolCatalogResponse =
                    self.invoke(Method::GET, TOOLS_PATH, None, true, true).await?;
                debug!(
                    tools = response.tools.len(),
                    api_version = response.api_version.as_deref().unwrap_or("unknown"),
                    "Fetched tool catalog"
                );
                Ok(response.tools)
            })
            .await
    }

    /// Invoke a tool on the backend
    pub async fn invoke_tool(&self, name: &str, arguments: &Value) -> BackendResult<InvokeResponse> {
        let body = serde_json::to_value(InvokeRequest {
            tool_name: name,
            arguments,
        })
        .map_err(BackendError::Decode)?;

        let response: InvokeResponse = self
            .invoke(Method::POST, INVOKE_PATH, Some(body), true, true)
            .await?;
        debug!(
            tool = name,
            request_id = response.request_id.as_deref().unwrap_or("-"),
            "Tool invocation completed"
        );
        Ok(response)
    }

    /// Best-effort disconnect notification, raced against the disconnect timeout.
    ///
    /// Returns `true` if the backend acknowledged in time. Failures and
    /// timeouts are logged and otherwise ignored.
    pub async fn disconnect(&self) -> bool {
        let Some(session) = self.session() else {
            debug!("No active session, skipping disconnect");
            return false;
        };

        let path = disconnect_path(&session.connection_id);
        let request =
            self.inner
                .transport
                .request::<Value>(Method::DELETE, &path, None, Some(&session.token));

        match tokio::time::timeout(self.inner.settings.disconnect_timeout, request).await {
            Ok(Ok(_)) => {
                info!(connection_id = %session.connection_id, "Disconnected from backend");
                true
            }
            Ok(Err(err)) => {
                debug!(error = %err, "Disconnect notification failed");
                false
            }
            Err(_) => {
                debug!(
                    timeout_ms = self.inner.settings.disconnect_timeout.as_millis() as u64,
                    "Disconnect notification timed out"
                );
                false
            }
        }
    }

    /// Stop the heartbeat, notify the backend, clear the session.
    pub async fn shutdown(&self) {
        self.stop_heartbeat();
        self.disconnect().await;
        self.state().session = None;
        debug!("Session state cleared");
    }

    /// Send once with whatever session is current.
    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        authenticated: bool,
    ) -> (BackendResult<T>, Observed) {
        let (token, observed) = {
            let state = self.state();
            let observed = Observed {
                epoch: state.epoch,
                reauth_attempts: self.inner.reauth_attempts.load(Ordering::SeqCst),
            };
            let token = if authenticated {
                state.session.as_ref().map(|s| s.token.clone())
            } else {
                None
            };
            (token, observed)
        };

        let result = self
            .inner
            .transport
            .request(method, path, body, token.as_ref())
            .await;
        (result, observed)
    }

    /// Single-flight re-registration (see module docs).
    async fn reauthenticate(&self, observed: Observed) -> BackendResult<()> {
        let _gate = self.inner.reauth_gate.lock().await;

        let current_epoch = self.state().epoch;
        if current_epoch != observed.epoch {
            debug!("Session already refreshed by a concurrent request");
            return Ok(());
        }
        if self.inner.reauth_attempts.load(Ordering::SeqCst) != observed.reauth_attempts {
            return Err(BackendError::ReauthenticationUnavailable);
        }

        self.inner.reauth_attempts.fetch_add(1, Ordering::SeqCst);
        self.register_locked()
            .await
            .map_err(|err| BackendError::Reauthentication(Box::new(err)))
    }

    fn observe(&self) -> Observed {
        let state = self.state();
        Observed {
            epoch: state.epoch,
            reauth_attempts: self.inner.reauth_attempts.load(Ordering::SeqCst),
        }
    }

    fn restart_heartbeat(&self) {
        let period = self.inner.settings.heartbeat_interval;
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                let manager = SessionManager { inner };
                match manager.heartbeat().await {
                    Ok(outcome) => debug!(?outcome, "Heartbeat"),
                    Err(err) => warn!(error = %err, "Heartbeat failed"),
                }
            }
        });

        if let Some(previous) = self.heartbeat_slot().replace(handle) {
            previous.abort();
        }
        debug!(interval_secs = period.as_secs(), "Heartbeat scheduled");
    }

    fn stop_heartbeat(&self) {
        if let Some(handle) = self.heartbeat_slot().take() {
            handle.abort();
            debug!("Heartbeat stopped");
        }
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn heartbeat_slot(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.inner
            .heartbeat
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
