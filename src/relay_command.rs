// Relay commands
//
// Process-level operations behind the CLI: serving a host over stdio,
// listing the backend catalog once, and describing the effective config.

use crate::backend::{CatalogCache, HttpTransport, SessionManager, SessionSettings};
use crate::config::Config;
use crate::mcp::frame::FrameLimits;
use crate::mcp::transport::{self, ServeSummary, TransportError};
use crate::mcp::Dispatcher;
use anyhow::{Context, Result};
use std::future::Future;
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::info;

/// Build the session manager described by `config`.
pub fn build_session(config: &Config) -> Result<SessionManager> {
    let transport =
        HttpTransport::new(&config.backend).context("Failed to set up the backend client")?;

    let settings = SessionSettings {
        api_key: config.backend.api_key.clone(),
        friendly_name: config.session.friendly_name.clone(),
        tool_tag: config.session.tool_tag.clone(),
        heartbeat_interval: config.heartbeat_interval(),
        disconnect_timeout: config.disconnect_timeout(),
    };
    let catalog = CatalogCache::new(config.cache_ttl(), config.cache.disabled);

    Ok(SessionManager::new(transport, settings, catalog))
}

/// Register, then serve host messages until end of input or `shutdown`.
///
/// Shutdown order: stop reading, drain in-flight requests, stop the
/// heartbeat, send the disconnect notification, clear the session.
///
/// # Errors
///
/// Fails if the initial registration fails. A stdio buffer overflow is
/// returned as [`crate::mcp::FrameError`] without any graceful shutdown; the
/// caller is expected to exit immediately.
pub async fn run_relay<R, W, S>(
    config: &Config,
    reader: R,
    writer: W,
    shutdown: S,
) -> Result<ServeSummary>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
    S: Future<Output = ()>,
{
    let session = build_session(config)?;
    session.register().await.with_context(|| {
        format!(
            "Initial registration with {} failed (credential {})",
            config.backend.server_url, config.backend.api_key
        )
    })?;

    info!(
        server = %config.backend.server_url,
        friendly_name = %config.session.friendly_name,
        "Relay ready, serving stdio"
    );

    let dispatcher = Dispatcher::new(Arc::new(session.clone()));
    let limits = FrameLimits::from(&config.limits);
    let outcome = transport::serve(reader, writer, dispatcher, limits, shutdown).await;

    let summary = match outcome {
        Err(TransportError::Frame(overflow)) => return Err(overflow.into()),
        other => {
            session.shutdown().await;
            other?
        }
    };

    info!("Relay stopped");
    Ok(summary)
}

/// Register, fetch the catalog once, print it, disconnect.
///
/// Returns the number of tools printed.
pub async fn list_tools<O: Write>(config: &Config, out: &mut O) -> Result<usize> {
    let session = build_session(config)?;
    session
        .register()
        .await
        .context("Registration with the backend failed")?;

    let catalog = session.tool_catalog().await;
    session.shutdown().await;
    let catalog = catalog.context("Failed to fetch the tool catalog")?;

    for tool in catalog.tools.iter() {
        writeln!(out, "{}\t{}", tool.name, tool.description)?;
    }
    Ok(catalog.tools.len())
}

/// Print the effective configuration with the credential masked.
pub fn describe_config<O: Write>(config: &Config, out: &mut O) -> Result<()> {
    writeln!(out, "server_url          = {}", config.backend.server_url)?;
    writeln!(out, "api_key             = {}", config.backend.api_key)?;
    writeln!(out, "allow_self_signed   = {}", config.backend.allow_self_signed)?;
    writeln!(out, "request_timeout     = {}s", config.backend.request_timeout_secs)?;
    writeln!(out, "friendly_name       = {}", config.session.friendly_name)?;
    writeln!(out, "tool_tag            = {}", config.session.tool_tag)?;
    writeln!(
        out,
        "heartbeat_interval  = {}s",
        config.heartbeat_interval().as_secs()
    )?;
    writeln!(out, "disconnect_timeout  = {}ms", config.session.disconnect_timeout_ms)?;
    writeln!(
        out,
        "cache               = {}",
        if config.cache.disabled {
            "disabled".to_string()
        } else {
            format!("ttl {}s", config.cache.ttl_seconds)
        }
    )?;
    writeln!(
        out,
        "limits              = buffer {} bytes, message {} bytes",
        config.limits.max_buffer_bytes, config.limits.max_message_bytes
    )?;
    writeln!(
        out,
        "logging             = {} ({})",
        config.logging.level, config.logging.format
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mask::Secret;
    use crate::mcp::FrameError;
    use serde_json::{json, Value};
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const KEY: &str = "plx_relay_command_key_7";

    fn config_for(server: &MockServer) -> Config {
        let mut config = Config::default();
        config.backend.server_url = server.uri();
        config.backend.api_key = Secret::new(KEY);
        config
    }

    async fn mount_session(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/v1/sessions/register"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "session_id": "sess-1",
                "session_token": "tok_relay_000001",
                "expires_at": "2030-01-01T00:00:00Z",
                "connection_id": "conn-1"
            })))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/tools"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "tools": [
                    {"name": "echo", "description": "Echo input"},
                    {"name": "search", "description": "Search"}
                ]
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_run_relay_serves_and_disconnects() {
        let server = MockServer::start().await;
        mount_session(&server).await;
        Mock::given(method("DELETE"))
            .and(path("/v1/sessions/connections/conn-1"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let (mut host_in, relay_in) = tokio::io::duplex(64 * 1024);
        let (relay_out, host_out) = tokio::io::duplex(64 * 1024);
        host_in
            .write_all(b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"tools/list\"}\n")
            .await
            .unwrap();
        drop(host_in);

        let summary = run_relay(&config_for(&server), relay_in, relay_out, std::future::pending())
            .await
            .unwrap();
        assert_eq!(summary.messages, 1);

        let mut lines = BufReader::new(host_out).lines();
        let frame: Value = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(frame["result"]["tools"][1]["name"], "search");
    }

    #[tokio::test]
    async fn test_run_relay_fails_when_registration_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/sessions/register"))
            .respond_with(ResponseTemplate::new(401).set_body_json(
                json!({"error": {"code": "invalid_api_key", "message": "bad key"}}),
            ))
            .mount(&server)
            .await;

        let (_host_in, relay_in) = tokio::io::duplex(1024);
        let (relay_out, _host_out) = tokio::io::duplex(1024);

        let err = run_relay(&config_for(&server), relay_in, relay_out, std::future::pending())
            .await
            .unwrap_err();
        let rendered = format!("{:#}", err);
        assert!(rendered.contains("Initial registration"));
        assert!(!rendered.contains(KEY));
    }

    #[tokio::test]
    async fn test_run_relay_buffer_overflow_skips_disconnect() {
        let server = MockServer::start().await;
        mount_session(&server).await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(204))
            .expect(0)
            .mount(&server)
            .await;

        let mut config = config_for(&server);
        config.limits.max_buffer_bytes = 64;
        config.limits.max_message_bytes = 32;

        let (mut host_in, relay_in) = tokio::io::duplex(4096);
        let (relay_out, _host_out) = tokio::io::duplex(4096);
        host_in.write_all(&[b'x'; 256]).await.unwrap();

        let err = run_relay(&config, relay_in, relay_out, std::future::pending())
            .await
            .unwrap_err();
        assert!(err.downcast_ref::<FrameError>().is_some());
    }

    #[tokio::test]
    async fn test_list_tools_prints_catalog() {
        let server = MockServer::start().await;
        mount_session(&server).await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let mut out = Vec::new();
        let count = list_tools(&config_for(&server), &mut out).await.unwrap();

        assert_eq!(count, 2);
        let printed = String::from_utf8(out).unwrap();
        assert!(printed.contains("echo\tEcho input"));
        assert!(printed.contains("search\tSearch"));
    }

    #[test]
    fn test_describe_config_masks_credential() {
        let mut config = Config::default();
        config.backend.api_key = Secret::new(KEY);
        config.session.heartbeat_interval_seconds = 1;

        let mut out = Vec::new();
        describe_config(&config, &mut out).unwrap();
        let printed = String::from_utf8(out).unwrap();

        assert!(printed.contains("plx_****"));
        assert!(!printed.contains(KEY));
        assert!(printed.contains("heartbeat_interval  = 5s"));
    }
}
