//! Logging setup
//!
//! All diagnostics go to stderr. stdout carries protocol frames only while
//! serving, so nothing here may ever write to it.

use crate::config::LoggingConfig;
use anyhow::Result;
use std::io::IsTerminal;
use std::str::FromStr;
use tracing::{Level, Subscriber};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

/// Output format of the log sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => anyhow::bail!("Invalid log format: {}", other),
        }
    }
}

/// Filter with `level` as default directive; `RUST_LOG` refines it.
pub fn env_filter(level: Level) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy()
}

/// Build a subscriber writing to `writer`.
pub fn subscriber<W>(
    level: Level,
    format: LogFormat,
    ansi: bool,
    writer: W,
) -> Box<dyn Subscriber + Send + Sync>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter(level))
        .with_writer(writer)
        .with_ansi(ansi);

    match format {
        LogFormat::Compact => Box::new(builder.compact().finish()),
        LogFormat::Pretty => Box::new(builder.pretty().finish()),
        LogFormat::Json => Box::new(builder.json().finish()),
    }
}

/// Install the global stderr subscriber.
///
/// `verbose` forces `debug` regardless of the configured level.
///
/// # Errors
///
/// Returns an error for an unknown level or format, or if a global
/// subscriber is already installed.
pub fn init(config: &LoggingConfig, verbose: bool) -> Result<()> {
    let level = if verbose {
        Level::DEBUG
    } else {
        config
            .level
            .to_lowercase()
            .parse()
            .map_err(|e| anyhow::anyhow!("Failed to parse log level: {}", e))?
    };
    let format: LogFormat = config.format.parse()?;
    let ansi = format != LogFormat::Json && std::io::stderr().is_terminal();

    tracing::subscriber::set_global_default(subscriber(level, format, ansi, std::io::stderr))
        .map_err(|e| anyhow::anyhow!("Failed to install log subscriber: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mask::Secret;
    use std::io::Write;
    use std::sync::{Arc, Mutex};
    use tracing::{debug, info};

    // Helper: in-memory writer shared with the subscriber
    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl Capture {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).to_string()
        }
    }

    impl Write for Capture {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Capture {
        type Writer = Capture;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[test]
    fn test_log_format_parsing() {
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("Pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert_eq!("compact".parse::<LogFormat>().unwrap(), LogFormat::Compact);
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_json_output_is_parseable() {
        let capture = Capture::default();
        let subscriber = subscriber(Level::INFO, LogFormat::Json, false, capture.clone());

        tracing::subscriber::with_default(subscriber, || {
            info!(tool = "echo", "Tool invocation completed");
        });

        let output = capture.contents();
        let line = output.lines().next().expect("one log line");
        let value: serde_json::Value = serde_json::from_str(line).unwrap();
        assert_eq!(value["fields"]["tool"], "echo");
        assert_eq!(value["level"], "INFO");
    }

    #[test]
    fn test_level_filtering() {
        let capture = Capture::default();
        let subscriber = subscriber(Level::INFO, LogFormat::Compact, false, capture.clone());

        tracing::subscriber::with_default(subscriber, || {
            debug!("hidden detail");
            info!("visible line");
        });

        let output = capture.contents();
        assert!(output.contains("visible line"));
        assert!(!output.contains("hidden detail"));
    }

    #[test]
    fn test_secret_fields_are_masked() {
        let capture = Capture::default();
        let subscriber = subscriber(Level::INFO, LogFormat::Compact, false, capture.clone());
        let key = Secret::new("plx_logging_test_secret_99");

        tracing::subscriber::with_default(subscriber, || {
            info!(credential = %key, "Registering");
            info!(credential = ?key, "Registering (debug)");
        });

        let output = capture.contents();
        assert!(output.contains("plx_****"));
        assert!(!output.contains("plx_logging_test_secret_99"));
    }
}
