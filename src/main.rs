// mcp-relay - Main Entry Point
//
// Local stdio MCP server relaying to a remote backend:
// - CLI interface
// - Session registration and keep-alive
// - Tool catalog and invocation forwarding
//
// stdout belongs to the protocol while serving; logs go to stderr.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mcp_relay::config::Config;
use mcp_relay::mcp::FrameError;
use mcp_relay::{logging, relay_command};
use std::path::PathBuf;
use tracing::{error, info, warn};

/// Exit code for a fatal stdio buffer overflow
const EXIT_BUFFER_OVERFLOW: i32 = 2;

/// mcp-relay: stdio MCP server backed by a remote tool gateway
#[derive(Parser, Debug)]
#[command(name = "mcp-relay")]
#[command(version)]
#[command(about = "Relay MCP tool traffic from a local host to a remote backend", long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the backend URL
    #[arg(long, global = true)]
    server_url: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Command to run (defaults to serve)
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Commands {
    /// Serve MCP over stdio (default)
    Serve,
    /// Register, print the backend tool catalog, and exit
    ListTools,
    /// Validate the configuration and print the effective values
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };
    if let Some(url) = args.server_url {
        config.backend.server_url = url;
    }
    config.validate().context("Invalid configuration")?;

    logging::init(&config.logging, args.verbose)?;
    info!("mcp-relay v{} starting", env!("CARGO_PKG_VERSION"));

    match args.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(&config).await,
        Commands::ListTools => {
            let mut stdout = std::io::stdout();
            let count = relay_command::list_tools(&config, &mut stdout).await?;
            info!(tools = count, "Listed backend tools");
            Ok(())
        }
        Commands::CheckConfig => {
            let mut stdout = std::io::stdout();
            relay_command::describe_config(&config, &mut stdout)?;
            println!("Configuration OK");
            Ok(())
        }
    }
}

async fn serve(config: &Config) -> Result<()> {
    let shutdown = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "Cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    let result =
        relay_command::run_relay(config, tokio::io::stdin(), tokio::io::stdout(), shutdown).await;

    match result {
        Ok(_) => {
            // The blocking stdin reader may still be parked after Ctrl-C
            std::process::exit(0);
        }
        Err(err) if err.downcast_ref::<FrameError>().is_some() => {
            error!(error = %err, "Fatal: stdio input exceeded the buffer ceiling, exiting");
            std::process::exit(EXIT_BUFFER_OVERFLOW);
        }
        Err(err) => Err(err),
    }
}
