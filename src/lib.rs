//! mcp-relay library
//!
//! A local stdio MCP server that relays tool discovery and invocation to a
//! remote HTTPS backend, keeping one authenticated session alive on the way.
//!
//! - [`mcp`]: host side (framing, JSON-RPC dispatch, serve loop)
//! - [`backend`]: backend side (HTTP transport, session, catalog cache)
//! - [`relay_command`]: process-level operations used by the binary

pub mod backend;
pub mod config;
pub mod logging;
pub mod mask;
pub mod mcp;
pub mod relay_command;
