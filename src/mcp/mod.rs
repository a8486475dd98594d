//! MCP (Model Context Protocol) server side
//!
//! The relay speaks MCP to exactly one host over stdio and forwards tool
//! traffic to the backend.
//!
//! # Architecture
//!
//! 1. **Protocol Layer** (`protocol`): JSON-RPC 2.0 message types
//! 2. **Framing** (`frame`): newline-delimited input with size ceilings
//! 3. **Dispatch** (`dispatcher`): method routing and error mapping
//! 4. **Transport** (`transport`): the stdio serve loop

pub mod dispatcher;
pub mod frame;
pub mod protocol;
pub mod transport;

pub use dispatcher::{Dispatcher, ToolBackend};
pub use frame::{FrameError, FrameLimits, FrameReader};
pub use protocol::{HostRequest, IncomingMessage, McpError, McpResponse, RequestId, Tool};
pub use transport::{serve, ServeSummary, TransportError};

// Property-based tests module
#[cfg(test)]
mod proptests;
