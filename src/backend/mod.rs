//! Backend client
//!
//! Everything that talks HTTPS to the relay backend.
//!
//! # Architecture
//!
//! 1. **Transport** (`http`): one request/response cycle with a bounded body
//! 2. **Catalog** (`catalog`): TTL cache with stale-on-failure fallback
//! 3. **Session** (`session`): registration, heartbeat, re-auth on `401`, disconnect
//!
//! `error` and `types` hold the shared error taxonomy and wire bodies.

pub mod catalog;
pub mod error;
pub mod http;
pub mod session;
pub mod types;

pub use catalog::{CatalogCache, CatalogSnapshot, CatalogSource};
pub use error::{AuthFailure, BackendError, BackendResult};
pub use http::HttpTransport;
pub use session::{HeartbeatOutcome, Session, SessionManager, SessionSettings};
pub use types::{InvokeResponse, ToolDescriptor, ToolMetadata};
