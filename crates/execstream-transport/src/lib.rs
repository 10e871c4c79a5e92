//! Transport layer for the execution service.
//!
//! Provides:
//! - Wire protocol (JSON bodies, error body, SSE event name)
//! - HTTP routes with server-sent-events streaming (feature: http)

pub mod protocol;

#[cfg(feature = "http")]
pub mod http;

#[cfg(feature = "http")]
pub use http::{HttpError, HttpState, router, router_with_shutdown, status_code};
pub use protocol::{EXECUTION_EVENT, ErrorBody, ExecutionList};
