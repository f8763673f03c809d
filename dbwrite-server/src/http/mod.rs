//! HTTP server layer
//!
//! Axum server with:
//! - Correlation id extraction from the trace header
//! - Request tracing
//! - Graceful shutdown
//! - Plain-text error responses

pub mod error;
pub mod extractors;
pub mod routes;
pub mod server;

pub use error::ApiError;
pub use extractors::{correlation_id, CorrelationId, TRACE_HEADER};
pub use server::{build_router, run_server, AppState, ServerConfig, ServerError, DEFAULT_PORT};
