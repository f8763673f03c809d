//! Health check endpoint

use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::db::RecordStore;
use crate::executor::saturating_millis;
use crate::http::server::AppState;

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub write_delay_ms: u64,
    pub correlation: bool,
}

/// GET /health
async fn health<S: RecordStore>(State(state): State<Arc<AppState<S>>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        write_delay_ms: saturating_millis(state.executor.delay()),
        correlation: state.project_id.is_some(),
    })
}

/// Health routes
pub fn router<S: RecordStore>() -> Router<Arc<AppState<S>>> {
    Router::new().route("/health", get(health::<S>))
}
