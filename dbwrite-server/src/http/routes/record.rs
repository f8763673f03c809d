//! Write endpoint and favicon stub

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Router};

use crate::db::RecordStore;
use crate::http::error::ApiError;
use crate::http::extractors::CorrelationId;
use crate::http::server::AppState;

/// GET|POST / - run one write transaction
///
/// The response is held until the transaction commits or rolls back.
async fn record<S: RecordStore>(
    State(state): State<Arc<AppState<S>>>,
    correlation: CorrelationId,
) -> Result<&'static str, ApiError> {
    state.executor.record(correlation.as_str()).await?;
    Ok("Success")
}

/// GET /favicon.ico - no-op
async fn favicon() -> StatusCode {
    StatusCode::OK
}

/// Record routes
pub fn router<S: RecordStore>() -> Router<Arc<AppState<S>>> {
    Router::new()
        .route("/", get(record::<S>).post(record::<S>))
        .route("/favicon.ico", get(favicon))
}
