//! Custom Axum extractors

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use super::server::AppState;
use crate::db::RecordStore;

/// Trace propagation header, `<trace-id>/<span-id>;o=<options>`
pub const TRACE_HEADER: &str = "x-cloud-trace-context";

/// Correlation id for the rows written by one request. Empty when no
/// project is configured or the header carries no trace id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelationId(pub String);

impl CorrelationId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Build `projects/{project}/traces/{trace}` from the header value.
pub fn correlation_id(project_id: Option<&str>, header: Option<&str>) -> String {
    let Some(project) = project_id.filter(|p| !p.is_empty()) else {
        return String::new();
    };

    match header.unwrap_or_default().split('/').next() {
        Some(trace) if !trace.is_empty() => format!("projects/{project}/traces/{trace}"),
        _ => String::new(),
    }
}

impl<S> FromRequestParts<Arc<AppState<S>>> for CorrelationId
where
    S: RecordStore,
{
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState<S>>,
    ) -> Result<Self, Self::Rejection> {
        // Non-UTF-8 header values degrade to "no trace"
        let header = parts
            .headers
            .get(TRACE_HEADER)
            .and_then(|value| value.to_str().ok());

        Ok(Self(correlation_id(state.project_id.as_deref(), header)))
    }
}
