//! Router tests: request in, transaction out, status back

mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use common::{Fault, MemoryStore};
use dbwrite_server::db::Phase;
use dbwrite_server::http::{build_router, AppState};
use dbwrite_server::WriteExecutor;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tower::ServiceExt;

fn app(store: &MemoryStore, project_id: Option<&str>) -> Router {
    let executor = WriteExecutor::new(store.clone(), Duration::from_millis(10));
    build_router(Arc::new(AppState::new(
        executor,
        project_id.map(str::to_string),
    )))
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn trace_header_becomes_correlation_id() {
    let store = MemoryStore::new(1);
    let response = app(&store, Some("proj"))
        .oneshot(
            Request::builder()
                .uri("/")
                .header("X-Cloud-Trace-Context", "abc123/456;o=1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "Success");

    let rows = store.rows_for("projects/proj/traces/abc123");
    let phases: Vec<Phase> = rows.iter().map(|r| r.phase).collect();
    assert_eq!(phases, vec![Phase::Begin, Phase::End]);
}

#[tokio::test]
async fn without_project_rows_have_empty_trace() {
    let store = MemoryStore::new(1);
    let response = app(&store, None)
        .oneshot(
            Request::builder()
                .uri("/")
                .header("X-Cloud-Trace-Context", "abc123/456;o=1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(store.rows_for("").len(), 2);
}

#[tokio::test]
async fn post_also_writes() {
    let store = MemoryStore::new(1);
    let response = app(&store, Some("proj"))
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    // No header: empty correlation, request still succeeds
    assert_eq!(store.rows_for("").len(), 2);
}

#[tokio::test]
async fn failed_write_is_500_with_description() {
    let store = MemoryStore::failing(1, Fault::Insert(Phase::End));
    let response = app(&store, Some("proj"))
        .oneshot(
            Request::builder()
                .uri("/")
                .header("X-Cloud-Trace-Context", "abc123/456;o=1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let text = body_text(response).await;
    assert!(text.starts_with("Failed to insert records to DB: failed to insert END record"));
    assert!(text.contains("unique constraint"));
    assert!(!text.contains("Success"));
    assert!(store.committed().is_empty());
}

#[tokio::test]
async fn favicon_is_empty_and_writes_nothing() {
    let store = MemoryStore::new(1);
    let response = app(&store, Some("proj"))
        .oneshot(
            Request::builder()
                .uri("/favicon.ico")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.is_empty());
    assert!(store.committed().is_empty());
}

#[tokio::test]
async fn health_reports_settings() {
    let store = MemoryStore::new(1);
    let response = app(&store, Some("proj"))
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["write_delay_ms"], 10);
    assert_eq!(body["correlation"], true);
}

#[tokio::test]
async fn concurrent_requests_are_isolated() {
    let store = MemoryStore::new(3);
    let app = app(&store, Some("proj"));

    let requests = (0..6).map(|i| {
        let app = app.clone();
        async move {
            app.oneshot(
                Request::builder()
                    .uri("/")
                    .header("X-Cloud-Trace-Context", format!("trace{i}/1;o=1"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap()
            .status()
        }
    });

    let statuses = spawn_all(requests).await;
    assert!(statuses.iter().all(|s| *s == StatusCode::OK));

    assert_eq!(store.committed().len(), 12);
    for i in 0..6 {
        let rows = store.rows_for(&format!("projects/proj/traces/trace{i}"));
        assert_eq!(rows.len(), 2, "trace{i}");
    }
}

#[tokio::test]
async fn client_disconnect_rolls_back() {
    let store = MemoryStore::new(1);
    let executor = WriteExecutor::new(store.clone(), Duration::from_millis(800));
    let router = build_router(Arc::new(AppState::new(executor, Some("proj".to_string()))));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move { axum::serve(listener, router).await });

    let mut client = TcpStream::connect(addr).await.unwrap();
    client
        .write_all(
            b"GET / HTTP/1.1\r\nHost: localhost\r\nX-Cloud-Trace-Context: gone/1;o=1\r\n\r\n",
        )
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(store.open_transactions(), 1);

    drop(client);

    let deadline = tokio::time::Instant::now() + Duration::from_millis(500);
    while store.open_transactions() > 0 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(store.open_transactions(), 0);
    assert_eq!(store.rollbacks(), 1);

    // Past the point where the END row would have been written
    tokio::time::sleep(Duration::from_millis(900)).await;
    assert!(store.committed().is_empty());
    assert!(store.rows_for("projects/proj/traces/gone").is_empty());

    server.abort();
}

async fn spawn_all<F>(futures: impl IntoIterator<Item = F>) -> Vec<F::Output>
where
    F: std::future::Future + Send + 'static,
    F::Output: Send + 'static,
{
    let handles: Vec<_> = futures.into_iter().map(tokio::spawn).collect();
    let mut out = Vec::with_capacity(handles.len());
    for handle in handles {
        out.push(handle.await.unwrap());
    }
    out
}
