//! API route definitions.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use log::warn;
use serde::Deserialize;
use serde_json::{json, Value};

use super::state::AppState;
use crate::error::FailTrackError;
use crate::models::{BuildId, TestCaseResult, TestHistoryRecord};

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/builds/{build_id}/collect", post(collect_build))
        .route("/collect", post(collect_payload))
        .route("/scan", post(scan))
        .route("/tests/{test_name}", get(test_history))
}

struct ApiError(FailTrackError);

impl From<FailTrackError> for ApiError {
    fn from(error: FailTrackError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.0.is_client_error() {
            return (StatusCode::BAD_REQUEST, self.0.to_string()).into_response();
        }

        let status = match self.0 {
            FailTrackError::NoScanHistory => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

fn parse_build_id(raw: &str) -> Result<BuildId, FailTrackError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(FailTrackError::MissingBuildId);
    }

    raw.parse()
        .map_err(|_| FailTrackError::InvalidBuildId(raw.to_string()))
}

/// `buildId` arrives as a number from the fan-out and as a string from hand-written calls.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawBuildId {
    Number(BuildId),
    Text(String),
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CollectPayload {
    build_id: Option<RawBuildId>,
}

pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn collect_build(
    State(state): State<AppState>,
    Path(build_id): Path<String>,
) -> Result<Json<Vec<TestCaseResult>>, ApiError> {
    let build_id = parse_build_id(&build_id)?;
    let report = state.collector.collect(build_id).await?;

    Ok(Json(report.results))
}

async fn collect_payload(State(state): State<AppState>, body: Bytes) -> Result<StatusCode, ApiError> {
    let payload: CollectPayload = if body.is_empty() {
        CollectPayload::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| {
            warn!("Rejected collect payload: {e}");
            FailTrackError::MissingBuildId
        })?
    };

    let build_id = match payload.build_id {
        None => return Err(FailTrackError::MissingBuildId.into()),
        Some(RawBuildId::Number(id)) => id,
        Some(RawBuildId::Text(text)) => parse_build_id(&text)?,
    };

    state.collector.collect(build_id).await?;
    Ok(StatusCode::OK)
}

async fn scan(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let dispatched = state.trigger.run().await?;

    Ok(Json(json!({ "dispatched": dispatched })))
}

async fn test_history(
    State(state): State<AppState>,
    Path(test_name): Path<String>,
) -> Result<Response, ApiError> {
    let record: Option<TestHistoryRecord> = state.store.history(&test_name).await?;

    Ok(match record {
        Some(record) => Json(record).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("no history for {test_name}") })),
        )
            .into_response(),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;
    use crate::api::router;
    use crate::collect::Collector;
    use crate::config::ScanSettings;
    use crate::dispatch::LocalDispatcher;
    use crate::models::{ScanLogRecord, ScanStatus};
    use crate::providers::jenkins::JenkinsClient;
    use crate::scan::ScanTrigger;
    use crate::store::{MemoryStore, Store};

    fn app(ci_url: &str) -> (Arc<MemoryStore>, Router) {
        let ci = Arc::new(JenkinsClient::new(ci_url, None).unwrap());
        let store = Arc::new(MemoryStore::new());
        let collector = Arc::new(Collector::new(ci.clone(), store.clone()));
        let dispatcher = Arc::new(LocalDispatcher::new(collector.clone()));
        let trigger = Arc::new(ScanTrigger::new(
            ci,
            store.clone(),
            dispatcher,
            ScanSettings::default(),
        ));

        let state = AppState {
            collector,
            trigger,
            store: store.clone(),
        };
        (store, router(state))
    }

    fn post(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_string(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    async fn mock_build_50(server: &mut mockito::ServerGuard) -> Vec<mockito::Mock> {
        let info = server
            .mock("GET", "/50/api/json")
            .with_status(200)
            .with_body(r#"{"id": "50", "timestamp": 1700000000000, "result": "UNSTABLE"}"#)
            .create_async()
            .await;
        let report = server
            .mock("GET", "/50/testReport/api/json")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(
                r#"{"suites": [{"cases": [
                    {"className": "Foo", "name": "bar", "status": "FAILED", "duration": 0.2, "skipped": false}
                ]}]}"#,
            )
            .create_async()
            .await;
        vec![info, report]
    }

    #[test]
    fn test_parse_build_id() {
        assert_eq!(parse_build_id(" 42 ").unwrap(), 42);
        assert!(matches!(parse_build_id(""), Err(FailTrackError::MissingBuildId)));
        assert!(matches!(
            parse_build_id("abc"),
            Err(FailTrackError::InvalidBuildId(_))
        ));
    }

    #[tokio::test]
    async fn test_collect_build_returns_results() {
        let mut server = mockito::Server::new_async().await;
        let _mocks = mock_build_50(&mut server).await;
        let (store, app) = app(&server.url());

        let response = app.oneshot(post("/api/v1/builds/50/collect", "")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(body[0]["suiteClassName"], "Foo");
        assert_eq!(body[0]["status"], "FAILED");
        assert_eq!(body[0]["buildId"], 50);
        let record = store.history("Foo.bar").await.unwrap().unwrap();
        assert_eq!(record.failed_in.len(), 1);
    }

    #[tokio::test]
    async fn test_collect_build_rejects_invalid_id() {
        let (_, app) = app("http://127.0.0.1:9");

        let response = app
            .oneshot(post("/api/v1/builds/latest/collect", ""))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_string(response).await.contains("latest"));
    }

    #[tokio::test]
    async fn test_collect_payload_without_build_id_is_bad_request() {
        let (_, app) = app("http://127.0.0.1:9");

        let response = app.oneshot(post("/api/v1/collect", "{}")).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_string(response).await, "You have to provide a build id");
    }

    #[tokio::test]
    async fn test_collect_payload_returns_empty_body() {
        let mut server = mockito::Server::new_async().await;
        let _mocks = mock_build_50(&mut server).await;
        let (store, app) = app(&server.url());

        let response = app
            .oneshot(post("/api/v1/collect", r#"{"buildId": "50"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_string(response).await.is_empty());
        let entry = store.scan_entry(50).await.unwrap().unwrap();
        assert_eq!(entry.status, ScanStatus::Completed);
    }

    #[tokio::test]
    async fn test_upstream_failure_is_json_500() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/7/api/json")
            .with_status(503)
            .create_async()
            .await;
        let (_, app) = app(&server.url());

        let response = app.oneshot(post("/api/v1/builds/7/collect", "")).await.unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert!(body["error"].as_str().unwrap().contains("503"));
    }

    #[tokio::test]
    async fn test_scan_without_history_is_conflict() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/json")
            .with_status(200)
            .with_body(r#"{"lastCompletedBuild": {"number": 2}, "builds": [{"number": 2}]}"#)
            .create_async()
            .await;
        let (_, app) = app(&server.url());

        let response = app.oneshot(post("/api/v1/scan", "")).await.unwrap();

        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_scan_reports_dispatched_builds() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/json")
            .with_status(200)
            .with_body(
                r#"{"lastCompletedBuild": {"number": 50}, "builds": [{"number": 50}, {"number": 49}]}"#,
            )
            .create_async()
            .await;
        let _mocks = mock_build_50(&mut server).await;
        let (store, app) = app(&server.url());
        store
            .record_scan(&ScanLogRecord {
                build_id: 49,
                status: ScanStatus::Completed,
                started_at: chrono::Utc::now(),
            })
            .await
            .unwrap();

        let response = app.oneshot(post("/api/v1/scan", "")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(body["dispatched"], json!([50]));
    }

    #[tokio::test]
    async fn test_history_lookup() {
        let (_, app) = app("http://127.0.0.1:9");

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/tests/Foo.missing")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_health_and_fallback() {
        let (_, app) = app("http://127.0.0.1:9");

        let health = app
            .clone()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let missing = app
            .oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(health.status(), StatusCode::OK);
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }
}
