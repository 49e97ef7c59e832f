pub mod error;
pub mod health;
pub mod traces;

use crate::{openapi, AppState};
use axum::http::{HeaderValue, Method};
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

pub fn router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.cors_origins);
    let api = Router::new()
        .merge(traces::router(state.clone()))
        .merge(health::router(state))
        .merge(openapi::router());

    Router::new()
        .nest("/api", api)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods([Method::GET, Method::POST]);
    if origins.iter().any(|origin| origin == "*") {
        return layer.allow_origin(AllowOrigin::any());
    }
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::health::HealthResponse;
    use crate::routes::traces::{ClearResponse, PushResponse};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::json;
    use tower::ServiceExt;
    use tr_core::RelayConfig;
    use tr_events::{HubMessage, TraceEvent};

    fn test_state() -> AppState {
        AppState::new(RelayConfig {
            max_retained: 5,
            ..RelayConfig::default()
        })
    }

    fn push_request(body: &serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/trace")
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(body).unwrap()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn body_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn history(state: &AppState, uri: &str) -> Vec<TraceEvent> {
        body_json(router(state.clone()).oneshot(get(uri)).await.unwrap()).await
    }

    fn ids(traces: &[TraceEvent]) -> Vec<String> {
        traces.iter().map(|t| t.id.clone()).collect()
    }

    fn trace(id: &str, command: &str, status: &str) -> serde_json::Value {
        json!({
            "id": id,
            "timestamp": "2026-05-01T12:00:00Z",
            "command": command,
            "status": status,
            "pid": 42,
            "cwd": "/home"
        })
    }

    #[tokio::test]
    async fn push_accepts_and_broadcasts() {
        let state = test_state();
        let mut observer = state.relay.connect();
        let app = router(state.clone());

        let response = app.oneshot(push_request(&trace("t1", "ls -la", "started"))).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body: PushResponse = body_json(response).await;
        assert!(body.success);
        assert!(!body.duplicate);
        assert_eq!(*observer.recv().await.unwrap(), HubMessage::InitialTraces(Vec::new()));
        let next = observer.recv().await.unwrap();
        let HubMessage::NewTrace(record) = next.as_ref() else {
            panic!("expected new-trace, got {next:?}");
        };
        assert_eq!(record.command, "ls -la");
        assert!(record.received_at <= chrono::Utc::now());
    }

    #[tokio::test]
    async fn push_rejects_malformed_payload() {
        let state = test_state();
        let app = router(state.clone());

        let response = app
            .oneshot(push_request(&json!({ "status": "started", "pid": 1 })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = body_json(response).await;
        assert_eq!(body["code"], "invalid_input");
        assert!(state.relay.is_empty());
    }

    #[tokio::test]
    async fn push_reports_duplicates() {
        let state = test_state();
        let payload = trace("same", "make", "completed");
        router(state.clone()).oneshot(push_request(&payload)).await.unwrap();

        let response = router(state.clone()).oneshot(push_request(&payload)).await.unwrap();

        let body: PushResponse = body_json(response).await;
        assert!(body.duplicate);
        assert_eq!(state.relay.len(), 1);
    }

    #[tokio::test]
    async fn history_is_ordered_and_filterable() {
        let state = test_state();
        let pushes = [("a", "started"), ("b", "failed"), ("c", "started"), ("d", "completed")];
        for (id, status) in pushes {
            router(state.clone())
                .oneshot(push_request(&trace(id, "cmd", status)))
                .await
                .unwrap();
        }

        let all = history(&state, "/api/traces").await;
        let recent = history(&state, "/api/traces?limit=2").await;
        let started = history(&state, "/api/traces?status=started").await;

        assert_eq!(ids(&all), vec!["a", "b", "c", "d"]);
        assert_eq!(ids(&recent), vec!["c", "d"]);
        assert_eq!(ids(&started), vec!["a", "c"]);
    }

    #[tokio::test]
    async fn clear_empties_store_and_notifies() {
        let state = test_state();
        router(state.clone())
            .oneshot(push_request(&trace("x", "pwd", "started")))
            .await
            .unwrap();
        let mut observer = state.relay.connect();

        let response = router(state.clone()).oneshot(get("/api/traces/clear")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body: ClearResponse = body_json(response).await;
        assert!(body.success);
        assert_eq!(body.cleared, 1);
        let _initial = observer.recv().await.unwrap();
        assert_eq!(*observer.recv().await.unwrap(), HubMessage::TracesCleared);
        assert!(history(&state, "/api/traces").await.is_empty());
    }

    #[tokio::test]
    async fn health_reports_counts() {
        let state = test_state();
        let _observer = state.relay.connect();
        router(state.clone())
            .oneshot(push_request(&trace("h", "whoami", "started")))
            .await
            .unwrap();

        let response = router(state.clone()).oneshot(get("/api/health")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body: HealthResponse = body_json(response).await;
        assert_eq!(body.status, "healthy");
        assert_eq!(body.connected_clients, 1);
        assert_eq!(body.total_traces, 1);
    }

    #[tokio::test]
    async fn sse_starts_with_initial_traces() {
        let state = test_state();
        router(state.clone())
            .oneshot(push_request(&trace("s", "date", "started")))
            .await
            .unwrap();

        let response = router(state.clone()).oneshot(get("/api/traces/subscribe")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let mut body = response.into_body();
        let frame = body.frame().await.unwrap().unwrap();
        let text = String::from_utf8(frame.into_data().unwrap().to_vec()).unwrap();
        assert!(text.contains("event: initial-traces"));
        assert!(text.contains("\"id\":\"s\""));
        assert_eq!(state.relay.health().connected_clients, 1);
        drop(body);
        assert_eq!(state.relay.health().connected_clients, 0);
    }

    #[tokio::test]
    async fn openapi_document_is_served() {
        let response = router(test_state()).oneshot(get("/api/openapi.json")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: serde_json::Value = body_json(response).await;
        assert!(body["paths"]["/api/trace"].is_object());
    }
}
