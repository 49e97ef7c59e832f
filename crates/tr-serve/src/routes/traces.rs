use crate::routes::error::map_error;
use crate::AppState;
use axum::body::Bytes;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tr_core::validation::parse_trace_payload;
use tr_core::{Ingested, RelayError};
use tr_events::{TraceEvent, TraceSource, TraceStatus};
use tracing::{info, warn};
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Default, Deserialize, ToSchema, IntoParams)]
pub struct TracesQuery {
    /// Return only the most recent `limit` traces.
    limit: Option<usize>,
    status: Option<TraceStatus>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PushResponse {
    pub success: bool,
    pub duplicate: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ClearResponse {
    pub success: bool,
    pub message: String,
    pub cleared: usize,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/trace", post(push_trace))
        .route("/traces", get(list_traces))
        .route("/traces/clear", get(clear_traces).post(clear_traces))
        .route("/traces/stream", get(stream))
        .route("/traces/subscribe", get(subscribe))
        .with_state(state)
}

#[utoipa::path(
    post,
    path = "/api/trace",
    request_body = tr_events::TraceInput,
    responses(
        (status = 200, body = PushResponse),
        (status = 400, body = crate::routes::error::ErrorEnvelope)
    )
)]
pub(crate) async fn push_trace(State(state): State<AppState>, body: Bytes) -> Response {
    let input = match parse_trace_payload(&body) {
        Ok(input) => input,
        Err(err) => {
            warn!(error = %err, "rejected pushed trace");
            return map_error(&RelayError::from(err)).into_response();
        }
    };
    let ingested = state.relay.ingest(input, TraceSource::Api);
    if let Ingested::Accepted(record) = &ingested {
        info!(command = %record.command, status = record.status.as_str(), "trace received");
    }
    Json(PushResponse {
        success: true,
        duplicate: ingested.is_duplicate(),
    })
    .into_response()
}

#[utoipa::path(
    get,
    path = "/api/traces",
    params(TracesQuery),
    responses((status = 200, body = Vec<TraceEvent>))
)]
pub(crate) async fn list_traces(
    State(state): State<AppState>,
    Query(query): Query<TracesQuery>,
) -> Json<Vec<TraceEvent>> {
    let mut traces = state.relay.snapshot();
    if let Some(status) = query.status {
        traces.retain(|trace| trace.status == status);
    }
    if let Some(limit) = query.limit {
        let skip = traces.len().saturating_sub(limit);
        traces = traces.split_off(skip);
    }
    Json(traces)
}

#[utoipa::path(
    get,
    path = "/api/traces/clear",
    responses((status = 200, body = ClearResponse))
)]
pub(crate) async fn clear_traces(State(state): State<AppState>) -> Json<ClearResponse> {
    let cleared = state.relay.clear();
    Json(ClearResponse {
        success: true,
        message: "Traces cleared".to_string(),
        cleared,
    })
}

#[utoipa::path(
    get,
    path = "/api/traces/stream",
    responses((status = 101, description = "websocket upgrade"))
)]
pub(crate) async fn stream(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| crate::ws::handle_socket(socket, state))
}

#[utoipa::path(
    get,
    path = "/api/traces/subscribe",
    responses((status = 200, description = "server-sent event stream"))
)]
pub(crate) async fn subscribe(State(state): State<AppState>) -> Response {
    crate::sse::subscribe(&state)
}
