use crate::AppState;
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub connected_clients: usize,
    pub total_traces: usize,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .with_state(state)
}

#[utoipa::path(
    get,
    path = "/api/health",
    responses((status = 200, body = HealthResponse))
)]
pub(crate) async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let health = state.relay.health();
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: Utc::now(),
        connected_clients: health.connected_clients,
        total_traces: health.total_traces,
    })
}
