use utoipa::OpenApi;

use crate::routes::error::ErrorEnvelope;
use crate::routes::health::HealthResponse;
use crate::routes::traces::{ClearResponse, PushResponse, TracesQuery};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use tr_events::{HubMessage, SystemInfo, TraceEvent, TraceInput, TraceSource, TraceStatus};

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::traces::push_trace,
        crate::routes::traces::list_traces,
        crate::routes::traces::clear_traces,
        crate::routes::traces::stream,
        crate::routes::traces::subscribe,
        crate::routes::health::health
    ),
    components(schemas(
        TraceEvent,
        TraceInput,
        TraceStatus,
        TraceSource,
        HubMessage,
        SystemInfo,
        TracesQuery,
        PushResponse,
        ClearResponse,
        HealthResponse,
        ErrorEnvelope
    ))
)]
struct ApiDoc;

pub fn generate_spec() -> String {
    ApiDoc::openapi()
        .to_pretty_json()
        .unwrap_or_else(|_| "{}".to_string())
}

pub fn router() -> Router {
    Router::new().route("/openapi.json", get(openapi_json))
}

async fn openapi_json() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}
