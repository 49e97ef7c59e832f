use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use tr_core::{RelayError, TraceError};
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorEnvelope {
    pub code: String,
    pub message: String,
}

pub fn map_error(err: &RelayError) -> (StatusCode, Json<ErrorEnvelope>) {
    let (status, code) = match err {
        RelayError::Trace(TraceError::InvalidInput { .. }) => {
            (StatusCode::BAD_REQUEST, "invalid_input")
        }
        RelayError::Config(_) | RelayError::Tailer(_) | RelayError::Internal { .. } => {
            (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
        }
    };

    (
        status,
        Json(ErrorEnvelope {
            code: code.to_string(),
            message: err.to_string(),
        }),
    )
}
