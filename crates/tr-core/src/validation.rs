use crate::error::TraceError;
use tr_events::TraceInput;

/// Decodes one log line into a trace payload.
pub fn parse_trace_line(line: &str) -> Result<TraceInput, TraceError> {
    let input = serde_json::from_str::<TraceInput>(line.trim()).map_err(invalid)?;
    validate_trace_input(input)
}

/// Decodes a pushed request body into a trace payload.
pub fn parse_trace_payload(body: &[u8]) -> Result<TraceInput, TraceError> {
    let input = serde_json::from_slice::<TraceInput>(body).map_err(invalid)?;
    validate_trace_input(input)
}

pub fn validate_trace_input(mut input: TraceInput) -> Result<TraceInput, TraceError> {
    if input.command.trim().is_empty() {
        return Err(TraceError::InvalidInput {
            message: "command must not be empty".to_string(),
        });
    }
    if input.id.as_deref().is_some_and(|id| id.trim().is_empty()) {
        return Err(TraceError::InvalidInput {
            message: "id must not be blank".to_string(),
        });
    }
    if input.duration.as_deref().is_some_and(|value| value.trim().is_empty()) {
        input.duration = None;
    }
    Ok(input)
}

fn invalid(err: serde_json::Error) -> TraceError {
    TraceError::InvalidInput {
        message: err.to_string(),
    }
}
