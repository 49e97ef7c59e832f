use crate::AppState;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures::stream::StreamExt;

/// Read-only live subscription over server-sent events.
pub fn subscribe(state: &AppState) -> Response {
    let subscription = state.relay.connect();
    let stream = subscription.map(|message| {
        let json = serde_json::to_string(message.as_ref()).unwrap_or_else(|_| "{}".to_string());
        Ok::<Event, std::convert::Infallible>(Event::default().event(message.name()).data(json))
    });
    Sse::new(stream).keep_alive(KeepAlive::default()).into_response()
}
