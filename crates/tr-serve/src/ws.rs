use crate::system_info;
use crate::AppState;
use axum::extract::ws::{Message, Utf8Bytes, WebSocket};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tr_events::{ClientMessage, HubMessage};
use tracing::{debug, warn};

/// Drives one live observer over a websocket.
///
/// The writer half forwards hub messages (and replies to this client) until
/// the hub drops the observer or the socket fails. The reader half handles
/// client requests until the peer goes away.
pub async fn handle_socket(socket: WebSocket, state: AppState) {
    let mut subscription = state.relay.connect();
    let observer = subscription.id();
    let (mut sender, mut receiver) = socket.split();
    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<HubMessage>();

    let mut writer = tokio::spawn(async move {
        loop {
            let message = tokio::select! {
                next = subscription.recv() => match next {
                    Some(message) => message,
                    None => break,
                },
                Some(reply) = reply_rx.recv() => Arc::new(reply),
            };
            let json = match serde_json::to_string(message.as_ref()) {
                Ok(json) => json,
                Err(err) => {
                    warn!(
                        observer = %observer,
                        event = message.name(),
                        error = %err,
                        "dropping unserializable message"
                    );
                    continue;
                }
            };
            if sender.send(Message::Text(Utf8Bytes::from(json))).await.is_err() {
                break;
            }
        }
        let _ = sender.send(Message::Close(None)).await;
    });

    loop {
        tokio::select! {
            _ = &mut writer => break,
            frame = receiver.next() => match frame {
                Some(Ok(Message::Text(text))) => handle_client_text(text.as_str(), &reply_tx),
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
    writer.abort();
    debug!(observer = %observer, "websocket closed");
}

fn handle_client_text(text: &str, reply_tx: &mpsc::UnboundedSender<HubMessage>) {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(ClientMessage::GetSystemInfo) => {
            let reply_tx = reply_tx.clone();
            tokio::spawn(async move {
                let info = system_info::collect().await;
                let _ = reply_tx.send(HubMessage::SystemInfo(info));
            });
        }
        Err(err) => debug!(error = %err, "ignoring client message"),
    }
}

#[cfg(test)]
mod tests {
    use crate::{app, AppState};
    use chrono::Utc;
    use futures::{SinkExt, StreamExt};
    use serde_json::Value;
    use std::time::Duration;
    use tokio::net::{TcpListener, TcpStream};
    use tokio_tungstenite::tungstenite::Message as Frame;
    use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
    use tr_core::RelayConfig;
    use tr_events::{TraceInput, TraceSource, TraceStatus};

    type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

    async fn next_json(client: &mut Client) -> Value {
        loop {
            let frame = tokio::time::timeout(Duration::from_secs(10), client.next())
                .await
                .expect("timed out waiting for a frame")
                .expect("socket closed")
                .unwrap();
            if let Frame::Text(text) = frame {
                return serde_json::from_str(text.as_str()).unwrap();
            }
        }
    }

    async fn wait_for_clients(state: &AppState, count: usize) {
        for _ in 0..100 {
            if state.relay.health().connected_clients == count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!(
            "expected {count} clients, found {}",
            state.relay.health().connected_clients
        );
    }

    #[tokio::test]
    async fn websocket_observer_lifecycle() {
        let state = AppState::new(RelayConfig::default());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let router = app(state.clone());
        let server = tokio::spawn(async move { axum::serve(listener, router).await });

        let url = format!("ws://{addr}/api/traces/stream");
        let (mut client, _) = tokio_tungstenite::connect_async(url).await.unwrap();

        let initial = next_json(&mut client).await;
        assert_eq!(initial, serde_json::json!({ "event": "initial-traces", "data": [] }));
        assert_eq!(state.relay.health().connected_clients, 1);

        state.relay.ingest(
            TraceInput {
                id: Some("ws-1".to_string()),
                timestamp: Utc::now(),
                command: "ls -la".to_string(),
                status: TraceStatus::Started,
                pid: 42,
                cwd: "/home".to_string(),
                duration: None,
                data: None,
            },
            TraceSource::Api,
        );
        let new_trace = next_json(&mut client).await;
        assert_eq!(new_trace["event"], "new-trace");
        assert_eq!(new_trace["data"]["id"], "ws-1");
        assert!(new_trace["data"]["received_at"].is_string());

        client
            .send(Frame::text(r#"{"event":"get-system-info"}"#.to_string()))
            .await
            .unwrap();
        let info = next_json(&mut client).await;
        assert_eq!(info["event"], "system-info");
        assert!(info["data"]["system"].is_string());

        let _ = client.close(None).await;
        drop(client);
        wait_for_clients(&state, 0).await;
        server.abort();
    }
}
