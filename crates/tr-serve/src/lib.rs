pub mod openapi;
pub mod routes;
pub mod sse;
pub mod sweep;
pub mod system_info;
pub mod ws;

use axum::Router;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tr_core::{FileTailer, RelayConfig, TraceRelay};
use tracing::{info, warn};

#[derive(Clone)]
pub struct AppState {
    pub relay: TraceRelay,
    pub config: Arc<RelayConfig>,
}

impl AppState {
    pub fn new(config: RelayConfig) -> Self {
        Self {
            relay: TraceRelay::from_config(&config),
            config: Arc::new(config),
        }
    }
}

pub fn app(state: AppState) -> Router {
    routes::router(state)
}

/// The tailer and sweep scheduler running beside the HTTP server.
pub struct Background {
    tailer: JoinHandle<()>,
    sweeper: JoinHandle<()>,
}

impl Background {
    pub fn spawn(state: &AppState) -> Self {
        let tailer = FileTailer::new(state.config.trace_file.clone());
        let relay = state.relay.clone();
        let poll_interval = state.config.poll_interval;
        let tailer = tokio::spawn(async move {
            if let Err(err) = tailer.run(relay, poll_interval).await {
                warn!(error = %err, "trace file tailer stopped");
            }
        });
        let sweeper = tokio::spawn(sweep::run(
            state.relay.clone(),
            state.config.sweep_interval,
        ));
        Self { tailer, sweeper }
    }

    pub fn abort(self) {
        self.tailer.abort();
        self.sweeper.abort();
    }
}

/// Serves until `shutdown` resolves, then closes every observer and stops
/// the background tasks.
pub async fn serve<F>(state: AppState, listener: TcpListener, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let background = Background::spawn(&state);
    let relay = state.relay.clone();
    let signal = async move {
        shutdown.await;
        let closed = relay.close_observers();
        info!(closed, "shutting down, observers closed");
    };
    let result = axum::serve(listener, app(state))
        .with_graceful_shutdown(signal)
        .await;
    background.abort();
    result
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
