use clap::{Args, Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tokio::net::TcpListener;
use tr_core::{RelayConfig, RelayError};
use tr_serve::AppState;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "tr", about = "Relay shell command traces to live observers")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the relay server.
    Serve(ServeArgs),
    /// Print the OpenAPI document.
    Openapi,
}

#[derive(Args, Debug, Default)]
struct ServeArgs {
    /// TOML config file; flags override its values.
    #[arg(long, env = "TRACE_RELAY_CONFIG")]
    config: Option<PathBuf>,
    #[arg(long, env = "TRACE_RELAY_BIND")]
    bind: Option<SocketAddr>,
    /// Port on the configured address. Ignored when --bind is given.
    #[arg(long, env = "PORT")]
    port: Option<u16>,
    #[arg(long, env = "TRACE_RELAY_FILE")]
    trace_file: Option<PathBuf>,
    #[arg(long)]
    max_retained: Option<usize>,
    #[arg(long, value_parser = parse_duration)]
    max_age: Option<Duration>,
    #[arg(long, value_parser = parse_duration)]
    sweep_interval: Option<Duration>,
    /// Poll the trace file instead of using native notifications.
    #[arg(long, value_parser = parse_duration)]
    poll_interval: Option<Duration>,
    #[arg(long)]
    observer_buffer: Option<usize>,
    #[arg(long = "cors-origin")]
    cors_origins: Vec<String>,
}

impl ServeArgs {
    fn into_config(self) -> Result<RelayConfig, RelayError> {
        let mut config = match &self.config {
            Some(path) => RelayConfig::load(path)?,
            None => RelayConfig::default(),
        };
        match (self.bind, self.port) {
            (Some(bind), _) => config.bind = bind,
            (None, Some(port)) => config.bind.set_port(port),
            (None, None) => {}
        }
        if let Some(trace_file) = self.trace_file {
            config.trace_file = trace_file;
        }
        if let Some(max_retained) = self.max_retained {
            config.max_retained = max_retained;
        }
        if let Some(max_age) = self.max_age {
            config.max_age = max_age;
        }
        if let Some(sweep_interval) = self.sweep_interval {
            config.sweep_interval = sweep_interval;
        }
        if self.poll_interval.is_some() {
            config.poll_interval = self.poll_interval;
        }
        if let Some(observer_buffer) = self.observer_buffer {
            config.observer_buffer = observer_buffer;
        }
        if !self.cors_origins.is_empty() {
            config.cors_origins = self.cors_origins;
        }
        config.validate()?;
        Ok(config)
    }
}

fn parse_duration(value: &str) -> Result<Duration, String> {
    humantime_serde::re::humantime::parse_duration(value).map_err(|err| err.to_string())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match cli.command {
        Command::Serve(args) => {
            init_tracing();
            match serve(args).await {
                Ok(()) => ExitCode::SUCCESS,
                Err(err) => {
                    error!(error = %err, "trace relay failed");
                    ExitCode::FAILURE
                }
            }
        }
        Command::Openapi => {
            println!("{}", tr_serve::openapi::generate_spec());
            ExitCode::SUCCESS
        }
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tr=info,tr_core=info,tr_serve=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn serve(args: ServeArgs) -> Result<(), RelayError> {
    let config = args.into_config()?;
    let listener = TcpListener::bind(config.bind)
        .await
        .map_err(|err| RelayError::Internal {
            message: format!("failed to bind {}: {err}", config.bind),
        })?;
    info!(
        addr = %config.bind,
        trace_file = %config.trace_file.display(),
        max_retained = config.max_retained,
        "trace relay listening"
    );
    let state = AppState::new(config);
    tr_serve::serve(state, listener, tr_serve::shutdown_signal())
        .await
        .map_err(|err| RelayError::Internal {
            message: format!("server error: {err}"),
        })?;
    info!("trace relay stopped");
    Ok(())
}
