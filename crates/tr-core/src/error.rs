use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TraceError {
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
}

#[derive(Debug, Error)]
pub enum TailerError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("watch error: {0}")]
    Watch(#[from] notify::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid config: {message}")]
    Invalid { message: String },
}

#[derive(Debug, Error)]
pub enum RelayError {
    #[error(transparent)]
    Trace(#[from] TraceError),
    #[error(transparent)]
    Tailer(#[from] TailerError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("internal error: {message}")]
    Internal { message: String },
}
