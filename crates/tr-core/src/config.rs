use crate::error::ConfigError;
use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 3001;
pub const DEFAULT_TRACE_FILE: &str = "/tmp/nu-commands.jsonl";

/// Tunables for the relay. Every field has a default, so a config file only
/// needs the values it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub bind: SocketAddr,
    pub trace_file: PathBuf,
    pub max_retained: usize,
    #[serde(with = "humantime_serde")]
    pub max_age: Duration,
    #[serde(with = "humantime_serde")]
    pub sweep_interval: Duration,
    /// Poll the trace file at this cadence instead of relying on native
    /// change notifications.
    #[serde(with = "humantime_serde")]
    pub poll_interval: Option<Duration>,
    pub observer_buffer: usize,
    pub cors_origins: Vec<String>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), DEFAULT_PORT),
            trace_file: PathBuf::from(DEFAULT_TRACE_FILE),
            max_retained: 1000,
            max_age: Duration::from_secs(60 * 60),
            sweep_interval: Duration::from_secs(5 * 60),
            poll_interval: None,
            observer_buffer: 256,
            cors_origins: vec!["http://localhost:3000".to_string()],
        }
    }
}

impl RelayConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_retained == 0 {
            return Err(invalid("max_retained must be at least 1"));
        }
        if self.max_age.is_zero() {
            return Err(invalid("max_age must be positive"));
        }
        if self.sweep_interval.is_zero() {
            return Err(invalid("sweep_interval must be positive"));
        }
        if self.poll_interval.is_some_and(|interval| interval.is_zero()) {
            return Err(invalid("poll_interval must be positive"));
        }
        if self.observer_buffer == 0 {
            return Err(invalid("observer_buffer must be at least 1"));
        }
        if TimeDelta::from_std(self.max_age).is_err() {
            return Err(invalid("max_age is out of range"));
        }
        Ok(())
    }

    pub fn max_age_delta(&self) -> TimeDelta {
        TimeDelta::from_std(self.max_age).unwrap_or(TimeDelta::MAX)
    }
}

fn invalid(message: &str) -> ConfigError {
    ConfigError::Invalid {
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_applied() {
        let config = RelayConfig::default();
        assert_eq!(config.max_retained, 1000);
        assert_eq!(config.max_age, Duration::from_secs(3600));
        assert_eq!(config.sweep_interval, Duration::from_secs(300));
        assert_eq!(config.bind.port(), 3001);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
max_retained = 50
max_age = "30m"
poll_interval = "2s"
trace_file = "/var/log/traces.jsonl"
"#
        )
        .unwrap();

        let config = RelayConfig::load(file.path()).unwrap();

        assert_eq!(config.max_retained, 50);
        assert_eq!(config.max_age, Duration::from_secs(1800));
        assert_eq!(config.poll_interval, Some(Duration::from_secs(2)));
        assert_eq!(config.trace_file, PathBuf::from("/var/log/traces.jsonl"));
        assert_eq!(config.sweep_interval, Duration::from_secs(300));
        assert_eq!(config.max_age_delta(), TimeDelta::minutes(30));
    }

    #[test]
    fn zero_bound_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_retained = 0").unwrap();
        assert!(matches!(
            RelayConfig::load(file.path()),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn unparseable_file_is_reported() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_age = \"forever\"").unwrap();
        assert!(matches!(
            RelayConfig::load(file.path()),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn missing_file_is_reported() {
        let result = RelayConfig::load(Path::new("/definitely/not/here.toml"));
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }
}
