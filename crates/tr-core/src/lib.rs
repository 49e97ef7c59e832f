pub mod config;
pub mod error;
pub mod hub;
pub mod relay;
pub mod tailer;
pub mod validation;

pub use crate::config::RelayConfig;
pub use crate::error::{ConfigError, RelayError, TailerError, TraceError};
pub use crate::hub::{BroadcastHub, Delivery, ObserverId};
pub use crate::relay::{Ingested, RelayHealth, Subscription, TraceRelay};
pub use crate::tailer::{FileTailer, ScanReport};
