use crate::types::TraceEvent;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Server-to-observer message on the live subscription channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum HubMessage {
    InitialTraces(Vec<TraceEvent>),
    NewTrace(TraceEvent),
    TracesCleared,
    SystemInfo(SystemInfo),
}

impl HubMessage {
    pub fn name(&self) -> &'static str {
        match self {
            Self::InitialTraces(_) => "initial-traces",
            Self::NewTrace(_) => "new-trace",
            Self::TracesCleared => "traces-cleared",
            Self::SystemInfo(_) => "system-info",
        }
    }
}

/// Observer-to-server message on the live subscription channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum ClientMessage {
    GetSystemInfo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SystemInfo {
    pub timestamp: DateTime<Utc>,
    pub system: String,
    pub error: Option<String>,
}
