use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

/// One observed lifecycle point of a shell command, as retained by the relay.
///
/// Records are immutable once accepted. A later `completed` or `failed`
/// observation of the same command arrives as a separate record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TraceEvent {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub command: String,
    pub status: TraceStatus,
    pub pid: u32,
    pub cwd: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    pub source: TraceSource,
    /// Server clock at ingestion. Drives age eviction, unlike `timestamp`.
    pub received_at: DateTime<Utc>,
}

impl TraceEvent {
    pub fn from_input(
        input: TraceInput,
        id: String,
        source: TraceSource,
        received_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            timestamp: input.timestamp,
            command: input.command,
            status: input.status,
            pid: input.pid,
            cwd: input.cwd,
            duration: input.duration,
            data: input.data,
            source,
            received_at,
        }
    }

    /// First whitespace-delimited token of the command line.
    pub fn category(&self) -> &str {
        self.command.split_whitespace().next().unwrap_or("")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TraceStatus {
    Started,
    Completed,
    Failed,
}

impl TraceStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TraceSource {
    File,
    Api,
}

/// Producer payload: a trace event minus everything the server stamps.
///
/// Both the log file lines and the push endpoint bodies decode into this
/// shape, so the two ingestion paths agree on what a well-formed record is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TraceInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub command: String,
    pub status: TraceStatus,
    #[serde(alias = "processId", alias = "process_id")]
    pub pid: u32,
    #[serde(alias = "workingDirectory", alias = "working_directory")]
    pub cwd: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}
