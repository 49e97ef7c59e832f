pub mod messages;
pub mod store;
pub mod types;

pub use crate::messages::{ClientMessage, HubMessage, SystemInfo};
pub use crate::store::RetentionStore;
pub use crate::types::{TraceEvent, TraceInput, TraceSource, TraceStatus};
