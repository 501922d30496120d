//! Streaming Session Service
//!
//! Per-session bounded queues feeding the output protocol, plus the registry
//! and control operations that manage them.

mod controller;
mod metrics;
mod registry;
mod session;

pub use controller::{ControlStatus, SessionController, StartRequest};
pub use metrics::{MetricsSnapshot, SessionMetrics};
pub use registry::SessionRegistry;
pub use session::{
    LogOutcome, ResponseLoggerService, SessionConfig, SessionId, SessionInfo, SessionState,
    TransferEntryHolder,
};
