//! ctxlog - Runtime Context Logger
//!
//! Captures method-level events from live code, converts them into a
//! serializable entry model and streams them to remote observer sessions.
//! Recorded streams can be queried offline.
//!
//! # Architecture
//!
//! ```text
//! observed code → Proxy/listeners → Dispatcher → Session queue → output stream
//!                 (gated by preferences)                          │
//!                                         record store ◀── import ┘
//!                                              │
//!                                         EntryCriteria (offline queries)
//! ```
//!
//! # Modules
//!
//! - [`entry`] - Entry model
//! - [`converter`] - Object conversion registry
//! - [`preference`] - Preference model and evaluators
//! - [`proxy`] - Interception layer
//! - [`logger`] - Listeners turning calls into entries
//! - [`sql`] - SQL capability decorators
//! - [`dispatcher`] - Routing of entries to sessions
//! - [`service`] - Streaming sessions, registry and control operations
//! - [`protocol`] - Line-delimited JSON output stream
//! - [`io`] - Record store and query engine
//! - [`error`] - Error types

pub mod converter;
pub mod dispatcher;
pub mod entry;
pub mod error;
pub mod io;
pub mod logger;
pub mod preference;
pub mod protocol;
pub mod proxy;
pub mod service;
pub mod sql;

// Re-export commonly used types
pub use dispatcher::{ContextLogDispatcher, CorrelationId, EntryDispatcher};
pub use entry::{Entry, EntryType};
pub use error::{Error, Result};
pub use io::{EntryCriteria, IOEntry, IOEntryManager};
pub use preference::{GeneralPreferenceEvaluator, Preferences};
pub use proxy::{MethodListener, MethodPattern, Proxy, ProxyFactory};
pub use service::{ResponseLoggerService, SessionConfig, SessionController, SessionRegistry};
