//! Entry Dispatcher
//!
//! Routes `(preference key, correlation id, entry)` triples from listeners to
//! the live monitoring sessions registered for the correlation id.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::trace;
use uuid::Uuid;

use crate::entry::Entry;
use crate::service::{LogOutcome, SessionRegistry};

/// Identity under which entries are routed to sessions, usually the
/// monitored client address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh random id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CorrelationId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for CorrelationId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Port through which listeners hand entries to the streaming service.
pub trait EntryDispatcher: Send + Sync {
    /// Deliver `entry` to every live session for `correlation` whose
    /// preferences enable `preference_key`.
    fn forward(&self, preference_key: &str, correlation: &CorrelationId, entry: Entry);
}

/// Dispatcher backed by the session registry.
#[derive(Debug, Clone)]
pub struct ContextLogDispatcher {
    registry: Arc<SessionRegistry>,
}

impl ContextLogDispatcher {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }
}

impl EntryDispatcher for ContextLogDispatcher {
    fn forward(&self, preference_key: &str, correlation: &CorrelationId, entry: Entry) {
        let mut targets: Vec<_> = self
            .registry
            .sessions_for(correlation)
            .into_iter()
            .filter(|s| s.preferences().is_enabled(preference_key))
            .collect();

        let Some(last) = targets.pop() else {
            trace!(
                correlation = %correlation,
                key = preference_key,
                "No session enabled for entry"
            );
            return;
        };

        for session in &targets {
            if let LogOutcome::Overflow = session.log(correlation, entry.clone()) {
                trace!(session_id = %session.id(), "Session overflowed on dispatch");
            }
        }
        if let LogOutcome::Overflow = last.log(correlation, entry) {
            trace!(session_id = %last.id(), "Session overflowed on dispatch");
        }
    }
}

/// Dispatcher that records everything it is given.
#[derive(Debug, Default)]
pub struct InMemoryEntryDispatcher {
    forwarded: RwLock<Vec<(String, CorrelationId, Entry)>>,
}

impl InMemoryEntryDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<Entry> {
        self.forwarded.read().iter().map(|(_, _, e)| e.clone()).collect()
    }

    /// Entries forwarded under a specific preference key.
    pub fn entries_for_key(&self, preference_key: &str) -> Vec<Entry> {
        self.forwarded
            .read()
            .iter()
            .filter(|(k, _, _)| k == preference_key)
            .map(|(_, _, e)| e.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.forwarded.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.forwarded.read().is_empty()
    }

    pub fn clear(&self) {
        self.forwarded.write().clear();
    }
}

impl EntryDispatcher for InMemoryEntryDispatcher {
    fn forward(&self, preference_key: &str, correlation: &CorrelationId, entry: Entry) {
        self.forwarded
            .write()
            .push((preference_key.to_string(), correlation.clone(), entry));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::MessageEntry;
    use crate::preference::Preferences;
    use crate::protocol::SharedBuffer;
    use crate::service::{ResponseLoggerService, SessionConfig};

    fn session(
        registry: &SessionRegistry,
        addr: &str,
        prefs: Preferences,
    ) -> Arc<ResponseLoggerService> {
        let session = ResponseLoggerService::new(
            CorrelationId::from(addr),
            Arc::new(prefs),
            SessionConfig::default(),
            Box::new(SharedBuffer::new()),
        )
        .unwrap();
        registry.register(session.clone());
        session
    }

    #[test]
    fn test_no_session_is_noop() {
        let registry = Arc::new(SessionRegistry::new());
        let dispatcher = ContextLogDispatcher::new(registry);
        dispatcher.forward("a", &"10.0.0.1".into(), MessageEntry::new("x").into());
    }

    #[test]
    fn test_routes_by_correlation_and_key() {
        let registry = Arc::new(SessionRegistry::new());
        let enabled = session(&registry, "10.0.0.1", Preferences::new().with_enabled("sql.view.sql.enabled", true));
        let disabled = session(&registry, "10.0.0.1", Preferences::new());
        let other = session(&registry, "10.0.0.2", Preferences::new().with_enabled("sql.view.sql.enabled", true));

        let dispatcher = ContextLogDispatcher::new(registry);
        dispatcher.forward(
            "sql.view.sql.enabled",
            &"10.0.0.1".into(),
            MessageEntry::new("select 1").into(),
        );

        assert_eq!(enabled.queue_len(), 1);
        assert_eq!(disabled.queue_len(), 0);
        assert_eq!(other.queue_len(), 0);
    }

    #[test]
    fn test_in_memory_dispatcher() {
        let dispatcher = InMemoryEntryDispatcher::new();
        dispatcher.forward("a", &CorrelationId::generate(), MessageEntry::new("1").into());
        dispatcher.forward("b", &CorrelationId::generate(), MessageEntry::new("2").into());

        assert_eq!(dispatcher.len(), 2);
        assert_eq!(dispatcher.entries_for_key("b").len(), 1);
        dispatcher.clear();
        assert!(dispatcher.is_empty());
    }
}
