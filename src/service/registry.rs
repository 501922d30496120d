//! Live session registry

use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use super::session::{ResponseLoggerService, SessionId};
use crate::dispatcher::CorrelationId;
use crate::preference::Preferences;

/// Sessions indexed by id and by the correlation id they monitor.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<SessionId, Arc<ResponseLoggerService>>,
    by_correlation: DashMap<CorrelationId, Vec<SessionId>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, session: Arc<ResponseLoggerService>) {
        let id = session.id();
        self.by_correlation
            .entry(session.monitored_addr().clone())
            .or_default()
            .push(id);
        debug!(session_id = %id, monitored_addr = %session.monitored_addr(), "Session registered");
        self.sessions.insert(id, session);
    }

    pub fn get(&self, id: SessionId) -> Option<Arc<ResponseLoggerService>> {
        self.sessions.get(&id).map(|s| Arc::clone(s.value()))
    }

    pub fn remove(&self, id: SessionId) -> Option<Arc<ResponseLoggerService>> {
        let (_, session) = self.sessions.remove(&id)?;
        let addr = session.monitored_addr();
        if let Some(mut ids) = self.by_correlation.get_mut(addr) {
            ids.retain(|i| *i != id);
        }
        self.by_correlation.remove_if(addr, |_, ids| ids.is_empty());
        Some(session)
    }

    /// Live sessions monitoring `correlation`, oldest first.
    pub fn sessions_for(&self, correlation: &CorrelationId) -> Vec<Arc<ResponseLoggerService>> {
        let ids = match self.by_correlation.get(correlation) {
            Some(ids) => ids.clone(),
            None => return Vec::new(),
        };
        ids.into_iter()
            .filter_map(|id| self.get(id))
            .filter(|s| s.is_alive())
            .collect()
    }

    /// Union of the preferences of every live session for `correlation`.
    pub fn merged_preferences(&self, correlation: &CorrelationId) -> Preferences {
        self.sessions_for(correlation)
            .iter()
            .fold(Preferences::new(), |acc, s| acc.merge(s.preferences()))
    }

    /// Whether any live session monitors `correlation`.
    pub fn is_monitored(&self, correlation: &CorrelationId) -> bool {
        !self.sessions_for(correlation).is_empty()
    }

    /// Drop terminal sessions, returning how many were removed.
    pub fn prune(&self) -> usize {
        let stopped: Vec<SessionId> = self
            .sessions
            .iter()
            .filter(|s| !s.value().is_alive())
            .map(|s| *s.key())
            .collect();
        let count = stopped.iter().filter(|id| self.remove(**id).is_some()).count();
        if count > 0 {
            debug!(count, "Pruned stopped sessions");
        }
        count
    }

    pub fn sessions(&self) -> Vec<Arc<ResponseLoggerService>> {
        let mut all: Vec<_> = self.sessions.iter().map(|s| Arc::clone(s.value())).collect();
        all.sort_by_key(|s| s.id());
        all
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::SharedBuffer;
    use crate::service::SessionConfig;

    fn session(addr: &str, prefs: Preferences) -> Arc<ResponseLoggerService> {
        ResponseLoggerService::new(
            addr.into(),
            Arc::new(prefs),
            SessionConfig::default(),
            Box::new(SharedBuffer::new()),
        )
        .unwrap()
    }

    #[test]
    fn test_lookup_by_correlation() {
        let registry = SessionRegistry::new();
        let a = session("10.0.0.1", Preferences::new());
        let b = session("10.0.0.1", Preferences::new());
        registry.register(a.clone());
        registry.register(b.clone());
        registry.register(session("10.0.0.2", Preferences::new()));

        let found = registry.sessions_for(&"10.0.0.1".into());
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].id(), a.id());

        b.stop();
        assert_eq!(registry.sessions_for(&"10.0.0.1".into()).len(), 1);
        assert!(!registry.is_monitored(&"10.0.0.3".into()));
    }

    #[test]
    fn test_prune_removes_stopped() {
        let registry = SessionRegistry::new();
        let a = session("a", Preferences::new());
        registry.register(a.clone());
        registry.register(session("a", Preferences::new()));

        a.stop();
        assert_eq!(registry.prune(), 1);
        assert_eq!(registry.len(), 1);
        assert!(registry.get(a.id()).is_none());
    }

    #[test]
    fn test_merged_preferences() {
        let registry = SessionRegistry::new();
        registry.register(session("a", Preferences::new().with_enabled("x", true)));
        registry.register(session("a", Preferences::new().with_enabled("y", true)));

        let merged = registry.merged_preferences(&"a".into());
        assert!(merged.is_enabled("x"));
        assert!(merged.is_enabled("y"));
        assert!(registry.merged_preferences(&"b".into()).is_empty());
    }
}
