//! Conjunctive queries over a record store

use std::ops::ControlFlow;

use super::restriction::Restriction;
use super::{IOEntry, IOEntryManager};
use crate::dispatcher::CorrelationId;
use crate::error::{Error, Result};

/// A query: entries must satisfy every added restriction.
///
/// Restrictions see only the entry payload. Filtering on the record's
/// correlation id goes through [`EntryCriteria::correlation`].
/// Each result method runs a fresh traversal of the store.
pub struct EntryCriteria<'a> {
    manager: &'a IOEntryManager,
    correlation: Option<CorrelationId>,
    restrictions: Vec<Box<dyn Restriction>>,
}

impl<'a> EntryCriteria<'a> {
    pub(crate) fn new(manager: &'a IOEntryManager) -> Self {
        Self {
            manager,
            correlation: None,
            restrictions: Vec::new(),
        }
    }

    pub fn add(mut self, restriction: impl Restriction + 'static) -> Self {
        self.restrictions.push(Box::new(restriction));
        self
    }

    /// Only records captured under `id`.
    pub fn correlation(mut self, id: impl Into<CorrelationId>) -> Self {
        self.correlation = Some(id.into());
        self
    }

    fn accepts(&self, record: &IOEntry) -> bool {
        if let Some(id) = &self.correlation {
            if record.correlation != *id {
                return false;
            }
        }
        self.restrictions.iter().all(|r| r.matches(&record.entry))
    }

    /// Every matching entry, in store order.
    pub fn list(&self) -> Result<Vec<IOEntry>> {
        let mut found = Vec::new();
        self.manager.visit(&mut |entry: IOEntry| {
            if self.accepts(&entry) {
                found.push(entry);
            }
            ControlFlow::Continue(())
        })?;
        Ok(found)
    }

    pub fn first_result(&self) -> Result<Option<IOEntry>> {
        let mut found = None;
        self.manager.visit(&mut |entry: IOEntry| {
            if self.accepts(&entry) {
                found = Some(entry);
                return ControlFlow::Break(());
            }
            ControlFlow::Continue(())
        })?;
        Ok(found)
    }

    pub fn last_result(&self) -> Result<Option<IOEntry>> {
        let mut found = None;
        self.manager.visit(&mut |entry: IOEntry| {
            if self.accepts(&entry) {
                found = Some(entry);
            }
            ControlFlow::Continue(())
        })?;
        Ok(found)
    }

    /// The single matching entry, `None` when nothing matches.
    ///
    /// The traversal stops at the second match, so the count carried by
    /// [`Error::NonUniqueResult`] is a lower bound.
    pub fn unique_result(&self) -> Result<Option<IOEntry>> {
        let mut found = None;
        let mut count = 0;
        self.manager.visit(&mut |entry: IOEntry| {
            if !self.accepts(&entry) {
                return ControlFlow::Continue(());
            }
            count += 1;
            if count > 1 {
                return ControlFlow::Break(());
            }
            found = Some(entry);
            ControlFlow::Continue(())
        })?;

        if count > 1 {
            return Err(Error::NonUniqueResult { count });
        }
        Ok(found)
    }

    pub fn count(&self) -> Result<usize> {
        let mut count = 0;
        self.manager.visit(&mut |entry: IOEntry| {
            if self.accepts(&entry) {
                count += 1;
            }
            ControlFlow::Continue(())
        })?;
        Ok(count)
    }
}

impl std::fmt::Debug for EntryCriteria<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryCriteria")
            .field("correlation", &self.correlation)
            .field("restrictions", &self.restrictions.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::super::restriction::{entry_type, message_contains};
    use super::*;
    use crate::entry::{EntryType, MessageEntry};
    use assert_matches::assert_matches;

    fn manager() -> IOEntryManager {
        let manager = IOEntryManager::in_memory();
        for text in ["open", "select 1", "select 2", "close"] {
            manager.append(&"a".into(), MessageEntry::new(text).into()).unwrap();
        }
        manager
    }

    #[test]
    fn test_list_first_last() {
        let manager = manager();
        let criteria = manager.create_criteria().add(message_contains("select"));

        assert_eq!(criteria.list().unwrap().len(), 2);
        assert_eq!(criteria.count().unwrap(), 2);
        assert_eq!(criteria.first_result().unwrap().unwrap().entry.message(), Some("select 1"));
        assert_eq!(criteria.last_result().unwrap().unwrap().entry.message(), Some("select 2"));
    }

    #[test]
    fn test_unique_result() {
        let manager = manager();

        let none = manager.create_criteria().add(message_contains("commit"));
        assert!(none.unique_result().unwrap().is_none());

        let one = manager
            .create_criteria()
            .add(entry_type(EntryType::Message))
            .add(message_contains("open"));
        assert_eq!(one.unique_result().unwrap().unwrap().id, 1);

        let many = manager.create_criteria().add(message_contains("select"));
        assert_matches!(many.unique_result(), Err(Error::NonUniqueResult { count: 2 }));
    }

    #[test]
    fn test_unique_result_stops_at_second_match() {
        let manager = IOEntryManager::in_memory();
        for _ in 0..50 {
            manager.append(&"a".into(), MessageEntry::new("tick").into()).unwrap();
        }

        let criteria = manager.create_criteria().add(message_contains("tick"));
        assert_matches!(criteria.unique_result(), Err(Error::NonUniqueResult { count: 2 }));
        assert_eq!(criteria.count().unwrap(), 50);
    }

    #[test]
    fn test_correlation_filter() {
        let manager = manager();
        manager.append(&"b".into(), MessageEntry::new("select 3").into()).unwrap();

        let criteria = manager
            .create_criteria()
            .correlation("b")
            .add(message_contains("select"));
        let found = criteria.unique_result().unwrap().unwrap();
        assert_eq!(found.entry.message(), Some("select 3"));
        assert_eq!(found.correlation, CorrelationId::from("b"));

        let other = manager.create_criteria().correlation("a");
        assert_eq!(other.count().unwrap(), 4);
        assert!(manager.create_criteria().correlation("c").first_result().unwrap().is_none());
    }

    #[test]
    fn test_no_restrictions_matches_all() {
        let manager = manager();
        assert_eq!(manager.create_criteria().list().unwrap().len(), 4);
    }
}
