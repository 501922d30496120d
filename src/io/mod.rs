//! Persisted Record Container
//!
//! Recorded entries ([`IOEntry`]) live in an [`IOEntryStore`]. The
//! [`IOEntryManager`] assigns ids and capture timestamps, imports captured
//! live streams, and builds [`EntryCriteria`] queries.
//!
//! # On-disk layout
//!
//! [`FileIOEntryStore`] appends one JSON object per line:
//!
//! ```text
//! {"id":1,"date":"2024-01-01T00:00:00Z","correlation":"10.0.0.1","entry":{"type":"MessageEntry","message":"commit"}}
//! ```

pub mod criteria;
pub mod restriction;

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

pub use criteria::EntryCriteria;
pub use restriction::Restriction;

use crate::dispatcher::CorrelationId;
use crate::entry::Entry;
use crate::error::Result;
use crate::protocol::EntryReader;

/// A recorded entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IOEntry {
    /// Sequence id, unique within a store
    pub id: u64,
    /// Capture time
    pub date: DateTime<Utc>,
    pub correlation: CorrelationId,
    #[serde(deserialize_with = "crate::entry::deserialize_checked")]
    pub entry: Entry,
}

/// Receives recorded entries during a traversal.
pub trait IOEntryVisitor {
    fn visit(&mut self, entry: IOEntry) -> ControlFlow<()>;
}

impl<F> IOEntryVisitor for F
where
    F: FnMut(IOEntry) -> ControlFlow<()>,
{
    fn visit(&mut self, entry: IOEntry) -> ControlFlow<()> {
        self(entry)
    }
}

/// Port for recorded entry storage.
pub trait IOEntryStore: Send + Sync {
    fn append(&self, entry: &IOEntry) -> Result<()>;

    /// Forward-only traversal from the first entry; stops when the visitor
    /// breaks.
    fn visit(&self, visitor: &mut dyn IOEntryVisitor) -> Result<()>;

    /// Highest recorded id, zero for an empty store.
    fn last_id(&self) -> Result<u64> {
        let mut last = 0;
        self.visit(&mut |entry: IOEntry| {
            last = last.max(entry.id);
            ControlFlow::Continue(())
        })?;
        Ok(last)
    }
}

// =============================================================================
// In-memory store
// =============================================================================

#[derive(Debug, Default)]
pub struct InMemoryIOEntryStore {
    entries: RwLock<Vec<IOEntry>>,
}

impl InMemoryIOEntryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl IOEntryStore for InMemoryIOEntryStore {
    fn append(&self, entry: &IOEntry) -> Result<()> {
        self.entries.write().push(entry.clone());
        Ok(())
    }

    fn visit(&self, visitor: &mut dyn IOEntryVisitor) -> Result<()> {
        // snapshot so visitors may append without deadlocking
        let entries = self.entries.read().clone();
        for entry in entries {
            if visitor.visit(entry).is_break() {
                break;
            }
        }
        Ok(())
    }
}

// =============================================================================
// File store
// =============================================================================

/// JSON lines file, read back from disk on every traversal.
#[derive(Debug)]
pub struct FileIOEntryStore {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileIOEntryStore {
    /// Open for appending, creating the file if needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        debug!(path = %path.display(), "Opened entry store");
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl IOEntryStore for FileIOEntryStore {
    fn append(&self, entry: &IOEntry) -> Result<()> {
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');
        let mut file = self.file.lock();
        file.write_all(line.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    fn visit(&self, visitor: &mut dyn IOEntryVisitor) -> Result<()> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        let mut reader = BufReader::new(file);
        let mut line = String::new();
        let mut line_number = 0usize;

        loop {
            line.clear();
            if reader.read_line(&mut line)? == 0 {
                break;
            }
            line_number += 1;

            let complete = line.ends_with('\n');
            let text = line.trim();
            if text.is_empty() {
                continue;
            }

            let entry: IOEntry = match serde_json::from_str(text) {
                Ok(entry) => entry,
                Err(e) if !complete => {
                    warn!(
                        path = %self.path.display(),
                        line = line_number,
                        error = %e,
                        "Ignoring partial final record"
                    );
                    break;
                }
                Err(e) => return Err(e.into()),
            };

            if visitor.visit(entry).is_break() {
                break;
            }
        }
        Ok(())
    }
}

// =============================================================================
// Manager
// =============================================================================

/// Entry point for recording and querying entries.
pub struct IOEntryManager {
    store: Arc<dyn IOEntryStore>,
    last_id: AtomicU64,
}

impl IOEntryManager {
    /// Wrap a store, continuing its id sequence.
    pub fn new(store: Arc<dyn IOEntryStore>) -> Result<Self> {
        let last_id = store.last_id()?;
        Ok(Self {
            store,
            last_id: AtomicU64::new(last_id),
        })
    }

    pub fn in_memory() -> Self {
        Self {
            store: Arc::new(InMemoryIOEntryStore::new()),
            last_id: AtomicU64::new(0),
        }
    }

    /// Manager over a [`FileIOEntryStore`] at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::new(Arc::new(FileIOEntryStore::open(path)?))
    }

    /// Record an entry, assigning the next id and the current time.
    pub fn append(&self, correlation: &CorrelationId, entry: Entry) -> Result<IOEntry> {
        let record = IOEntry {
            id: self.last_id.fetch_add(1, Ordering::SeqCst) + 1,
            date: Utc::now(),
            correlation: correlation.clone(),
            entry,
        };
        self.store.append(&record)?;
        Ok(record)
    }

    pub fn visit(&self, visitor: &mut dyn IOEntryVisitor) -> Result<()> {
        self.store.visit(visitor)
    }

    /// Record every entry of a captured live stream. Returns the count.
    pub fn import<R: BufRead>(&self, reader: EntryReader<R>) -> Result<usize> {
        let mut imported = 0;
        for item in reader.entries() {
            let (_, correlation, entry) = item?;
            self.append(&correlation, entry)?;
            imported += 1;
        }
        info!(imported, "Imported captured stream");
        Ok(imported)
    }

    pub fn create_criteria(&self) -> EntryCriteria<'_> {
        EntryCriteria::new(self)
    }
}

impl std::fmt::Debug for IOEntryManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IOEntryManager")
            .field("last_id", &self.last_id.load(Ordering::SeqCst))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::MessageEntry;
    use crate::error::Error;
    use assert_matches::assert_matches;
    use std::io::Write as _;

    #[test]
    fn test_ids_and_visit() {
        let manager = IOEntryManager::in_memory();
        let first = manager.append(&"a".into(), MessageEntry::new("1").into()).unwrap();
        let second = manager.append(&"a".into(), MessageEntry::new("2").into()).unwrap();
        assert_eq!((first.id, second.id), (1, 2));

        let mut seen = Vec::new();
        manager
            .visit(&mut |e: IOEntry| {
                seen.push(e.id);
                ControlFlow::Break(())
            })
            .unwrap();
        assert_eq!(seen, vec![1]);
    }

    #[test]
    fn test_file_store_reopens_and_continues_ids() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("entries.jsonl");

        {
            let manager = IOEntryManager::open(&path).unwrap();
            manager.append(&"a".into(), MessageEntry::new("one").into()).unwrap();
            manager.append(&"a".into(), MessageEntry::new("two").into()).unwrap();
        }

        let manager = IOEntryManager::open(&path).unwrap();
        let third = manager.append(&"b".into(), MessageEntry::new("three").into()).unwrap();
        assert_eq!(third.id, 3);
        assert_eq!(manager.create_criteria().count().unwrap(), 3);
    }

    #[test]
    fn test_file_store_tolerates_partial_final_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("entries.jsonl");
        let store = FileIOEntryStore::open(&path).unwrap();
        let manager = IOEntryManager::new(Arc::new(store)).unwrap();
        manager.append(&"a".into(), MessageEntry::new("whole").into()).unwrap();

        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(br#"{"id":2,"date":"2024-01-"#).unwrap();

        let all = manager.create_criteria().list().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].entry.message(), Some("whole"));
    }

    #[test]
    fn test_file_store_rejects_corrupt_middle_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("entries.jsonl");
        std::fs::write(&path, "garbage\n").unwrap();

        assert_matches!(IOEntryManager::open(&path), Err(Error::Json(_)));
    }

    #[test]
    fn test_missing_file_visits_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileIOEntryStore::open(dir.path().join("x.jsonl")).unwrap();
        std::fs::remove_file(store.path()).unwrap();
        assert_eq!(store.last_id().unwrap(), 0);
    }
}
