//! Output Protocol
//!
//! Line-delimited JSON stream written by a session to its observer.
//!
//! # Records
//!
//! ```text
//! {"record":"start","session_id":1,"monitored_addr":"10.0.0.1","timestamp":"..."}
//! {"record":"entry","id":1,"correlation":"10.0.0.1","entry":{"type":"MessageEntry",...}}
//! {"record":"end","session_id":1,"state":"ExplicitStopped","entries":1,"timestamp":"..."}
//! ```
//!
//! The reader tolerates a truncated final line, which is what an observer
//! sees when the stream is cut mid-write.

use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dispatcher::CorrelationId;
use crate::entry::Entry;
use crate::error::Result;
use crate::service::TransferEntryHolder;

/// One line of the live stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "lowercase")]
pub enum Record {
    /// Written once when the writer is bound to the stream.
    Start {
        session_id: u64,
        monitored_addr: String,
        timestamp: DateTime<Utc>,
    },
    /// One dispatched entry.
    Entry {
        id: u64,
        correlation: CorrelationId,
        #[serde(deserialize_with = "crate::entry::deserialize_checked")]
        entry: Entry,
    },
    /// Written once when the session leaves the alive state.
    End {
        session_id: u64,
        state: String,
        entries: u64,
        timestamp: DateTime<Utc>,
    },
}

impl Record {
    pub fn from_line(line: &str) -> Result<Self> {
        Ok(serde_json::from_str(line)?)
    }

    pub fn to_line(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

// =============================================================================
// Writer
// =============================================================================

/// Writes records to a session's output stream.
///
/// Each record is handed to the sink with a single `write_all`, so a failing
/// sink surfaces per record. Wrap socket sinks in a `BufWriter`; the session
/// flushes once per drain cycle.
pub struct EntryWriter {
    out: Box<dyn Write + Send>,
    session_id: u64,
    written: u64,
}

impl EntryWriter {
    /// Bind to a stream, writing and flushing the start record.
    pub fn bind(sink: Box<dyn Write + Send>, session_id: u64, monitored_addr: &str) -> Result<Self> {
        let mut writer = Self {
            out: sink,
            session_id,
            written: 0,
        };
        writer.write_record(&Record::Start {
            session_id,
            monitored_addr: monitored_addr.to_string(),
            timestamp: Utc::now(),
        })?;
        writer.flush()?;
        Ok(writer)
    }

    /// Write one entry record and return the id it was given.
    pub fn write_entry(&mut self, holder: &TransferEntryHolder) -> Result<u64> {
        let id = self.written + 1;
        self.write_record(&Record::Entry {
            id,
            correlation: holder.correlation().clone(),
            entry: holder.entry().clone(),
        })?;
        self.written = id;
        Ok(id)
    }

    pub fn flush(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }

    /// Number of entry records written so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Write the end record and flush. Consumes the writer.
    pub fn close(mut self, state: &str) -> Result<()> {
        self.write_record(&Record::End {
            session_id: self.session_id,
            state: state.to_string(),
            entries: self.written,
            timestamp: Utc::now(),
        })?;
        self.flush()
    }

    fn write_record(&mut self, record: &Record) -> Result<()> {
        // serialize first so a failure never leaves half a line behind
        let mut line = record.to_line()?;
        line.push('\n');
        self.out.write_all(line.as_bytes())?;
        Ok(())
    }
}

impl std::fmt::Debug for EntryWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryWriter")
            .field("session_id", &self.session_id)
            .field("written", &self.written)
            .finish()
    }
}

// =============================================================================
// Reader
// =============================================================================

/// Iterates the records of a captured stream.
pub struct EntryReader<R> {
    input: R,
    line: String,
    done: bool,
}

impl EntryReader<BufReader<File>> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(BufReader::new(File::open(path)?)))
    }
}

impl<R: BufRead> EntryReader<R> {
    pub fn new(input: R) -> Self {
        Self {
            input,
            line: String::new(),
            done: false,
        }
    }

    /// Only the entry records, with their stream ids.
    pub fn entries(self) -> impl Iterator<Item = Result<(u64, CorrelationId, Entry)>> {
        self.filter_map(|record| match record {
            Ok(Record::Entry {
                id,
                correlation,
                entry,
            }) => Some(Ok((id, correlation, entry))),
            Ok(_) => None,
            Err(e) => Some(Err(e)),
        })
    }
}

impl<R: BufRead> Iterator for EntryReader<R> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            self.line.clear();
            let read = match self.input.read_line(&mut self.line) {
                Ok(n) => n,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e.into()));
                }
            };
            if read == 0 {
                self.done = true;
                break;
            }

            let complete = self.line.ends_with('\n');
            let text = self.line.trim();
            if text.is_empty() {
                continue;
            }

            return match Record::from_line(text) {
                Ok(record) => Some(Ok(record)),
                Err(e) if !complete => {
                    debug!(error = %e, "Ignoring truncated final record");
                    self.done = true;
                    None
                }
                Err(e) => Some(Err(e)),
            };
        }
        None
    }
}

// =============================================================================
// In-memory sink
// =============================================================================

/// Cloneable in-memory stream; every clone appends to the same buffer.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.bytes.lock()).into_owned()
    }

    /// Parse everything written so far.
    pub fn records(&self) -> Result<Vec<Record>> {
        let text = self.contents();
        EntryReader::new(text.as_bytes()).collect()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.bytes.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::MessageEntry;
    use crate::error::Error;
    use assert_matches::assert_matches;

    fn holder(message: &str) -> TransferEntryHolder {
        TransferEntryHolder::new("10.0.0.1".into(), MessageEntry::new(message).into())
    }

    #[test]
    fn test_writer_frames_session() {
        let sink = SharedBuffer::new();
        let mut writer = EntryWriter::bind(Box::new(sink.clone()), 7, "10.0.0.1").unwrap();
        assert_eq!(writer.write_entry(&holder("a")).unwrap(), 1);
        assert_eq!(writer.write_entry(&holder("b")).unwrap(), 2);
        writer.close("ExplicitStopped").unwrap();

        let records = sink.records().unwrap();
        assert_eq!(records.len(), 4);
        assert_matches!(records[0], Record::Start { session_id: 7, .. });
        assert_matches!(&records[2], Record::Entry { id: 2, entry, .. } if entry.message() == Some("b"));
        assert_matches!(&records[3], Record::End { entries: 2, state, .. } if state == "ExplicitStopped");
    }

    #[test]
    fn test_reader_tolerates_truncated_final_line() {
        let sink = SharedBuffer::new();
        let mut writer = EntryWriter::bind(Box::new(sink.clone()), 1, "addr").unwrap();
        writer.write_entry(&holder("kept")).unwrap();
        writer.flush().unwrap();

        let mut text = sink.contents();
        text.push_str(r#"{"record":"entry","id":2,"corr"#);

        let entries: Vec<_> = EntryReader::new(text.as_bytes())
            .entries()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].2.message(), Some("kept"));
    }

    #[test]
    fn test_reader_reports_corrupt_complete_line() {
        let text = "not json\n{\"record\":\"end\"}";
        let mut reader = EntryReader::new(text.as_bytes());
        assert_matches!(reader.next(), Some(Err(Error::Json(_))));
    }

    #[test]
    fn test_unknown_entry_type_in_stream() {
        let line = r#"{"record":"entry","id":1,"correlation":"a","entry":{"type":"ScopeEntry"}}"#;
        let err = Record::from_line(line).unwrap_err();
        assert!(err.to_string().contains("Unknown entry type: ScopeEntry"));
    }
}
