//! Entry Model
//!
//! An [`Entry`] is one structured diagnostic fact captured from observed
//! code. The set of variants is closed; each variant serializes with a stable
//! `"type"` discriminator that decides how it is rebuilt.
//!
//! # Variants
//!
//! | Discriminator            | Payload                                  |
//! |--------------------------|------------------------------------------|
//! | `MessageEntry`           | free text + optional elapsed time        |
//! | `MethodCallEntry`        | signature, arguments, outcome, timing    |
//! | `SQLParameterEntry`      | method call + bind parameter name/index  |
//! | `ThrowableEntry`         | failure message, frames, cause chain     |
//! | `ObjectEntry`            | converted value snapshot                 |
//! | `ElapseTimeEntry`        | start/stop timestamps                    |
//! | `StackTraceElementEntry` | one stack frame                          |

mod message;
mod method;
mod object;
mod throwable;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

pub use message::{ElapseTimeEntry, MessageEntry};
pub use method::{MethodCallEntry, MethodSignature};
pub use object::{Captured, ObjectEntry};
pub use throwable::{parse_backtrace, StackTraceElementEntry, ThrowableEntry};

use crate::error::{Error, Result};
use crate::sql::SqlParameterEntry;

/// Name of the discriminator field in serialized entries.
pub const TYPE_FIELD: &str = "type";

/// One observable diagnostic fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Entry {
    #[serde(rename = "MessageEntry")]
    Message(MessageEntry),
    #[serde(rename = "MethodCallEntry")]
    MethodCall(MethodCallEntry),
    #[serde(rename = "SQLParameterEntry")]
    SqlParameter(SqlParameterEntry),
    #[serde(rename = "ThrowableEntry")]
    Throwable(ThrowableEntry),
    #[serde(rename = "ObjectEntry")]
    Object(ObjectEntry),
    #[serde(rename = "ElapseTimeEntry")]
    ElapseTime(ElapseTimeEntry),
    #[serde(rename = "StackTraceElementEntry")]
    StackTraceElement(StackTraceElementEntry),
}

/// Discriminator of an [`Entry`] variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryType {
    Message,
    MethodCall,
    SqlParameter,
    Throwable,
    Object,
    ElapseTime,
    StackTraceElement,
}

impl EntryType {
    pub const ALL: [EntryType; 7] = [
        EntryType::Message,
        EntryType::MethodCall,
        EntryType::SqlParameter,
        EntryType::Throwable,
        EntryType::Object,
        EntryType::ElapseTime,
        EntryType::StackTraceElement,
    ];

    /// Serialized discriminator.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::Message => "MessageEntry",
            EntryType::MethodCall => "MethodCallEntry",
            EntryType::SqlParameter => "SQLParameterEntry",
            EntryType::Throwable => "ThrowableEntry",
            EntryType::Object => "ObjectEntry",
            EntryType::ElapseTime => "ElapseTimeEntry",
            EntryType::StackTraceElement => "StackTraceElementEntry",
        }
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EntryType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        EntryType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::UnknownEntryType(s.to_string()))
    }
}

impl Entry {
    pub fn entry_type(&self) -> EntryType {
        match self {
            Entry::Message(_) => EntryType::Message,
            Entry::MethodCall(_) => EntryType::MethodCall,
            Entry::SqlParameter(_) => EntryType::SqlParameter,
            Entry::Throwable(_) => EntryType::Throwable,
            Entry::Object(_) => EntryType::Object,
            Entry::ElapseTime(_) => EntryType::ElapseTime,
            Entry::StackTraceElement(_) => EntryType::StackTraceElement,
        }
    }

    /// Serialized discriminator of this entry.
    pub fn type_name(&self) -> &'static str {
        self.entry_type().as_str()
    }

    /// Human-readable text carried by the entry, if any.
    pub fn message(&self) -> Option<&str> {
        match self {
            Entry::Message(m) => Some(&m.message),
            Entry::Throwable(t) => t.message.as_deref(),
            Entry::Object(o) => o.str_value.as_deref(),
            _ => None,
        }
    }

    /// Method call payload, including the call inside a SQL parameter entry.
    pub fn method_call(&self) -> Option<&MethodCallEntry> {
        match self {
            Entry::MethodCall(call) => Some(call),
            Entry::SqlParameter(param) => Some(&param.call),
            _ => None,
        }
    }

    /// Elapsed time attached to the entry, if any.
    pub fn elapse_time(&self) -> Option<&ElapseTimeEntry> {
        match self {
            Entry::Message(m) => m.elapse_time.as_ref(),
            Entry::ElapseTime(e) => Some(e),
            _ => self.method_call().and_then(|c| c.elapse_time.as_ref()),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Rebuild an entry, rejecting unknown discriminators explicitly.
    pub fn from_json(json: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        Self::from_value(value)
    }

    /// Rebuild an entry from an already parsed JSON value.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let tag = value
            .get(TYPE_FIELD)
            .and_then(|t| t.as_str())
            .ok_or_else(|| Error::UnknownEntryType("<missing>".to_string()))?;

        let expected = EntryType::from_str(tag)?;
        if expected.as_str() != tag {
            return Err(Error::UnknownEntryType(tag.to_string()));
        }

        Ok(serde_json::from_value(value)?)
    }
}

/// Serde adapter for `Entry` fields that rejects unknown discriminators with
/// [`Error::UnknownEntryType`].
pub fn deserialize_checked<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Entry, D::Error> {
    let value = serde_json::Value::deserialize(deserializer)?;
    Entry::from_value(value).map_err(serde::de::Error::custom)
}

impl From<MessageEntry> for Entry {
    fn from(entry: MessageEntry) -> Self {
        Entry::Message(entry)
    }
}

impl From<MethodCallEntry> for Entry {
    fn from(entry: MethodCallEntry) -> Self {
        Entry::MethodCall(entry)
    }
}

impl From<SqlParameterEntry> for Entry {
    fn from(entry: SqlParameterEntry) -> Self {
        Entry::SqlParameter(entry)
    }
}

impl From<ThrowableEntry> for Entry {
    fn from(entry: ThrowableEntry) -> Self {
        Entry::Throwable(entry)
    }
}

impl From<ObjectEntry> for Entry {
    fn from(entry: ObjectEntry) -> Self {
        Entry::Object(entry)
    }
}

impl From<ElapseTimeEntry> for Entry {
    fn from(entry: ElapseTimeEntry) -> Self {
        Entry::ElapseTime(entry)
    }
}

impl From<StackTraceElementEntry> for Entry {
    fn from(entry: StackTraceElementEntry) -> Self {
        Entry::StackTraceElement(entry)
    }
}

// =============================================================================
// Tests
// =============================================================================
