//! Composable predicates over recorded entries

use regex::Regex;

use crate::entry::{Entry, EntryType};
use crate::error::{Error, Result};

/// Predicate evaluated against the entry payload of each record.
pub trait Restriction: Send + Sync {
    fn matches(&self, entry: &Entry) -> bool;
}

impl<F> Restriction for F
where
    F: Fn(&Entry) -> bool + Send + Sync,
{
    fn matches(&self, entry: &Entry) -> bool {
        self(entry)
    }
}

/// Entries of the given variant.
pub fn entry_type(entry_type: EntryType) -> impl Restriction {
    move |e: &Entry| e.entry_type() == entry_type
}

/// Entries whose text contains `needle`.
pub fn message_contains(needle: impl Into<String>) -> impl Restriction {
    let needle = needle.into();
    move |e: &Entry| e.message().map_or(false, |m| m.contains(needle.as_str()))
}

/// Entries whose text matches the regular expression anywhere.
pub fn message_matches(pattern: &str) -> Result<impl Restriction> {
    let regex = Regex::new(pattern).map_err(|e| Error::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })?;
    Ok(move |e: &Entry| e.message().map_or(false, |m| regex.is_match(m)))
}

/// Method call or SQL parameter entries for the named method.
pub fn method_name(name: impl Into<String>) -> impl Restriction {
    let name = name.into();
    move |e: &Entry| e.method_call().map_or(false, |c| c.method_name() == name)
}

/// SQL parameter entries bound at `index`.
pub fn sql_parameter_index(index: u32) -> impl Restriction {
    move |e: &Entry| matches!(e, Entry::SqlParameter(p) if p.index == Some(index))
}

/// Failures: throwable entries and failed method calls.
pub fn has_exception() -> impl Restriction {
    |e: &Entry| match e {
        Entry::Throwable(_) => true,
        other => other.method_call().map_or(false, |c| c.is_failed()),
    }
}

pub fn and(left: impl Restriction, right: impl Restriction) -> impl Restriction {
    move |e: &Entry| left.matches(e) && right.matches(e)
}

pub fn or(left: impl Restriction, right: impl Restriction) -> impl Restriction {
    move |e: &Entry| left.matches(e) || right.matches(e)
}

pub fn not(inner: impl Restriction) -> impl Restriction {
    move |e: &Entry| !inner.matches(e)
}
