//! Captured failures and stack frames

use std::backtrace::Backtrace;
use std::error::Error as StdError;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Upper bound on captured cause depth.
const MAX_CAUSE_DEPTH: usize = 64;

/// Frames from these modules belong to the capture machinery itself.
const INTERNAL_FRAME_PREFIXES: &[&str] = &[
    "std::backtrace",
    "std::rt::",
    "core::ops::function",
    "ctxlog::entry::throwable",
];

/// One stack frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackTraceElementEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    pub method_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_number: Option<u32>,
}

impl StackTraceElementEntry {
    pub fn new(
        class_name: Option<String>,
        method_name: impl Into<String>,
        file_name: Option<String>,
        line_number: Option<u32>,
    ) -> Self {
        Self {
            class_name,
            method_name: method_name.into(),
            file_name,
            line_number,
        }
    }

    /// Build a frame from a symbol path such as `crate::module::function`.
    pub fn from_symbol(symbol: &str) -> Self {
        let symbol = strip_hash_suffix(symbol.trim());
        match symbol.rsplit_once("::") {
            Some((owner, method)) => Self::new(Some(owner.to_string()), method, None, None),
            None => Self::new(None, symbol, None, None),
        }
    }

    /// Capture the calling thread's stack, excluding capture machinery.
    ///
    /// Frames are resolved eagerly; only call when the stack-trace preference
    /// is enabled.
    pub fn capture_current() -> Vec<Self> {
        let backtrace = Backtrace::force_capture();
        parse_backtrace(&backtrace.to_string())
    }
}

impl fmt::Display for StackTraceElementEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(owner) = &self.class_name {
            write!(f, "{}::", owner)?;
        }
        write!(f, "{}", self.method_name)?;
        match (&self.file_name, self.line_number) {
            (Some(file), Some(line)) => write!(f, " ({}:{})", file, line),
            (Some(file), None) => write!(f, " ({})", file),
            _ => Ok(()),
        }
    }
}

/// Parse the `Display` output of [`std::backtrace::Backtrace`].
pub fn parse_backtrace(text: &str) -> Vec<StackTraceElementEntry> {
    let mut frames: Vec<StackTraceElementEntry> = Vec::new();
    let mut skipping = false;

    for line in text.lines() {
        let line = line.trim();

        if let Some(location) = line.strip_prefix("at ") {
            if skipping {
                continue;
            }
            if let Some(frame) = frames.last_mut() {
                let (file, line_number) = split_location(location);
                frame.file_name = Some(file.to_string());
                frame.line_number = line_number;
            }
            continue;
        }

        let Some((index, symbol)) = line.split_once(": ") else {
            continue;
        };
        if index.is_empty() || !index.chars().all(|c| c.is_ascii_digit()) {
            continue;
        }

        skipping = INTERNAL_FRAME_PREFIXES
            .iter()
            .any(|prefix| symbol.starts_with(prefix));
        if !skipping {
            frames.push(StackTraceElementEntry::from_symbol(symbol));
        }
    }

    frames
}

/// Split `path/file.rs:LINE:COL` into the file and line.
fn split_location(location: &str) -> (&str, Option<u32>) {
    let mut parts = location.rsplitn(3, ':');
    let (col, line, file) = (parts.next(), parts.next(), parts.next());

    match (file, line, col) {
        (Some(file), Some(line), Some(_)) => (file, line.parse().ok()),
        _ => (location, None),
    }
}

/// Drop a trailing `::h0123456789abcdef` symbol hash.
fn strip_hash_suffix(symbol: &str) -> &str {
    match symbol.rsplit_once("::h") {
        Some((head, hash)) if hash.len() == 16 && hash.chars().all(|c| c.is_ascii_hexdigit()) => {
            head
        }
        _ => symbol,
    }
}

/// A failure captured by value, with its cause chain.
///
/// The chain is copied out of the live error at capture time; no reference
/// to the live error is kept, so the structure is finite and acyclic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThrowableEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stack_trace: Vec<StackTraceElementEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<Box<ThrowableEntry>>,
}

impl ThrowableEntry {
    /// Capture an error and its `source()` chain.
    pub fn capture(error: &(dyn StdError + 'static)) -> Self {
        let mut chain: Vec<String> = Vec::new();
        let mut current: Option<&(dyn StdError + 'static)> = Some(error);

        while let Some(err) = current {
            if chain.len() == MAX_CAUSE_DEPTH {
                break;
            }
            chain.push(err.to_string());
            current = err.source();
        }

        let mut entry: Option<ThrowableEntry> = None;
        for message in chain.into_iter().rev() {
            entry = Some(ThrowableEntry {
                type_name: None,
                message: Some(message),
                stack_trace: Vec::new(),
                cause: entry.map(Box::new),
            });
        }
        entry.unwrap_or_default()
    }

    /// Capture an error of a statically known type, recording its type name.
    pub fn capture_typed<E: StdError + 'static>(error: &E) -> Self {
        let mut entry = Self::capture(error);
        entry.type_name = Some(std::any::type_name::<E>().to_string());
        entry
    }

    /// Attach stack frames to this level of the chain.
    pub fn with_stack_trace(mut self, frames: Vec<StackTraceElementEntry>) -> Self {
        self.stack_trace = frames;
        self
    }

    /// Iterate over the causes below this entry, nearest first.
    pub fn causes(&self) -> impl Iterator<Item = &ThrowableEntry> {
        std::iter::successors(self.cause.as_deref(), |e| e.cause.as_deref())
    }

    /// Number of nested causes.
    pub fn cause_depth(&self) -> usize {
        self.causes().count()
    }

    /// The innermost failure.
    pub fn root_cause(&self) -> &ThrowableEntry {
        self.causes().last().unwrap_or(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Layer {
        message: &'static str,
        source: Option<Box<Layer>>,
    }

    impl fmt::Display for Layer {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}", self.message)
        }
    }

    impl StdError for Layer {
        fn source(&self) -> Option<&(dyn StdError + 'static)> {
            self.source.as_deref().map(|s| s as &(dyn StdError + 'static))
        }
    }

    fn chain(messages: &[&'static str]) -> Layer {
        let mut layer: Option<Layer> = None;
        for message in messages.iter().rev() {
            layer = Some(Layer {
                message: *message,
                source: layer.map(Box::new),
            });
        }
        layer.unwrap()
    }

    #[test]
    fn test_three_deep_cause_chain() {
        let error = chain(&["query failed", "connection reset", "socket closed", "timeout"]);
        let entry = ThrowableEntry::capture_typed(&error);

        assert_eq!(entry.message.as_deref(), Some("query failed"));
        assert!(entry.type_name.as_deref().unwrap().ends_with("Layer"));
        assert_eq!(entry.cause_depth(), 3);

        let messages: Vec<_> = entry
            .causes()
            .map(|c| c.message.clone().unwrap())
            .collect();
        assert_eq!(messages, vec!["connection reset", "socket closed", "timeout"]);
        assert!(entry.root_cause().cause.is_none());
    }

    #[test]
    fn test_error_without_source() {
        let error = std::io::Error::new(std::io::ErrorKind::Other, "disk gone");
        let entry = ThrowableEntry::capture(&error);
        assert_eq!(entry.message.as_deref(), Some("disk gone"));
        assert_eq!(entry.cause_depth(), 0);
    }

    #[test]
    fn test_parse_backtrace() {
        let text = "   0: std::backtrace::Backtrace::force_capture\n             at /rustc/abc/library/std/src/backtrace.rs:312:13\n   1: app::db::Repository::load::h0123456789abcdef\n             at ./src/db.rs:42:9\n   2: main\n";
        let frames = parse_backtrace(text);

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].class_name.as_deref(), Some("app::db::Repository"));
        assert_eq!(frames[0].method_name, "load");
        assert_eq!(frames[0].file_name.as_deref(), Some("./src/db.rs"));
        assert_eq!(frames[0].line_number, Some(42));
        assert_eq!(frames[1].method_name, "main");
        assert_eq!(frames[1].class_name, None);
        assert_eq!(frames[0].to_string(), "app::db::Repository::load (./src/db.rs:42)");
    }

    #[test]
    fn test_capture_current_does_not_panic() {
        let frames = StackTraceElementEntry::capture_current();
        assert!(frames.iter().all(|f| !f.method_name.is_empty()));
    }
}
