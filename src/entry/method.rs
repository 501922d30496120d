//! Method call entries

use std::fmt;

use serde::{Deserialize, Serialize};

use super::message::ElapseTimeEntry;
use super::object::ObjectEntry;
use super::throwable::{StackTraceElementEntry, ThrowableEntry};
use super::Entry;

/// Name, declaring type and parameter types of an intercepted method.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodSignature {
    pub name: String,
    pub declaring_type: String,
    #[serde(default)]
    pub parameter_types: Vec<String>,
}

impl MethodSignature {
    pub fn new(
        declaring_type: impl Into<String>,
        name: impl Into<String>,
        parameter_types: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            declaring_type: declaring_type.into(),
            parameter_types,
        }
    }
}

impl fmt::Display for MethodSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}({})",
            self.declaring_type,
            self.name,
            self.parameter_types.join(", ")
        )
    }
}

/// One intercepted method call: arguments, outcome and timing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodCallEntry {
    pub signature: MethodSignature,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub arguments: Vec<Entry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub returned_value: Option<Box<Entry>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception: Option<ThrowableEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapse_time: Option<ElapseTimeEntry>,
    /// Stack of the caller, recorded when stack traces are enabled.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub caller_stack_trace: Vec<StackTraceElementEntry>,
}

impl MethodCallEntry {
    pub fn new(signature: MethodSignature) -> Self {
        Self {
            signature,
            arguments: Vec::new(),
            returned_value: None,
            exception: None,
            elapse_time: None,
            caller_stack_trace: Vec::new(),
        }
    }

    pub fn with_arguments(mut self, arguments: Vec<Entry>) -> Self {
        self.arguments = arguments;
        self
    }

    pub fn with_returned_value(mut self, value: impl Into<Entry>) -> Self {
        self.returned_value = Some(Box::new(value.into()));
        self
    }

    pub fn with_exception(mut self, exception: ThrowableEntry) -> Self {
        self.exception = Some(exception);
        self
    }

    pub fn with_elapse_time(mut self, elapse_time: ElapseTimeEntry) -> Self {
        self.elapse_time = Some(elapse_time);
        self
    }

    pub fn with_caller_stack_trace(mut self, frames: Vec<StackTraceElementEntry>) -> Self {
        self.caller_stack_trace = frames;
        self
    }

    pub fn method_name(&self) -> &str {
        &self.signature.name
    }

    /// Argument at `index` if it was captured as an object snapshot.
    pub fn object_argument(&self, index: usize) -> Option<&ObjectEntry> {
        match self.arguments.get(index) {
            Some(Entry::Object(object)) => Some(object),
            _ => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.exception.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_display() {
        let sig = MethodSignature::new(
            "Connection",
            "prepare_statement",
            vec!["&str".to_string()],
        );
        assert_eq!(sig.to_string(), "Connection.prepare_statement(&str)");
    }

    #[test]
    fn test_builder_and_object_argument() {
        let call = MethodCallEntry::new(MethodSignature::new("Repo", "find", vec![]))
            .with_arguments(vec![ObjectEntry::of(&7u32).into()])
            .with_returned_value(ObjectEntry::of(&true));

        assert_eq!(call.method_name(), "find");
        assert_eq!(call.object_argument(0).unwrap().to_value::<u32>().unwrap(), 7);
        assert!(call.object_argument(1).is_none());
        assert!(!call.is_failed());
    }
}
