//! Listener hooks and the event passed to them

use std::error::Error as StdError;

use crate::entry::{Captured, ElapseTimeEntry, Entry, MethodSignature};
use crate::error::Result;

/// Static description of an interceptable method.
///
/// Decorators declare one `const` per method of the wrapped capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Method {
    declaring_type: &'static str,
    name: &'static str,
    parameter_types: &'static [&'static str],
}

impl Method {
    pub const fn new(
        declaring_type: &'static str,
        name: &'static str,
        parameter_types: &'static [&'static str],
    ) -> Self {
        Self {
            declaring_type,
            name,
            parameter_types,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn declaring_type(&self) -> &'static str {
        self.declaring_type
    }

    pub fn parameter_types(&self) -> &'static [&'static str] {
        self.parameter_types
    }

    /// Owned signature for entries.
    pub fn signature(&self) -> MethodSignature {
        MethodSignature::new(
            self.declaring_type,
            self.name,
            self.parameter_types.iter().map(|t| t.to_string()).collect(),
        )
    }
}

/// Outcome of the intercepted call as seen by a hook.
#[derive(Clone, Copy)]
pub enum CallOutcome<'a> {
    /// The call has not been forwarded yet.
    Pending,
    /// The call returned normally.
    Returned(&'a dyn Captured),
    /// The call failed.
    Failed {
        error: &'a (dyn StdError + 'static),
        type_name: &'static str,
    },
}

/// Everything a hook may inspect about one intercepted invocation.
pub struct InterceptorEvent<'a> {
    target_type: &'static str,
    method: &'a Method,
    arguments: &'a dyn Fn() -> Vec<Entry>,
    elapse_time: &'a ElapseTimeEntry,
    outcome: CallOutcome<'a>,
}

impl<'a> InterceptorEvent<'a> {
    pub(crate) fn new(
        target_type: &'static str,
        method: &'a Method,
        arguments: &'a dyn Fn() -> Vec<Entry>,
        elapse_time: &'a ElapseTimeEntry,
        outcome: CallOutcome<'a>,
    ) -> Self {
        Self {
            target_type,
            method,
            arguments,
            elapse_time,
            outcome,
        }
    }

    pub fn method(&self) -> &Method {
        self.method
    }

    /// Rust type name of the wrapped target.
    pub fn target_type(&self) -> &'static str {
        self.target_type
    }

    /// Build the argument entries. Each call converts the arguments anew.
    pub fn arguments(&self) -> Vec<Entry> {
        (self.arguments)()
    }

    /// Timing of the forwarded call; not started during `before_call`.
    pub fn elapse_time(&self) -> &ElapseTimeEntry {
        self.elapse_time
    }

    pub fn outcome(&self) -> CallOutcome<'a> {
        self.outcome
    }

    pub fn returned(&self) -> Option<&'a dyn Captured> {
        match self.outcome {
            CallOutcome::Returned(value) => Some(value),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&'a (dyn StdError + 'static)> {
        match self.outcome {
            CallOutcome::Failed { error, .. } => Some(error),
            _ => None,
        }
    }

    /// Rust type name of the failure, if the call failed.
    pub fn error_type_name(&self) -> Option<&'static str> {
        match self.outcome {
            CallOutcome::Failed { type_name, .. } => Some(type_name),
            _ => None,
        }
    }
}

/// Receives lifecycle notifications for intercepted calls.
///
/// Hooks must not affect the intercepted call. A returned error or a panic is
/// logged and suppressed by the interceptor.
pub trait MethodListener: Send + Sync {
    /// Name used in diagnostics.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    fn before_call(&self, _event: &InterceptorEvent<'_>) -> Result<()> {
        Ok(())
    }

    fn after_call(&self, _event: &InterceptorEvent<'_>) -> Result<()> {
        Ok(())
    }

    fn exception_call(&self, _event: &InterceptorEvent<'_>) -> Result<()> {
        Ok(())
    }
}
