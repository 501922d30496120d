//! Preference Model
//!
//! A flat, namespaced property map of boolean flags and integer limits that a
//! monitoring session supplies when it starts. Typed evaluators expose named
//! getters with documented defaults for absent properties.
//!
//! # Wire Format
//!
//! ```json
//! {
//!   "general.stacktrace.enabled": true,
//!   "sql.connection.enabled": true,
//!   "sql.view.data.size": 250
//! }
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A namespaced preference property.
pub trait PreferenceKey {
    fn property_name(&self) -> &'static str;
}

impl PreferenceKey for &'static str {
    fn property_name(&self) -> &'static str {
        *self
    }
}

/// Value of a single preference property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PreferenceValue {
    Bool(bool),
    Int(i64),
}

/// Flat property map owned by a monitoring session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Preferences {
    properties: BTreeMap<String, PreferenceValue>,
}

impl Preferences {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the preferences blob supplied when a session starts.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::InvalidPreferences(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Builder-style flag setter.
    pub fn with_enabled(mut self, key: impl PreferenceKey, enabled: bool) -> Self {
        self.set_enabled(key, enabled);
        self
    }

    /// Builder-style integer setter.
    pub fn with_int(mut self, key: impl PreferenceKey, value: i64) -> Self {
        self.set_int(key, value);
        self
    }

    pub fn set_enabled(&mut self, key: impl PreferenceKey, enabled: bool) {
        self.properties.insert(
            key.property_name().to_string(),
            PreferenceValue::Bool(enabled),
        );
    }

    pub fn set_int(&mut self, key: impl PreferenceKey, value: i64) {
        self.properties
            .insert(key.property_name().to_string(), PreferenceValue::Int(value));
    }

    /// Whether the flag is present and `true`.
    pub fn is_enabled(&self, property: &str) -> bool {
        matches!(self.properties.get(property), Some(PreferenceValue::Bool(true)))
    }

    /// Integer value, if present.
    pub fn int_value(&self, property: &str) -> Option<i64> {
        match self.properties.get(property) {
            Some(PreferenceValue::Int(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Union of two property maps: flags are OR-ed, limits take the maximum.
    pub fn merge(&self, other: &Preferences) -> Preferences {
        let mut merged = self.clone();
        for (key, value) in &other.properties {
            let combined = match (merged.properties.get(key), value) {
                (Some(PreferenceValue::Bool(a)), PreferenceValue::Bool(b)) => {
                    PreferenceValue::Bool(*a || *b)
                }
                (Some(PreferenceValue::Int(a)), PreferenceValue::Int(b)) => {
                    PreferenceValue::Int((*a).max(*b))
                }
                _ => *value,
            };
            merged.properties.insert(key.clone(), combined);
        }
        merged
    }
}

// =============================================================================
// General Preferences
// =============================================================================

/// Properties shared by every interceptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneralPreference {
    /// Record caller stack traces on method call entries.
    StackTraceEnabled,
    /// Restrict logging to explicitly scoped requests.
    ScopeEnabled,
    /// Record general method calls.
    MethodCallEnabled,
}

impl PreferenceKey for GeneralPreference {
    fn property_name(&self) -> &'static str {
        match self {
            GeneralPreference::StackTraceEnabled => "general.stacktrace.enabled",
            GeneralPreference::ScopeEnabled => "general.scope.enabled",
            GeneralPreference::MethodCallEnabled => "general.method.call.enabled",
        }
    }
}

/// Read-only typed view over a session's preferences.
///
/// Absent flags evaluate to `false`.
#[derive(Debug, Clone, Default)]
pub struct GeneralPreferenceEvaluator {
    preferences: Arc<Preferences>,
}

impl GeneralPreferenceEvaluator {
    pub fn new(preferences: Arc<Preferences>) -> Self {
        Self { preferences }
    }

    pub fn preferences(&self) -> &Preferences {
        &self.preferences
    }

    pub fn is_enabled(&self, key: impl PreferenceKey) -> bool {
        self.preferences.is_enabled(key.property_name())
    }

    pub fn int_value(&self, key: impl PreferenceKey) -> Option<i64> {
        self.preferences.int_value(key.property_name())
    }

    pub fn is_stack_trace_enabled(&self) -> bool {
        self.is_enabled(GeneralPreference::StackTraceEnabled)
    }

    pub fn is_logging_scoped_enabled(&self) -> bool {
        self.is_enabled(GeneralPreference::ScopeEnabled)
    }

    pub fn is_method_call_enabled(&self) -> bool {
        self.is_enabled(GeneralPreference::MethodCallEnabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_parse_blob() {
        let prefs = Preferences::from_json(
            r#"{"general.stacktrace.enabled": true, "sql.view.data.size": 250, "general.scope.enabled": false}"#,
        )
        .unwrap();

        assert!(prefs.is_enabled("general.stacktrace.enabled"));
        assert!(!prefs.is_enabled("general.scope.enabled"));
        assert_eq!(prefs.int_value("sql.view.data.size"), Some(250));
        assert_eq!(prefs.int_value("general.stacktrace.enabled"), None);
    }

    #[test]
    fn test_unparseable_blob_is_config_error() {
        assert_matches!(Preferences::from_json("{nope"), Err(Error::InvalidPreferences(_)));
        assert_matches!(
            Preferences::from_json(r#"{"a": "yes"}"#),
            Err(Error::InvalidPreferences(_))
        );
    }

    #[test]
    fn test_evaluator_defaults_to_disabled() {
        let eval = GeneralPreferenceEvaluator::default();
        assert!(!eval.is_stack_trace_enabled());
        assert!(!eval.is_logging_scoped_enabled());
        assert!(!eval.is_method_call_enabled());
    }

    #[test]
    fn test_evaluator_reads_flags() {
        let prefs = Preferences::new()
            .with_enabled(GeneralPreference::StackTraceEnabled, true)
            .with_enabled(GeneralPreference::MethodCallEnabled, true);
        let eval = GeneralPreferenceEvaluator::new(Arc::new(prefs));

        assert!(eval.is_stack_trace_enabled());
        assert!(eval.is_method_call_enabled());
        assert!(!eval.is_logging_scoped_enabled());
    }

    #[test]
    fn test_merge_ors_flags_and_maxes_limits() {
        let a = Preferences::new().with_enabled("x", false).with_int("n", 5);
        let b = Preferences::new().with_enabled("x", true).with_int("n", 3).with_enabled("y", true);
        let merged = a.merge(&b);

        assert!(merged.is_enabled("x"));
        assert!(merged.is_enabled("y"));
        assert_eq!(merged.int_value("n"), Some(5));
    }

    #[test]
    fn test_json_roundtrip() {
        let prefs = Preferences::new().with_enabled("a", true).with_int("b", 1);
        let back = Preferences::from_json(&prefs.to_json().unwrap()).unwrap();
        assert_eq!(back, prefs);
    }
}
