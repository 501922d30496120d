//! SQL preferences

use std::ops::Deref;
use std::sync::Arc;

use crate::preference::{GeneralPreferenceEvaluator, PreferenceKey, Preferences};

/// Rows shown per result set when `sql.view.data.size` is absent.
pub const DEFAULT_MAX_DATA_SIZE: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlPreference {
    ConnectionEnabled,
    ConnectionMethodCallEnabled,
    PreparedStatementEnabled,
    PreparedStatementMethodCallEnabled,
    ViewSqlEnabled,
    ResultSetEnabled,
    ResultSetMethodCallEnabled,
    ViewDataSize,
}

impl PreferenceKey for SqlPreference {
    fn property_name(&self) -> &'static str {
        match self {
            SqlPreference::ConnectionEnabled => "sql.connection.enabled",
            SqlPreference::ConnectionMethodCallEnabled => "sql.connection.method.call.enabled",
            SqlPreference::PreparedStatementEnabled => "sql.prepared.statement.enabled",
            SqlPreference::PreparedStatementMethodCallEnabled => {
                "sql.prepared.statement.method.call.enabled"
            }
            SqlPreference::ViewSqlEnabled => "sql.view.sql.enabled",
            SqlPreference::ResultSetEnabled => "sql.resultset.enabled",
            SqlPreference::ResultSetMethodCallEnabled => "sql.resultset.method.call.enabled",
            SqlPreference::ViewDataSize => "sql.view.data.size",
        }
    }
}

/// General evaluator plus the SQL getters.
#[derive(Debug, Clone, Default)]
pub struct SqlPreferenceEvaluator {
    general: GeneralPreferenceEvaluator,
}

impl SqlPreferenceEvaluator {
    pub fn new(preferences: Arc<Preferences>) -> Self {
        Self {
            general: GeneralPreferenceEvaluator::new(preferences),
        }
    }

    pub fn is_connection_enabled(&self) -> bool {
        self.is_enabled(SqlPreference::ConnectionEnabled)
    }

    pub fn is_connection_method_call_enabled(&self) -> bool {
        self.is_enabled(SqlPreference::ConnectionMethodCallEnabled)
    }

    pub fn is_prepared_statement_enabled(&self) -> bool {
        self.is_enabled(SqlPreference::PreparedStatementEnabled)
    }

    pub fn is_prepared_statement_method_call_enabled(&self) -> bool {
        self.is_enabled(SqlPreference::PreparedStatementMethodCallEnabled)
    }

    pub fn is_view_sql_enabled(&self) -> bool {
        self.is_enabled(SqlPreference::ViewSqlEnabled)
    }

    pub fn is_result_set_enabled(&self) -> bool {
        self.is_enabled(SqlPreference::ResultSetEnabled)
    }

    pub fn is_result_set_method_call_enabled(&self) -> bool {
        self.is_enabled(SqlPreference::ResultSetMethodCallEnabled)
    }

    /// Maximum result set rows to record; negative values count as zero.
    pub fn max_data_size(&self) -> usize {
        match self.int_value(SqlPreference::ViewDataSize) {
            Some(size) => usize::try_from(size).unwrap_or(0),
            None => DEFAULT_MAX_DATA_SIZE,
        }
    }
}

impl Deref for SqlPreferenceEvaluator {
    type Target = GeneralPreferenceEvaluator;

    fn deref(&self) -> &Self::Target {
        &self.general
    }
}

impl From<GeneralPreferenceEvaluator> for SqlPreferenceEvaluator {
    fn from(general: GeneralPreferenceEvaluator) -> Self {
        Self { general }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preference::GeneralPreference;

    #[test]
    fn test_defaults() {
        let eval = SqlPreferenceEvaluator::default();
        assert!(!eval.is_connection_enabled());
        assert!(!eval.is_view_sql_enabled());
        assert_eq!(eval.max_data_size(), DEFAULT_MAX_DATA_SIZE);
    }

    #[test]
    fn test_reads_sql_and_general_flags() {
        let prefs = Preferences::new()
            .with_enabled(SqlPreference::PreparedStatementEnabled, true)
            .with_enabled(SqlPreference::ResultSetEnabled, true)
            .with_enabled(GeneralPreference::StackTraceEnabled, true)
            .with_int(SqlPreference::ViewDataSize, 5);
        let eval = SqlPreferenceEvaluator::new(Arc::new(prefs));

        assert!(eval.is_prepared_statement_enabled());
        assert!(!eval.is_prepared_statement_method_call_enabled());
        assert!(eval.is_result_set_enabled());
        assert!(!eval.is_result_set_method_call_enabled());
        assert!(eval.is_stack_trace_enabled());
        assert_eq!(eval.max_data_size(), 5);
    }

    #[test]
    fn test_negative_data_size() {
        let prefs = Preferences::new().with_int(SqlPreference::ViewDataSize, -3);
        assert_eq!(SqlPreferenceEvaluator::new(Arc::new(prefs)).max_data_size(), 0);
    }
}
