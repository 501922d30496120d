//! Logging decorators for connections and prepared statements

use std::fmt;
use std::sync::Arc;

use chrono::NaiveDateTime;
use tracing::debug;

use super::entry::SqlParameterEntry;
use super::preference::{SqlPreference, SqlPreferenceEvaluator};
use super::{Connection, PreparedStatement, Row, SqlError};
use crate::dispatcher::{CorrelationId, EntryDispatcher};
use crate::entry::{Entry, MessageEntry, ObjectEntry};
use crate::error::Result;
use crate::logger::{method_call_entry, MethodCallLoggerListener, SimpleMethodLoggerListener};
use crate::preference::PreferenceKey;
use crate::proxy::{Interceptor, InterceptorEvent, Method, MethodListener, MethodPattern, Proxy};

const PREPARE_STATEMENT: Method = Method::new("Connection", "prepare_statement", &["&str"]);
const COMMIT: Method = Method::new("Connection", "commit", &[]);
const ROLLBACK: Method = Method::new("Connection", "rollback", &[]);
const CLOSE: Method = Method::new("Connection", "close", &[]);

const SET_INT: Method = Method::new("PreparedStatement", "set_int", &["u32", "i64"]);
const SET_STRING: Method = Method::new("PreparedStatement", "set_string", &["u32", "&str"]);
const SET_BOOL: Method = Method::new("PreparedStatement", "set_bool", &["u32", "bool"]);
const SET_DOUBLE: Method = Method::new("PreparedStatement", "set_double", &["u32", "f64"]);
const SET_TIMESTAMP: Method =
    Method::new("PreparedStatement", "set_timestamp", &["u32", "NaiveDateTime"]);
const SET_NULL: Method = Method::new("PreparedStatement", "set_null", &["u32"]);
const EXECUTE_UPDATE: Method = Method::new("PreparedStatement", "execute_update", &[]);
const EXECUTE_QUERY: Method = Method::new("PreparedStatement", "execute_query", &[]);

// =============================================================================
// Listeners
// =============================================================================

/// Records bind parameter calls as [`SqlParameterEntry`]s.
struct SqlParameterListener {
    dispatcher: Arc<dyn EntryDispatcher>,
    correlation: CorrelationId,
    stack_trace: bool,
}

impl MethodListener for SqlParameterListener {
    fn after_call(&self, event: &InterceptorEvent<'_>) -> Result<()> {
        let call = method_call_entry(event, self.stack_trace);
        let Some(index) = call.object_argument(0).and_then(|arg| arg.to_value::<u32>().ok()) else {
            debug!(method = call.method_name(), "Bind index not readable, parameter not recorded");
            return Ok(());
        };
        self.dispatcher.forward(
            SqlPreference::PreparedStatementEnabled.property_name(),
            &self.correlation,
            SqlParameterEntry::indexed(index, call).into(),
        );
        Ok(())
    }
}

/// Records the executed SQL text with its elapsed time.
struct SqlExecuteListener {
    dispatcher: Arc<dyn EntryDispatcher>,
    correlation: CorrelationId,
    sql: String,
}

impl SqlExecuteListener {
    fn forward(&self, event: &InterceptorEvent<'_>) {
        let entry = MessageEntry::with_elapse_time(self.sql.clone(), event.elapse_time().clone());
        self.dispatcher.forward(
            SqlPreference::ViewSqlEnabled.property_name(),
            &self.correlation,
            entry.into(),
        );
    }
}

impl MethodListener for SqlExecuteListener {
    fn after_call(&self, event: &InterceptorEvent<'_>) -> Result<()> {
        self.forward(event);
        Ok(())
    }

    fn exception_call(&self, event: &InterceptorEvent<'_>) -> Result<()> {
        self.forward(event);
        Ok(())
    }
}

/// Records up to `max_rows` rows of a query result, one message per row.
struct ResultSetListener {
    dispatcher: Arc<dyn EntryDispatcher>,
    correlation: CorrelationId,
    max_rows: usize,
}

impl MethodListener for ResultSetListener {
    fn after_call(&self, event: &InterceptorEvent<'_>) -> Result<()> {
        let Some(rows) = event
            .returned()
            .and_then(|value| value.as_any().downcast_ref::<Vec<Row>>())
        else {
            return Ok(());
        };

        let key = SqlPreference::ResultSetEnabled.property_name();
        for row in rows.iter().take(self.max_rows) {
            let entry = MessageEntry::new(format!("[{}]", row.join(", ")));
            self.dispatcher.forward(key, &self.correlation, entry.into());
        }
        if rows.len() > self.max_rows {
            let entry = MessageEntry::new(format!("... {} more rows", rows.len() - self.max_rows));
            self.dispatcher.forward(key, &self.correlation, entry.into());
        }
        Ok(())
    }
}

// =============================================================================
// Factory
// =============================================================================

/// Wraps connections, and the statements they prepare, in logging proxies.
///
/// Listeners are attached only for enabled preferences.
#[derive(Clone)]
pub struct SqlProxyFactory {
    dispatcher: Arc<dyn EntryDispatcher>,
    correlation: CorrelationId,
    evaluator: SqlPreferenceEvaluator,
}

impl SqlProxyFactory {
    pub fn new(
        dispatcher: Arc<dyn EntryDispatcher>,
        correlation: CorrelationId,
        evaluator: SqlPreferenceEvaluator,
    ) -> Self {
        Self {
            dispatcher,
            correlation,
            evaluator,
        }
    }

    pub fn evaluator(&self) -> &SqlPreferenceEvaluator {
        &self.evaluator
    }

    pub fn connection<C: Connection>(&self, connection: C) -> SqlConnectionProxy<C> {
        let interceptor = Interceptor::new();
        let eval = &self.evaluator;

        if eval.is_connection_method_call_enabled() {
            let listener = MethodCallLoggerListener::new(
                Arc::clone(&self.dispatcher),
                self.correlation.clone(),
                SqlPreference::ConnectionMethodCallEnabled,
            )
            .with_stack_trace(eval.is_stack_trace_enabled());
            interceptor.add_method_listener(MethodPattern::any(), Arc::new(listener));
        } else if eval.is_connection_enabled() {
            let listener = SimpleMethodLoggerListener::new(
                Arc::clone(&self.dispatcher),
                self.correlation.clone(),
                SqlPreference::ConnectionEnabled,
            );
            interceptor.add_method_listener(MethodPattern::any(), Arc::new(listener));
        }

        SqlConnectionProxy {
            inner: Proxy::with_interceptor(connection, interceptor),
            factory: self.clone(),
        }
    }

    pub fn prepared_statement<S: PreparedStatement>(&self, statement: S, sql: &str) -> SqlStatementProxy<S> {
        let interceptor = Interceptor::new();
        let eval = &self.evaluator;

        if eval.is_prepared_statement_enabled() {
            let listener = SqlParameterListener {
                dispatcher: Arc::clone(&self.dispatcher),
                correlation: self.correlation.clone(),
                stack_trace: eval.is_stack_trace_enabled(),
            };
            interceptor.add_method_listener(MethodPattern::prefix("set_"), Arc::new(listener));
        }
        if eval.is_prepared_statement_method_call_enabled() {
            let listener = MethodCallLoggerListener::new(
                Arc::clone(&self.dispatcher),
                self.correlation.clone(),
                SqlPreference::PreparedStatementMethodCallEnabled,
            )
            .with_stack_trace(eval.is_stack_trace_enabled());
            interceptor.add_method_listener(MethodPattern::any(), Arc::new(listener));
        }
        if eval.is_view_sql_enabled() {
            let listener = SqlExecuteListener {
                dispatcher: Arc::clone(&self.dispatcher),
                correlation: self.correlation.clone(),
                sql: sql.to_string(),
            };
            interceptor.add_method_listener(MethodPattern::prefix("execute_"), Arc::new(listener));
        }
        if eval.is_result_set_enabled() {
            let listener = ResultSetListener {
                dispatcher: Arc::clone(&self.dispatcher),
                correlation: self.correlation.clone(),
                max_rows: eval.max_data_size(),
            };
            interceptor.add_method_listener(MethodPattern::exact(EXECUTE_QUERY.name()), Arc::new(listener));
        }
        if eval.is_result_set_method_call_enabled() {
            let listener = MethodCallLoggerListener::new(
                Arc::clone(&self.dispatcher),
                self.correlation.clone(),
                SqlPreference::ResultSetMethodCallEnabled,
            )
            .with_stack_trace(eval.is_stack_trace_enabled());
            interceptor.add_method_listener(MethodPattern::exact(EXECUTE_QUERY.name()), Arc::new(listener));
        }

        SqlStatementProxy {
            inner: Proxy::with_interceptor(statement, interceptor),
            sql: sql.to_string(),
        }
    }
}

impl fmt::Debug for SqlProxyFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlProxyFactory")
            .field("correlation", &self.correlation)
            .field("evaluator", &self.evaluator)
            .finish()
    }
}

// =============================================================================
// Decorators
// =============================================================================

/// Logging decorator of a [`Connection`].
#[derive(Debug)]
pub struct SqlConnectionProxy<C> {
    inner: Proxy<C>,
    factory: SqlProxyFactory,
}

impl<C> SqlConnectionProxy<C> {
    pub fn target(&self) -> &C {
        self.inner.target()
    }

    pub fn into_inner(self) -> C {
        self.inner.into_inner()
    }
}

impl<C: Connection> Connection for SqlConnectionProxy<C> {
    type Statement = SqlStatementProxy<C::Statement>;

    fn prepare_statement(&self, sql: &str) -> std::result::Result<Self::Statement, SqlError> {
        let statement = self.inner.invoke(
            &PREPARE_STATEMENT,
            || vec![ObjectEntry::of(&sql.to_string()).into()],
            |c| c.prepare_statement(sql),
        )?;
        Ok(self.factory.prepared_statement(statement, sql))
    }

    fn commit(&self) -> std::result::Result<(), SqlError> {
        self.inner.invoke(&COMMIT, Vec::new, |c| c.commit())
    }

    fn rollback(&self) -> std::result::Result<(), SqlError> {
        self.inner.invoke(&ROLLBACK, Vec::new, |c| c.rollback())
    }

    fn close(&self) -> std::result::Result<(), SqlError> {
        self.inner.invoke(&CLOSE, Vec::new, |c| c.close())
    }
}

/// Logging decorator of a [`PreparedStatement`].
#[derive(Debug)]
pub struct SqlStatementProxy<S> {
    inner: Proxy<S>,
    sql: String,
}

impl<S> SqlStatementProxy<S> {
    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn target(&self) -> &S {
        self.inner.target()
    }
}

fn bind_args(index: u32, value: ObjectEntry) -> Vec<Entry> {
    vec![ObjectEntry::of(&index).into(), value.into()]
}

impl<S: PreparedStatement> PreparedStatement for SqlStatementProxy<S> {
    fn set_int(&self, index: u32, value: i64) -> std::result::Result<(), SqlError> {
        self.inner.invoke(
            &SET_INT,
            || bind_args(index, ObjectEntry::of(&value)),
            |s| s.set_int(index, value),
        )
    }

    fn set_string(&self, index: u32, value: &str) -> std::result::Result<(), SqlError> {
        self.inner.invoke(
            &SET_STRING,
            || bind_args(index, ObjectEntry::of(&value.to_string())),
            |s| s.set_string(index, value),
        )
    }

    fn set_bool(&self, index: u32, value: bool) -> std::result::Result<(), SqlError> {
        self.inner.invoke(
            &SET_BOOL,
            || bind_args(index, ObjectEntry::of(&value)),
            |s| s.set_bool(index, value),
        )
    }

    fn set_double(&self, index: u32, value: f64) -> std::result::Result<(), SqlError> {
        self.inner.invoke(
            &SET_DOUBLE,
            || bind_args(index, ObjectEntry::of(&value)),
            |s| s.set_double(index, value),
        )
    }

    fn set_timestamp(&self, index: u32, value: NaiveDateTime) -> std::result::Result<(), SqlError> {
        self.inner.invoke(
            &SET_TIMESTAMP,
            || bind_args(index, ObjectEntry::of(&value)),
            |s| s.set_timestamp(index, value),
        )
    }

    fn set_null(&self, index: u32) -> std::result::Result<(), SqlError> {
        self.inner.invoke(
            &SET_NULL,
            || bind_args(index, ObjectEntry::null()),
            |s| s.set_null(index),
        )
    }

    fn execute_update(&self) -> std::result::Result<u64, SqlError> {
        self.inner.invoke(&EXECUTE_UPDATE, Vec::new, |s| s.execute_update())
    }

    fn execute_query(&self) -> std::result::Result<Vec<Row>, SqlError> {
        self.inner.invoke(&EXECUTE_QUERY, Vec::new, |s| s.execute_query())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::InMemoryEntryDispatcher;
    use crate::entry::ElapseTimeEntry;
    use crate::proxy::CallOutcome;

    #[test]
    fn test_parameter_needs_readable_index() {
        let dispatcher = Arc::new(InMemoryEntryDispatcher::new());
        let listener = SqlParameterListener {
            dispatcher: dispatcher.clone(),
            correlation: "10.0.0.1".into(),
            stack_trace: false,
        };
        let method = SET_INT;
        let elapse = ElapseTimeEntry::new();
        let fire = |arguments: &dyn Fn() -> Vec<Entry>| {
            let event =
                InterceptorEvent::new("Statement", &method, arguments, &elapse, CallOutcome::Returned(&()));
            listener.after_call(&event).unwrap();
        };

        let text_index = || -> Vec<Entry> {
            vec![ObjectEntry::of(&"first".to_string()).into(), ObjectEntry::of(&7i64).into()]
        };
        let wide_index = || -> Vec<Entry> {
            vec![ObjectEntry::of(&3i64).into(), ObjectEntry::of(&7i64).into()]
        };
        let no_index = || -> Vec<Entry> { Vec::new() };
        fire(&text_index);
        fire(&wide_index);
        fire(&no_index);
        assert!(dispatcher.is_empty());

        let bound = || bind_args(3, ObjectEntry::of(&7i64));
        fire(&bound);
        let entries = dispatcher.entries();
        assert_eq!(entries.len(), 1);
        match &entries[0] {
            Entry::SqlParameter(param) => assert_eq!(param.index, Some(3)),
            other => panic!("unexpected entry {:?}", other),
        }
    }
}
