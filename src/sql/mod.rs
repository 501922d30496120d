//! SQL Logging
//!
//! Connection and prepared statement capabilities, the entries and
//! preferences specific to them, and the decorators that log their calls.
//!
//! # Preferences
//!
//! | Property                                     | Records                         |
//! |----------------------------------------------|---------------------------------|
//! | `sql.connection.enabled`                     | connection calls as messages    |
//! | `sql.connection.method.call.enabled`         | connection calls in full        |
//! | `sql.prepared.statement.enabled`             | bind parameters                 |
//! | `sql.prepared.statement.method.call.enabled` | statement calls in full         |
//! | `sql.view.sql.enabled`                       | executed SQL with elapsed time  |
//! | `sql.resultset.enabled`                      | query rows, up to the data size |
//! | `sql.resultset.method.call.enabled`          | query calls in full             |
//! | `sql.view.data.size`                         | row limit (default 100)         |

mod entry;
mod preference;
mod proxy;

use std::fmt;

use chrono::NaiveDateTime;
use thiserror::Error;

pub use entry::SqlParameterEntry;
pub use preference::{SqlPreference, SqlPreferenceEvaluator, DEFAULT_MAX_DATA_SIZE};
pub use proxy::{SqlConnectionProxy, SqlProxyFactory, SqlStatementProxy};

/// One result row, rendered column by column.
pub type Row = Vec<String>;

/// Failure reported by a database driver.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} (SQLState {state})")]
pub struct SqlError {
    pub state: String,
    pub message: String,
}

impl SqlError {
    pub fn new(state: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            state: state.into(),
            message: message.into(),
        }
    }
}

/// A precompiled statement with positional bind parameters.
pub trait PreparedStatement: fmt::Debug + Send + Sync + 'static {
    fn set_int(&self, index: u32, value: i64) -> Result<(), SqlError>;
    fn set_string(&self, index: u32, value: &str) -> Result<(), SqlError>;
    fn set_bool(&self, index: u32, value: bool) -> Result<(), SqlError>;
    fn set_double(&self, index: u32, value: f64) -> Result<(), SqlError>;
    fn set_timestamp(&self, index: u32, value: NaiveDateTime) -> Result<(), SqlError>;
    fn set_null(&self, index: u32) -> Result<(), SqlError>;
    /// Run a data-changing statement, returning the affected row count.
    fn execute_update(&self) -> Result<u64, SqlError>;
    fn execute_query(&self) -> Result<Vec<Row>, SqlError>;
}

/// A database session.
pub trait Connection: fmt::Debug + Send + Sync {
    type Statement: PreparedStatement;

    fn prepare_statement(&self, sql: &str) -> Result<Self::Statement, SqlError>;
    fn commit(&self) -> Result<(), SqlError>;
    fn rollback(&self) -> Result<(), SqlError>;
    fn close(&self) -> Result<(), SqlError>;
}
