//! Native client library boundary.
//!
//! The wrappers drive these traits and never see a concrete library. Each
//! native object is exclusively owned by one handle, which calls `close`
//! exactly once.

pub use native_handle_rc::NativeError;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::config::ConnectionConfig;

/// Result type for native calls.
pub type NativeResult<T> = std::result::Result<T, NativeError>;

/// One row of column values, in column order.
pub type Row = Vec<JsonValue>;

/// Result set column metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Column {
   pub name: String,
   /// Declared type name as reported by the library.
   pub type_name: String,
}

impl Column {
   pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
      Self {
         name: name.into(),
         type_name: type_name.into(),
      }
   }
}

/// Entry point of a native client library.
pub trait Driver: Send + Sync {
   type Connection: NativeConnection;

   fn open(&self, config: &ConnectionConfig) -> NativeResult<Self::Connection>;
}

pub trait NativeConnection: Send + 'static {
   type Statement: NativeStatement<ResultSet = Self::ResultSet>;
   type PreparedStatement: NativePreparedStatement<ResultSet = Self::ResultSet>;
   type ResultSet: NativeResultSet;

   fn create_statement(&mut self) -> NativeResult<Self::Statement>;

   /// Compiles `sql`. Syntax errors are reported here.
   fn prepare_statement(&mut self, sql: &str) -> NativeResult<Self::PreparedStatement>;

   fn commit(&mut self) -> NativeResult<()>;

   fn rollback(&mut self) -> NativeResult<()>;

   fn set_auto_commit(&mut self, enabled: bool) -> NativeResult<()>;

   fn auto_commit(&mut self) -> NativeResult<bool>;

   fn ping(&mut self) -> NativeResult<()>;

   fn close(&mut self) -> NativeResult<()>;
}

pub trait NativeStatement: Send + 'static {
   type ResultSet: NativeResultSet;

   /// Runs `sql`. Returns `true` when the execution produced a result set.
   fn execute(&mut self, sql: &str) -> NativeResult<bool>;

   /// Rows affected by the last execution, or `-1` if it produced a result
   /// set or nothing has run yet.
   fn update_count(&mut self) -> NativeResult<i64>;

   fn result_set(&mut self) -> NativeResult<Self::ResultSet>;

   fn generated_keys(&mut self) -> NativeResult<Option<Self::ResultSet>>;

   fn close(&mut self) -> NativeResult<()>;
}

pub trait NativePreparedStatement: Send + 'static {
   type ResultSet: NativeResultSet;

   /// Binds `value` to the 1-based parameter `index`.
   fn bind(&mut self, index: usize, value: JsonValue) -> NativeResult<()>;

   fn execute(&mut self) -> NativeResult<bool>;

   fn update_count(&mut self) -> NativeResult<i64>;

   fn result_set(&mut self) -> NativeResult<Self::ResultSet>;

   fn generated_keys(&mut self) -> NativeResult<Option<Self::ResultSet>>;

   fn close(&mut self) -> NativeResult<()>;
}

pub trait NativeResultSet: Send + 'static {
   fn columns(&mut self) -> NativeResult<Vec<Column>>;

   /// Next row, or `None` once exhausted.
   fn next_row(&mut self) -> NativeResult<Option<Row>>;

   fn close(&mut self) -> NativeResult<()>;
}
