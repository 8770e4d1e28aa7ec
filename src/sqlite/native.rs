use std::vec;

use serde_json::{Value as JsonValue, json};

use super::worker::{Execution, WorkerLink};
use crate::native::{
   Column, NativeConnection, NativeError, NativePreparedStatement, NativeResult,
   NativeResultSet, NativeStatement, Row,
};

/// SQLITE_RANGE
const BAD_PARAMETER_INDEX: i64 = 25;

/// Native SQLite connection: the link to its worker thread.
#[derive(Debug)]
pub struct SqliteNativeConnection {
   link: WorkerLink,
}

impl SqliteNativeConnection {
   pub(crate) fn new(link: WorkerLink) -> Self {
      Self { link }
   }
}

impl NativeConnection for SqliteNativeConnection {
   type Statement = SqliteNativeStatement;
   type PreparedStatement = SqliteNativePreparedStatement;
   type ResultSet = SqliteNativeResultSet;

   fn create_statement(&mut self) -> NativeResult<SqliteNativeStatement> {
      Ok(SqliteNativeStatement {
         link: self.link.clone(),
         last: LastExecution::default(),
      })
   }

   fn prepare_statement(&mut self, sql: &str) -> NativeResult<SqliteNativePreparedStatement> {
      let parameter_count = self.link.prepare(sql)?;
      Ok(SqliteNativePreparedStatement {
         link: self.link.clone(),
         sql: sql.to_string(),
         parameter_count,
         params: Vec::new(),
         last: LastExecution::default(),
      })
   }

   fn commit(&mut self) -> NativeResult<()> {
      self.link.commit()
   }

   fn rollback(&mut self) -> NativeResult<()> {
      self.link.rollback()
   }

   fn set_auto_commit(&mut self, enabled: bool) -> NativeResult<()> {
      self.link.set_auto_commit(enabled)
   }

   fn auto_commit(&mut self) -> NativeResult<bool> {
      self.link.auto_commit()
   }

   fn ping(&mut self) -> NativeResult<()> {
      self.link.ping()
   }

   fn close(&mut self) -> NativeResult<()> {
      self.link.close()
   }
}

/// Outcome of the most recent execution on a statement.
#[derive(Debug, Default)]
struct LastExecution {
   outcome: Option<Execution>,
   inserted: bool,
}

impl LastExecution {
   fn record(&mut self, sql: &str, outcome: Execution) -> bool {
      let has_rows = matches!(outcome, Execution::Rows { .. });
      self.inserted = is_insert(sql);
      self.outcome = Some(outcome);
      has_rows
   }

   fn update_count(&self) -> i64 {
      match &self.outcome {
         Some(Execution::Update { rows_affected, .. }) => {
            i64::try_from(*rows_affected).unwrap_or(i64::MAX)
         }
         _ => -1,
      }
   }

   /// Rows of the last execution. A second call returns an empty set.
   fn take_result_set(&mut self) -> SqliteNativeResultSet {
      match self.outcome.take() {
         Some(Execution::Rows { columns, rows }) => SqliteNativeResultSet::new(columns, rows),
         other => {
            self.outcome = other;
            SqliteNativeResultSet::new(Vec::new(), Vec::new())
         }
      }
   }

   /// SQLite reports one key per insert: the last row id.
   fn generated_keys(&self) -> Option<SqliteNativeResultSet> {
      match &self.outcome {
         Some(Execution::Update {
            rows_affected,
            last_insert_id,
         }) if self.inserted && *rows_affected > 0 => Some(SqliteNativeResultSet::new(
            vec![Column::new("GENERATED_KEY", "INTEGER")],
            vec![vec![json!(last_insert_id)]],
         )),
         _ => None,
      }
   }

   fn clear(&mut self) {
      self.outcome = None;
      self.inserted = false;
   }
}

fn check_parameter_index(index: usize, parameter_count: usize) -> NativeResult<()> {
   if index == 0 || index > parameter_count {
      return Err(NativeError::new(
         BAD_PARAMETER_INDEX,
         format!("parameter index {index} out of range (1..={parameter_count})"),
      ));
   }
   Ok(())
}

fn is_insert(sql: &str) -> bool {
   let keyword: String = sql
      .trim_start()
      .chars()
      .take_while(|c| c.is_ascii_alphabetic())
      .collect();
   keyword.eq_ignore_ascii_case("INSERT") || keyword.eq_ignore_ascii_case("REPLACE")
}

/// Native SQLite statement.
#[derive(Debug)]
pub struct SqliteNativeStatement {
   link: WorkerLink,
   last: LastExecution,
}

impl NativeStatement for SqliteNativeStatement {
   type ResultSet = SqliteNativeResultSet;

   fn execute(&mut self, sql: &str) -> NativeResult<bool> {
      let outcome = self.link.execute(sql, Vec::new())?;
      Ok(self.last.record(sql, outcome))
   }

   fn update_count(&mut self) -> NativeResult<i64> {
      Ok(self.last.update_count())
   }

   fn result_set(&mut self) -> NativeResult<SqliteNativeResultSet> {
      Ok(self.last.take_result_set())
   }

   fn generated_keys(&mut self) -> NativeResult<Option<SqliteNativeResultSet>> {
      Ok(self.last.generated_keys())
   }

   fn close(&mut self) -> NativeResult<()> {
      self.last.clear();
      Ok(())
   }
}

/// Native SQLite prepared statement. Parameters are held here and sent with
/// every execution.
#[derive(Debug)]
pub struct SqliteNativePreparedStatement {
   link: WorkerLink,
   sql: String,
   /// Parameter count reported when the statement was compiled.
   parameter_count: usize,
   params: Vec<JsonValue>,
   last: LastExecution,
}

impl NativePreparedStatement for SqliteNativePreparedStatement {
   type ResultSet = SqliteNativeResultSet;

   fn bind(&mut self, index: usize, value: JsonValue) -> NativeResult<()> {
      check_parameter_index(index, self.parameter_count)?;
      if self.params.len() < index {
         self.params.resize(index, JsonValue::Null);
      }
      self.params[index - 1] = value;
      Ok(())
   }

   fn execute(&mut self) -> NativeResult<bool> {
      let outcome = self.link.execute(&self.sql, self.params.clone())?;
      Ok(self.last.record(&self.sql, outcome))
   }

   fn update_count(&mut self) -> NativeResult<i64> {
      Ok(self.last.update_count())
   }

   fn result_set(&mut self) -> NativeResult<SqliteNativeResultSet> {
      Ok(self.last.take_result_set())
   }

   fn generated_keys(&mut self) -> NativeResult<Option<SqliteNativeResultSet>> {
      Ok(self.last.generated_keys())
   }

   fn close(&mut self) -> NativeResult<()> {
      self.params.clear();
      self.last.clear();
      Ok(())
   }
}

/// Native SQLite result set over rows already fetched by the worker.
#[derive(Debug)]
pub struct SqliteNativeResultSet {
   columns: Vec<Column>,
   rows: vec::IntoIter<Row>,
}

impl SqliteNativeResultSet {
   fn new(columns: Vec<Column>, rows: Vec<Row>) -> Self {
      Self {
         columns,
         rows: rows.into_iter(),
      }
   }
}

impl NativeResultSet for SqliteNativeResultSet {
   fn columns(&mut self) -> NativeResult<Vec<Column>> {
      Ok(self.columns.clone())
   }

   fn next_row(&mut self) -> NativeResult<Option<Row>> {
      Ok(self.rows.next())
   }

   fn close(&mut self) -> NativeResult<()> {
      self.rows = Vec::new().into_iter();
      Ok(())
   }
}
