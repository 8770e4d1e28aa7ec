//! In-process native client library for lifecycle tests.
//!
//! Every native object gets a name like `statement-3`. Closes are recorded in
//! a shared [`Journal`], and closes can be made to fail or panic per kind.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::{Value as JsonValue, json};
use sqlite_handles::ConnectionConfig;
use sqlite_handles::native::{
   Column, Driver, NativeConnection, NativeError, NativePreparedStatement, NativeResult,
   NativeResultSet, NativeStatement, Row,
};

#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
   fn record(&self, entry: String) {
      self.0.lock().unwrap().push(entry);
   }

   pub fn entries(&self) -> Vec<String> {
      self.0.lock().unwrap().clone()
   }

   /// Names of closed natives, in close order.
   pub fn closed(&self) -> Vec<String> {
      self
         .entries()
         .into_iter()
         .filter_map(|e| e.strip_prefix("close ").map(str::to_string))
         .collect()
   }

   pub fn closes_of(&self, name: &str) -> usize {
      self.closed().iter().filter(|n| *n == name).count()
   }

   pub fn closes_of_kind(&self, kind: &str) -> usize {
      self
         .closed()
         .iter()
         .filter(|n| n.rsplit_once('-').map(|(k, _)| k) == Some(kind))
         .count()
   }

   pub fn close_position(&self, name: &str) -> Option<usize> {
      self.closed().iter().position(|n| n == name)
   }
}

#[derive(Default)]
struct Failures {
   open: Option<i64>,
   close: HashMap<&'static str, i64>,
   panic_on_close: Vec<&'static str>,
}

#[derive(Clone)]
struct Shared {
   journal: Journal,
   failures: Arc<Mutex<Failures>>,
   sequence: Arc<AtomicUsize>,
}

impl Shared {
   fn name(&self, kind: &str) -> String {
      format!("{kind}-{}", self.sequence.fetch_add(1, Ordering::SeqCst) + 1)
   }

   fn close(&self, kind: &'static str, name: &str) -> NativeResult<()> {
      self.journal.record(format!("close {name}"));
      let failures = self.failures.lock().unwrap();
      if failures.panic_on_close.contains(&kind) {
         drop(failures);
         panic!("native library crashed closing {name}");
      }
      match failures.close.get(kind) {
         Some(code) => Err(NativeError::new(*code, format!("{name} refused to close"))),
         None => Ok(()),
      }
   }
}

#[derive(Clone)]
pub struct MockDriver {
   shared: Shared,
}

impl Default for MockDriver {
   fn default() -> Self {
      Self::new()
   }
}

impl MockDriver {
   pub fn new() -> Self {
      Self {
         shared: Shared {
            journal: Journal::default(),
            failures: Arc::default(),
            sequence: Arc::default(),
         },
      }
   }

   pub fn journal(&self) -> Journal {
      self.shared.journal.clone()
   }

   pub fn fail_open(&self, code: i64) {
      self.shared.failures.lock().unwrap().open = Some(code);
   }

   pub fn fail_close(&self, kind: &'static str, code: i64) {
      self.shared.failures.lock().unwrap().close.insert(kind, code);
   }

   pub fn panic_on_close(&self, kind: &'static str) {
      self
         .shared
         .failures
         .lock()
         .unwrap()
         .panic_on_close
         .push(kind);
   }
}

impl Driver for MockDriver {
   type Connection = MockConnection;

   fn open(&self, config: &ConnectionConfig) -> NativeResult<MockConnection> {
      if let Some(code) = self.shared.failures.lock().unwrap().open {
         return Err(NativeError::new(code, format!("cannot reach {}", config.database)));
      }
      let name = self.shared.name("connection");
      self.shared.journal.record(format!("open {name}"));
      Ok(MockConnection {
         shared: self.shared.clone(),
         name,
         auto_commit: true,
         committed: 0,
      })
   }
}

pub struct MockConnection {
   shared: Shared,
   name: String,
   auto_commit: bool,
   committed: usize,
}

impl NativeConnection for MockConnection {
   type Statement = MockStatement;
   type PreparedStatement = MockPreparedStatement;
   type ResultSet = MockResultSet;

   fn create_statement(&mut self) -> NativeResult<MockStatement> {
      Ok(MockStatement {
         name: self.shared.name("statement"),
         shared: self.shared.clone(),
         last: None,
      })
   }

   fn prepare_statement(&mut self, sql: &str) -> NativeResult<MockPreparedStatement> {
      if sql.starts_with("BOGUS") {
         return Err(NativeError::new(1, "syntax error near BOGUS"));
      }
      Ok(MockPreparedStatement {
         name: self.shared.name("prepared statement"),
         shared: self.shared.clone(),
         sql: sql.to_string(),
         params: Vec::new(),
         last: None,
      })
   }

   fn commit(&mut self) -> NativeResult<()> {
      self.committed += 1;
      Ok(())
   }

   fn rollback(&mut self) -> NativeResult<()> {
      Ok(())
   }

   fn set_auto_commit(&mut self, enabled: bool) -> NativeResult<()> {
      self.auto_commit = enabled;
      Ok(())
   }

   fn auto_commit(&mut self) -> NativeResult<bool> {
      Ok(self.auto_commit)
   }

   fn ping(&mut self) -> NativeResult<()> {
      Ok(())
   }

   fn close(&mut self) -> NativeResult<()> {
      self.shared.close("connection", &self.name)
   }
}

enum Outcome {
   Rows(Vec<Row>),
   Update { count: i64, key: Option<i64> },
}

fn run(sql: &str, params: &[JsonValue]) -> NativeResult<Outcome> {
   if sql.starts_with("FAIL") {
      return Err(NativeError::new(42, "statement failed"));
   }
   if sql.starts_with("SELECT") {
      let rows = if params.is_empty() {
         vec![vec![json!(1), json!("one")], vec![json!(2), json!("two")]]
      } else {
         vec![params.to_vec()]
      };
      return Ok(Outcome::Rows(rows));
   }
   let key = sql.starts_with("INSERT").then_some(7);
   Ok(Outcome::Update { count: 1, key })
}

fn mock_columns() -> Vec<Column> {
   vec![Column::new("id", "INTEGER"), Column::new("name", "TEXT")]
}

pub struct MockStatement {
   shared: Shared,
   name: String,
   last: Option<Outcome>,
}

impl MockStatement {
   fn take_rows(&mut self) -> MockResultSet {
      let rows = match self.last.take() {
         Some(Outcome::Rows(rows)) => rows,
         _ => Vec::new(),
      };
      MockResultSet::new(&self.shared, rows)
   }
}

impl NativeStatement for MockStatement {
   type ResultSet = MockResultSet;

   fn execute(&mut self, sql: &str) -> NativeResult<bool> {
      let outcome = run(sql, &[])?;
      let has_rows = matches!(outcome, Outcome::Rows(_));
      self.last = Some(outcome);
      Ok(has_rows)
   }

   fn update_count(&mut self) -> NativeResult<i64> {
      Ok(match &self.last {
         Some(Outcome::Update { count, .. }) => *count,
         _ => -1,
      })
   }

   fn result_set(&mut self) -> NativeResult<MockResultSet> {
      Ok(self.take_rows())
   }

   fn generated_keys(&mut self) -> NativeResult<Option<MockResultSet>> {
      Ok(match &self.last {
         Some(Outcome::Update { key: Some(key), .. }) => {
            Some(MockResultSet::new(&self.shared, vec![vec![json!(key)]]))
         }
         _ => None,
      })
   }

   fn close(&mut self) -> NativeResult<()> {
      self.shared.close("statement", &self.name)
   }
}

pub struct MockPreparedStatement {
   shared: Shared,
   name: String,
   sql: String,
   params: Vec<JsonValue>,
   last: Option<Outcome>,
}

impl NativePreparedStatement for MockPreparedStatement {
   type ResultSet = MockResultSet;

   fn bind(&mut self, index: usize, value: JsonValue) -> NativeResult<()> {
      if self.params.len() < index {
         self.params.resize(index, JsonValue::Null);
      }
      self.params[index - 1] = value;
      Ok(())
   }

   fn execute(&mut self) -> NativeResult<bool> {
      let outcome = run(&self.sql, &self.params)?;
      let has_rows = matches!(outcome, Outcome::Rows(_));
      self.last = Some(outcome);
      Ok(has_rows)
   }

   fn update_count(&mut self) -> NativeResult<i64> {
      Ok(match &self.last {
         Some(Outcome::Update { count, .. }) => *count,
         _ => -1,
      })
   }

   fn result_set(&mut self) -> NativeResult<MockResultSet> {
      let rows = match self.last.take() {
         Some(Outcome::Rows(rows)) => rows,
         _ => Vec::new(),
      };
      Ok(MockResultSet::new(&self.shared, rows))
   }

   fn generated_keys(&mut self) -> NativeResult<Option<MockResultSet>> {
      Ok(match &self.last {
         Some(Outcome::Update { key: Some(key), .. }) => {
            Some(MockResultSet::new(&self.shared, vec![vec![json!(key)]]))
         }
         _ => None,
      })
   }

   fn close(&mut self) -> NativeResult<()> {
      self.shared.close("prepared statement", &self.name)
   }
}

pub struct MockResultSet {
   shared: Shared,
   name: String,
   rows: std::vec::IntoIter<Row>,
   column_reads: usize,
}

impl MockResultSet {
   fn new(shared: &Shared, rows: Vec<Row>) -> Self {
      Self {
         name: shared.name("result set"),
         shared: shared.clone(),
         rows: rows.into_iter(),
         column_reads: 0,
      }
   }
}

impl NativeResultSet for MockResultSet {
   fn columns(&mut self) -> NativeResult<Vec<Column>> {
      self.column_reads += 1;
      self
         .shared
         .journal
         .record(format!("columns {} ({})", self.name, self.column_reads));
      Ok(mock_columns())
   }

   fn next_row(&mut self) -> NativeResult<Option<Row>> {
      Ok(self.rows.next())
   }

   fn close(&mut self) -> NativeResult<()> {
      self.shared.close("result set", &self.name)
   }
}
