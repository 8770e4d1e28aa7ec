//! Worker thread owning one `sqlx` SQLite connection.
//!
//! Callers are synchronous and may themselves be inside a tokio runtime, so
//! the worker runs its own current-thread runtime and all traffic goes over
//! std channels. A caller never blocks inside an async context.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;

use libsqlite3_sys::{sqlite3, sqlite3_get_autocommit};
use serde_json::Value as JsonValue;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqliteStatement};
use sqlx::{Column as _, ConnectOptions, Connection, Executor, Statement as _, TypeInfo};
use tracing::{debug, trace, warn};

use super::decode::decode_row;
use super::native_error;
use super::params::bind_all;
use crate::native::{Column, NativeError, NativeResult, Row};

/// Native code reported when the worker is gone.
pub(crate) const WORKER_CLOSED: i64 = -1;

static NEXT_WORKER_ID: AtomicU64 = AtomicU64::new(1);

/// What one execution produced.
#[derive(Debug, Clone)]
pub(crate) enum Execution {
   Rows {
      columns: Vec<Column>,
      rows: Vec<Row>,
   },
   Update {
      rows_affected: u64,
      last_insert_id: i64,
   },
}

type Reply<T> = Sender<NativeResult<T>>;

enum Command {
   Execute {
      sql: String,
      params: Vec<JsonValue>,
      respond_to: Reply<Execution>,
   },
   Prepare {
      sql: String,
      respond_to: Reply<usize>,
   },
   Commit {
      respond_to: Reply<()>,
   },
   Rollback {
      respond_to: Reply<()>,
   },
   SetAutoCommit {
      enabled: bool,
      respond_to: Reply<()>,
   },
   AutoCommit {
      respond_to: Reply<bool>,
   },
   Ping {
      respond_to: Reply<()>,
   },
   Close {
      respond_to: Reply<()>,
   },
}

/// Sending side of a worker. Cloned into every native statement.
#[derive(Clone)]
pub(crate) struct WorkerLink {
   sender: Sender<Command>,
   id: u64,
}

impl WorkerLink {
   /// Starts a worker and waits until its connection is open.
   pub(crate) fn spawn(options: SqliteConnectOptions) -> NativeResult<Self> {
      let (sender, receiver) = mpsc::channel::<Command>();
      let (ready_tx, ready_rx) = mpsc::channel::<NativeResult<()>>();
      let id = NEXT_WORKER_ID.fetch_add(1, Ordering::Relaxed);

      thread::Builder::new()
         .name(format!("sqlite-native-{id}"))
         .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
               .enable_all()
               .build()
            {
               Ok(runtime) => runtime,
               Err(err) => {
                  let _ = ready_tx.send(Err(NativeError::new(
                     WORKER_CLOSED,
                     format!("failed to start SQLite worker runtime: {err}"),
                  )));
                  return;
               }
            };

            runtime.block_on(async move {
               let conn = match options.connect().await {
                  Ok(conn) => conn,
                  Err(err) => {
                     let _ = ready_tx.send(Err(native_error(&err)));
                     return;
                  }
               };
               let _ = ready_tx.send(Ok(()));
               run_worker(id, conn, receiver).await;
            });
         })
         .map_err(|err| {
            NativeError::new(
               WORKER_CLOSED,
               format!("failed to spawn SQLite worker thread: {err}"),
            )
         })?;

      ready_rx
         .recv()
         .map_err(|_| NativeError::new(WORKER_CLOSED, "SQLite worker exited before connecting"))??;

      debug!(worker = id, "SQLite worker connected");
      Ok(Self { sender, id })
   }

   fn request<T>(&self, build: impl FnOnce(Reply<T>) -> Command) -> NativeResult<T> {
      let (respond_to, response) = mpsc::channel();
      self
         .sender
         .send(build(respond_to))
         .map_err(|_| worker_closed())?;
      response.recv().map_err(|_| worker_closed())?
   }

   pub(crate) fn execute(&self, sql: &str, params: Vec<JsonValue>) -> NativeResult<Execution> {
      let sql = sql.to_string();
      self.request(|respond_to| Command::Execute {
         sql,
         params,
         respond_to,
      })
   }

   /// Compiles `sql` and returns its parameter count.
   pub(crate) fn prepare(&self, sql: &str) -> NativeResult<usize> {
      let sql = sql.to_string();
      self.request(|respond_to| Command::Prepare { sql, respond_to })
   }

   pub(crate) fn commit(&self) -> NativeResult<()> {
      self.request(|respond_to| Command::Commit { respond_to })
   }

   pub(crate) fn rollback(&self) -> NativeResult<()> {
      self.request(|respond_to| Command::Rollback { respond_to })
   }

   pub(crate) fn set_auto_commit(&self, enabled: bool) -> NativeResult<()> {
      self.request(|respond_to| Command::SetAutoCommit {
         enabled,
         respond_to,
      })
   }

   pub(crate) fn auto_commit(&self) -> NativeResult<bool> {
      self.request(|respond_to| Command::AutoCommit { respond_to })
   }

   pub(crate) fn ping(&self) -> NativeResult<()> {
      self.request(|respond_to| Command::Ping { respond_to })
   }

   pub(crate) fn close(&self) -> NativeResult<()> {
      self.request(|respond_to| Command::Close { respond_to })
   }
}

impl fmt::Debug for WorkerLink {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.debug_struct("WorkerLink").field("id", &self.id).finish()
   }
}

fn worker_closed() -> NativeError {
   NativeError::new(WORKER_CLOSED, "SQLite connection is closed")
}

/// Serves commands until `Close` arrives or every link is dropped.
///
/// Whether a transaction is open is always read from SQLite, so `BEGIN` and
/// `COMMIT` issued as plain SQL are respected. The worker only remembers
/// whether auto-commit was switched off; in that mode commit and rollback
/// start the next transaction.
async fn run_worker(id: u64, mut conn: SqliteConnection, receiver: Receiver<Command>) {
   let mut manual = false;

   // The runtime has no other task, so a blocking receive is fine here
   while let Ok(command) = receiver.recv() {
      match command {
         Command::Execute {
            sql,
            params,
            respond_to,
         } => {
            trace!(worker = id, sql = %sql, "execute");
            let _ = respond_to.send(execute(&mut conn, &sql, params).await);
         }
         Command::Prepare { sql, respond_to } => {
            let outcome = (&mut conn)
               .prepare(sql.as_str())
               .await
               .map(|statement| parameter_count(&statement))
               .map_err(|e| native_error(&e));
            let _ = respond_to.send(outcome);
         }
         Command::Commit { respond_to } => {
            let outcome = end_transaction(&mut conn, "COMMIT", manual).await;
            let _ = respond_to.send(outcome);
         }
         Command::Rollback { respond_to } => {
            let outcome = end_transaction(&mut conn, "ROLLBACK", manual).await;
            let _ = respond_to.send(outcome);
         }
         Command::SetAutoCommit {
            enabled,
            respond_to,
         } => {
            let outcome = set_auto_commit(&mut conn, enabled).await;
            if outcome.is_ok() {
               manual = !enabled;
            }
            let _ = respond_to.send(outcome);
         }
         Command::AutoCommit { respond_to } => {
            let outcome = transaction_open(&mut conn).await.map(|open| !open);
            let _ = respond_to.send(outcome);
         }
         Command::Ping { respond_to } => {
            let outcome = conn.ping().await.map_err(|e| native_error(&e));
            let _ = respond_to.send(outcome);
         }
         Command::Close { respond_to } => {
            if let Err(err) = rollback_open_transaction(&mut conn).await {
               warn!(worker = id, "rollback before close failed: {}", err);
            }
            let outcome = conn.close().await.map_err(|e| native_error(&e));
            debug!(worker = id, ok = outcome.is_ok(), "SQLite worker closed");
            let _ = respond_to.send(outcome);
            return;
         }
      }
   }

   debug!(worker = id, "every link dropped, SQLite worker exiting");
}

async fn run(conn: &mut SqliteConnection, sql: &str) -> NativeResult<()> {
   sqlx::query(sql)
      .execute(&mut *conn)
      .await
      .map(|_| ())
      .map_err(|e| native_error(&e))
}

/// Whether SQLite has a transaction open on `conn`.
async fn transaction_open(conn: &mut SqliteConnection) -> NativeResult<bool> {
   let mut handle = conn.lock_handle().await.map_err(|e| native_error(&e))?;
   let db: *mut sqlite3 = handle.as_raw_handle().as_ptr();

   // SAFETY: db is valid while the handle lock is held, and
   // sqlite3_get_autocommit only reads connection state.
   let auto_commit = unsafe { sqlite3_get_autocommit(db) };
   Ok(auto_commit == 0)
}

/// Ends the open transaction, if any, with `sql`. In manual mode the next
/// transaction is started right away.
async fn end_transaction(conn: &mut SqliteConnection, sql: &str, manual: bool) -> NativeResult<()> {
   if transaction_open(conn).await? {
      run(conn, sql).await?;
   }
   if manual {
      run(conn, "BEGIN").await?;
   }
   Ok(())
}

async fn set_auto_commit(conn: &mut SqliteConnection, enabled: bool) -> NativeResult<()> {
   match (enabled, transaction_open(conn).await?) {
      (false, false) => run(conn, "BEGIN").await,
      // Turning auto-commit back on commits the open transaction
      (true, true) => run(conn, "COMMIT").await,
      _ => Ok(()),
   }
}

async fn rollback_open_transaction(conn: &mut SqliteConnection) -> NativeResult<()> {
   if transaction_open(conn).await? {
      run(conn, "ROLLBACK").await?;
   }
   Ok(())
}

fn parameter_count(statement: &SqliteStatement<'_>) -> usize {
   statement
      .parameters()
      .map(|parameters| parameters.either(|types| types.len(), |count| count))
      .unwrap_or(0)
}

async fn execute(conn: &mut SqliteConnection, sql: &str, params: Vec<JsonValue>) -> NativeResult<Execution> {
   let described = (&mut *conn).prepare(sql).await.map_err(|e| native_error(&e))?;
   let columns: Vec<Column> = described
      .columns()
      .iter()
      .map(|column| Column::new(column.name(), column.type_info().name()))
      .collect();

   let query = bind_all(sqlx::query(sql), params);

   if columns.is_empty() {
      let done = query.execute(&mut *conn).await.map_err(|e| native_error(&e))?;
      return Ok(Execution::Update {
         rows_affected: done.rows_affected(),
         last_insert_id: done.last_insert_rowid(),
      });
   }

   let rows = query
      .fetch_all(&mut *conn)
      .await
      .map_err(|e| native_error(&e))?
      .iter()
      .map(decode_row)
      .collect::<NativeResult<Vec<Row>>>()?;

   Ok(Execution::Rows { columns, rows })
}
