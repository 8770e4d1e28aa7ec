//! SQLite native client library over `sqlx`.
//!
//! Every native connection owns a worker thread; see [`worker`] for the
//! threading model. Values cross the boundary as `serde_json::Value`.

mod decode;
mod native;
mod params;
mod worker;

use std::fs::create_dir_all;
use std::path::Path;

use native_handle_rc::LifecycleConfig;
use sqlx::sqlite::SqliteConnectOptions;
use tracing::debug;

pub use native::{
   SqliteNativeConnection, SqliteNativePreparedStatement, SqliteNativeResultSet,
   SqliteNativeStatement,
};

use crate::config::ConnectionConfig;
use crate::native::{Driver, NativeError, NativeResult};
use crate::{Connection, Result};

/// Native code for sqlx failures that did not come from SQLite itself.
const NO_NATIVE_CODE: i64 = -1;

/// Opens native SQLite connections.
#[derive(Debug, Clone)]
pub struct SqliteDriver {
   create_if_missing: bool,
}

impl SqliteDriver {
   pub fn new() -> Self {
      Self {
         create_if_missing: true,
      }
   }

   /// Whether a missing database file is created on open. Defaults to `true`.
   /// In-memory databases are always opened.
   pub fn create_if_missing(mut self, create: bool) -> Self {
      self.create_if_missing = create;
      self
   }
}

impl Default for SqliteDriver {
   fn default() -> Self {
      Self::new()
   }
}

impl Driver for SqliteDriver {
   type Connection = SqliteNativeConnection;

   fn open(&self, config: &ConnectionConfig) -> NativeResult<SqliteNativeConnection> {
      if config.username.is_some() || config.schema.is_some() || config.timezone.is_some() {
         debug!(
            database = %config.database,
            "SQLite ignores credentials, schema and timezone"
         );
      }

      // An in-memory database has no file to be missing
      let options = SqliteConnectOptions::new()
         .filename(&config.database)
         .create_if_missing(self.create_if_missing || config.is_in_memory());

      let link = worker::WorkerLink::spawn(options)?;
      Ok(SqliteNativeConnection::new(link))
   }
}

/// Connects to the SQLite database file at `path`, creating its parent
/// directory first.
pub fn open_path(path: impl AsRef<Path>, lifecycle: LifecycleConfig) -> Result<Connection> {
   let path = path.as_ref();
   if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
      create_dir_all(parent)?;
   }

   let config = ConnectionConfig::new(path.to_string_lossy());
   Connection::connect_with(&SqliteDriver::new(), config, lifecycle)
}

/// Translates a sqlx error, keeping SQLite's numeric code when there is one.
pub(crate) fn native_error(err: &sqlx::Error) -> NativeError {
   let code = err
      .as_database_error()
      .and_then(|db_err| db_err.code())
      .and_then(|code| code.parse::<i64>().ok())
      .unwrap_or(NO_NATIVE_CODE);
   NativeError::new(code, err.to_string())
}
