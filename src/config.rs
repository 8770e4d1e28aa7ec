use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Settings for opening a connection.
///
/// `database` is required. SQLite ignores the credentials and session
/// settings, but they are kept so hosts can trace and inspect them like any
/// other connection attribute.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConnectionConfig {
   /// Database path, or `:memory:`.
   pub database: String,
   pub username: Option<String>,
   pub password: Option<String>,
   pub schema: Option<String>,
   pub timezone: Option<String>,
}

impl ConnectionConfig {
   pub fn new(database: impl Into<String>) -> Self {
      Self {
         database: database.into(),
         ..Default::default()
      }
   }

   pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
      self.username = Some(username.into());
      self.password = Some(password.into());
      self
   }

   pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
      self.schema = Some(schema.into());
      self
   }

   pub fn with_timezone(mut self, timezone: impl Into<String>) -> Self {
      self.timezone = Some(timezone.into());
      self
   }

   pub fn validate(&self) -> Result<()> {
      if self.database.trim().is_empty() {
         return Err(Error::InvalidConfig("missing database argument".into()));
      }
      Ok(())
   }

   pub fn is_in_memory(&self) -> bool {
      self.database == ":memory:" || self.database.starts_with("file::memory:")
   }
}

impl fmt::Debug for ConnectionConfig {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.debug_struct("ConnectionConfig")
         .field("database", &self.database)
         .field("username", &self.username)
         .field("password", &self.password.as_ref().map(|_| "********"))
         .field("schema", &self.schema)
         .field("timezone", &self.timezone)
         .finish()
   }
}

/// Log verbosity for the process-wide subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
   Error,
   #[default]
   Warn,
   Info,
   Debug,
   Trace,
   /// Install no subscriber.
   None,
}

impl LogLevel {
   /// Filter directive for this crate and the handle engine.
   pub fn directive(self) -> Option<String> {
      let level = match self {
         LogLevel::Error => "error",
         LogLevel::Warn => "warn",
         LogLevel::Info => "info",
         LogLevel::Debug => "debug",
         LogLevel::Trace => "trace",
         LogLevel::None => return None,
      };
      Some(format!("sqlite_handles={level},native_handle_rc={level}"))
   }
}

/// Logging configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
   pub level: LogLevel,
   pub ansi: bool,
}

impl Default for LogConfig {
   fn default() -> Self {
      Self {
         level: LogLevel::default(),
         ansi: true,
      }
   }
}
