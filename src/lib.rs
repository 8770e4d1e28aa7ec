//! # sqlite-handles
//!
//! Connection, statement, prepared statement and result set objects whose
//! native resources are closed exactly once, in a safe order, however the
//! owning host releases them.
//!
//! ## Core Types
//!
//! - **[`Connection`]**: Root handle; creates statements and prepared statements
//! - **[`Statement`]** / **[`PreparedStatement`]**: Children of a connection
//! - **[`ResultSet`]**: Child of a statement, with cached columns and rows
//! - **[`SqliteDriver`]**: Native client library over `sqlx`'s SQLite driver
//! - **[`native`]**: Traits a native client library implements
//!
//! ## Lifetime Rules
//!
//! - A child keeps its parent's native resource open until the child is
//!   finished, dropped, or finalized by the host
//! - Every wrapper releases its reference exactly once, however many of
//!   `finish`/`disconnect`, [`Finalize::finalize`] and `Drop` run
//! - Close failures are returned from explicit calls and logged otherwise
//! - [`CloseStrategy::Lenient`] closes the native resource on explicit close
//!   even while children are live
//!
//! ## Usage
//!
//! ```no_run
//! use sqlite_handles::{Connection, ConnectionConfig, SqliteDriver};
//!
//! fn main() -> sqlite_handles::Result<()> {
//!    let conn = Connection::connect(&SqliteDriver::new(), ConnectionConfig::new("app.db"))?;
//!
//!    let insert = conn.prepare("INSERT INTO users (name) VALUES (?)")?;
//!    insert.bind_param(1, "Alice")?;
//!    insert.execute()?;
//!
//!    let stmt = conn.statement()?;
//!    if stmt.execute("SELECT id, name FROM users")? {
//!       for row in stmt.results()?.rows_as_maps()? {
//!          println!("{row:?}");
//!       }
//!    }
//!
//!    // The native connection closes once `insert` and `stmt` are gone too
//!    conn.disconnect()?;
//!    Ok(())
//! }
//! ```
mod config;
mod connection;
mod error;
pub mod logging;
pub mod native;
mod prepared;
mod results;
pub mod sqlite;
mod statement;

pub use config::{ConnectionConfig, LogConfig, LogLevel};
pub use connection::Connection;
pub use error::{Error, Result};
pub use prepared::PreparedStatement;
pub use results::ResultSet;
pub use sqlite::SqliteDriver;
pub use statement::Statement;

// Re-export the lifecycle types hosts interact with
pub use native_handle_rc::{
   CloseStrategy, FieldVisitor, Finalize, HandleId, HandleState, LifecycleConfig, Panicked,
   ScopePolicy, Trace, protect,
};
