use std::sync::Arc;

use native_handle_rc::{
   FieldVisitor, Finalize, Finalizer, HandleId, HandleState, LifecycleConfig, Owner, Release,
   Scoped, Trace, run_scoped,
};
use tracing::{debug, info};

use crate::config::ConnectionConfig;
use crate::native::{Driver, NativeConnection};
use crate::prepared::{self, PreparedStatement};
use crate::sqlite::SqliteNativeConnection;
use crate::statement::{self, Statement};
use crate::{Error, Result};

pub(crate) const KIND: &str = "connection";

fn finalizer<C: NativeConnection>() -> Finalizer<C> {
   Finalizer::new(KIND, C::close)
}

/// A database connection.
///
/// Statements and prepared statements created from a connection keep its
/// native connection open until they are finished, whatever order the host
/// releases them in. Share a connection across threads with `Arc`.
pub struct Connection<C: NativeConnection = SqliteNativeConnection> {
   owner: Owner<C>,
   config: ConnectionConfig,
   lifecycle: LifecycleConfig,
}

impl<C: NativeConnection> Connection<C> {
   /// Opens a connection with the default lifecycle settings.
   pub fn connect<D>(driver: &D, config: ConnectionConfig) -> Result<Self>
   where
      D: Driver<Connection = C>,
   {
      Self::connect_with(driver, config, LifecycleConfig::default())
   }

   /// Opens a connection. Children created from it inherit `lifecycle`.
   pub fn connect_with<D>(driver: &D, config: ConnectionConfig, lifecycle: LifecycleConfig) -> Result<Self>
   where
      D: Driver<Connection = C>,
   {
      config.validate()?;

      let native = driver.open(&config).map_err(|e| {
         Error::database(
            &format!("Failed to create database connection ({})", config.database),
            e,
         )
      })?;
      let owner = Owner::root(native, finalizer::<C>(), lifecycle.close_strategy)?;

      info!(handle = %owner.id(), database = %config.database, "connected");
      Ok(Self {
         owner,
         config,
         lifecycle,
      })
   }

   /// Opens a connection and runs `body` with it.
   ///
   /// Whether the connection is released when `body` returns is decided by
   /// `lifecycle.scope_policy`.
   pub fn scoped<D, R>(
      driver: &D,
      config: ConnectionConfig,
      lifecycle: LifecycleConfig,
      body: impl FnOnce(&Arc<Self>) -> R,
   ) -> Result<R>
   where
      D: Driver<Connection = C>,
   {
      let connection = Arc::new(Self::connect_with(driver, config, lifecycle)?);
      Ok(run_scoped(connection, lifecycle.scope_policy, body))
   }

   /// Creates a statement.
   pub fn statement(&self) -> Result<Statement<C>> {
      let native = self
         .owner
         .with_parent_native(statement::KIND, |conn| conn.create_statement())?
         .map_err(|e| Error::database("Failed to create statement", e))?;
      let owner = self.owner.adopt(native, statement::finalizer::<C>())?;

      debug!(handle = %owner.id(), connection = %self.owner.id(), "statement created");
      Ok(Statement::new(owner, self.lifecycle))
   }

   /// Creates a statement and runs `body` with it.
   pub fn statement_scoped<R>(&self, body: impl FnOnce(&Arc<Statement<C>>) -> R) -> Result<R> {
      let statement = Arc::new(self.statement()?);
      Ok(run_scoped(statement, self.lifecycle.scope_policy, body))
   }

   /// Compiles `sql` into a prepared statement.
   pub fn prepare(&self, sql: &str) -> Result<PreparedStatement<C>> {
      let native = self
         .owner
         .with_parent_native(prepared::KIND, |conn| conn.prepare_statement(sql))?
         .map_err(|e| Error::database(&format!("Failed to create prepared statement ({sql})"), e))?;
      let owner = self.owner.adopt(native, prepared::finalizer::<C>())?;

      debug!(handle = %owner.id(), connection = %self.owner.id(), "prepared statement created");
      Ok(PreparedStatement::new(owner, sql, self.lifecycle))
   }

   /// Compiles `sql` and runs `body` with the prepared statement.
   pub fn prepare_scoped<R>(&self, sql: &str, body: impl FnOnce(&Arc<PreparedStatement<C>>) -> R) -> Result<R> {
      let prepared = Arc::new(self.prepare(sql)?);
      Ok(run_scoped(prepared, self.lifecycle.scope_policy, body))
   }

   pub fn commit(&self) -> Result<()> {
      self
         .owner
         .with_native(|conn| conn.commit())?
         .map_err(|e| Error::database("Failed to commit transaction", e))
   }

   pub fn rollback(&self) -> Result<()> {
      self
         .owner
         .with_native(|conn| conn.rollback())?
         .map_err(|e| Error::database("Failed to rollback transaction", e))
   }

   pub fn set_auto_commit(&self, enabled: bool) -> Result<()> {
      self
         .owner
         .with_native(|conn| conn.set_auto_commit(enabled))?
         .map_err(|e| {
            Error::database(
               &format!("Failed to set autocommit ({enabled}) for connection"),
               e,
            )
         })
   }

   pub fn auto_commit(&self) -> Result<bool> {
      self
         .owner
         .with_native(|conn| conn.auto_commit())?
         .map_err(|e| Error::database("Failed to determine autocommit state for connection", e))
   }

   /// Whether the connection is open and answers. Never fails.
   pub fn ping(&self) -> bool {
      self
         .owner
         .with_native(|conn| conn.ping().is_ok())
         .unwrap_or(false)
   }

   pub fn is_connected(&self) -> bool {
      self.ping()
   }

   /// Releases this connection's reference.
   ///
   /// Under the strict strategy the native connection stays open until every
   /// statement created from it is finished. Later calls through this
   /// object fail with an invalid-state error either way.
   pub fn disconnect(&self) -> Result<()> {
      let outcome = self.owner.release()?;
      info!(handle = %self.owner.id(), closed = outcome == Release::Closed, "disconnected");
      Ok(())
   }

   pub fn config(&self) -> &ConnectionConfig {
      &self.config
   }

   pub fn lifecycle(&self) -> LifecycleConfig {
      self.lifecycle
   }

   pub fn id(&self) -> HandleId {
      self.owner.id()
   }

   /// State of the native connection, which may outlive this object's
   /// reference while children are live.
   pub fn state(&self) -> HandleState {
      self.owner.state()
   }

   pub fn ref_count(&self) -> usize {
      self.owner.ref_count()
   }

   pub fn is_released(&self) -> bool {
      self.owner.is_released()
   }
}

impl<C: NativeConnection> Trace for Connection<C> {
   fn trace(&self, visitor: &mut dyn FieldVisitor) {
      visitor.visit_value("database", &self.config.database);
      let optional = [
         ("username", &self.config.username),
         ("password", &self.config.password),
         ("schema", &self.config.schema),
         ("timezone", &self.config.timezone),
      ];
      for (field, value) in optional {
         if let Some(value) = value {
            visitor.visit_value(field, value);
         }
      }
   }
}

impl<C: NativeConnection> Finalize for Connection<C> {
   fn finalize(&self) {
      self.owner.finalize();
   }
}

impl<C: NativeConnection> Scoped for Connection<C> {
   fn scope_kind(&self) -> &'static str {
      KIND
   }

   fn release_scope(&self) -> native_handle_rc::Result<()> {
      self.owner.release().map(|_| ())
   }
}

impl<C: NativeConnection> std::fmt::Debug for Connection<C> {
   fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
      f.debug_struct("Connection")
         .field("owner", &self.owner)
         .field("config", &self.config)
         .finish_non_exhaustive()
   }
}
