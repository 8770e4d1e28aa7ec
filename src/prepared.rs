use std::sync::Arc;

use native_handle_rc::{
   FieldVisitor, Finalize, Finalizer, HandleId, HandleState, LifecycleConfig, Owner, Scoped,
   Trace, run_scoped,
};
use serde_json::Value as JsonValue;

use crate::native::{NativeConnection, NativePreparedStatement};
use crate::results::ResultSet;
use crate::sqlite::SqliteNativeConnection;
use crate::{Error, Result};

pub(crate) const KIND: &str = "prepared statement";

pub(crate) fn finalizer<C: NativeConnection>() -> Finalizer<C::PreparedStatement> {
   Finalizer::new(KIND, <C::PreparedStatement as NativePreparedStatement>::close)
}

/// A compiled statement with bindable parameters, created by
/// [`Connection::prepare`].
///
/// Bound values stay in place across executions until rebound.
///
/// [`Connection::prepare`]: crate::Connection::prepare
pub struct PreparedStatement<C: NativeConnection = SqliteNativeConnection> {
   owner: Owner<C::PreparedStatement>,
   sql: String,
   lifecycle: LifecycleConfig,
}

impl<C: NativeConnection> PreparedStatement<C> {
   pub(crate) fn new(owner: Owner<C::PreparedStatement>, sql: &str, lifecycle: LifecycleConfig) -> Self {
      Self {
         owner,
         sql: sql.to_string(),
         lifecycle,
      }
   }

   /// Binds `value` to the parameter at `index`, counting from 1.
   pub fn bind_param(&self, index: usize, value: impl Into<JsonValue>) -> Result<()> {
      if index == 0 {
         return Err(Error::InvalidParameterIndex(index));
      }

      let value = value.into();
      self
         .owner
         .with_native(|stmt| stmt.bind(index, value))?
         .map_err(|e| {
            Error::database(
               &format!("Failed to set prepared statement parameter({index})"),
               e,
            )
         })
   }

   /// Binds `values` to parameters 1, 2, ... in order.
   pub fn bind_params<I, V>(&self, values: I) -> Result<()>
   where
      I: IntoIterator<Item = V>,
      V: Into<JsonValue>,
   {
      for (offset, value) in values.into_iter().enumerate() {
         self.bind_param(offset + 1, value)?;
      }
      Ok(())
   }

   /// Runs the statement with the bound parameters. Returns `true` when it
   /// produced a result set.
   pub fn execute(&self) -> Result<bool> {
      self
         .owner
         .with_native(|stmt| stmt.execute())?
         .map_err(|e| Error::database("Failed to execute SQL prepared statement", e))
   }

   pub fn update_count(&self) -> Result<i64> {
      self
         .owner
         .with_native(|stmt| stmt.update_count())?
         .map_err(|e| {
            Error::database("Failed to get the update count for the prepared statement", e)
         })
   }

   pub fn results(&self) -> Result<ResultSet<C>> {
      let native = self
         .owner
         .with_parent_native(crate::results::KIND, |stmt| stmt.result_set())?
         .map_err(|e| {
            Error::database("Failed to get the result set for the prepared statement", e)
         })?;
      ResultSet::adopt(&self.owner, native)
   }

   pub fn results_scoped<R>(&self, body: impl FnOnce(&Arc<ResultSet<C>>) -> R) -> Result<R> {
      let results = Arc::new(self.results()?);
      Ok(run_scoped(results, self.lifecycle.scope_policy, body))
   }

   pub fn generated_keys(&self) -> Result<Option<ResultSet<C>>> {
      let native = self
         .owner
         .with_parent_native(crate::results::KIND, |stmt| stmt.generated_keys())?
         .map_err(|e| {
            Error::database("Failed to get the generated keys for the prepared statement", e)
         })?;
      native
         .map(|native| ResultSet::adopt(&self.owner, native))
         .transpose()
   }

   /// Releases this prepared statement's reference.
   pub fn finish(&self) -> Result<()> {
      self.owner.release()?;
      Ok(())
   }

   pub fn sql(&self) -> &str {
      &self.sql
   }

   pub fn id(&self) -> HandleId {
      self.owner.id()
   }

   pub fn state(&self) -> HandleState {
      self.owner.state()
   }

   pub fn ref_count(&self) -> usize {
      self.owner.ref_count()
   }

   pub fn connection_id(&self) -> Option<HandleId> {
      self.owner.parent_id()
   }
}

impl<C: NativeConnection> Trace for PreparedStatement<C> {
   fn trace(&self, visitor: &mut dyn FieldVisitor) {
      if let Some(parent) = self.owner.parent_id() {
         visitor.visit_handle("connection", parent);
      }
      visitor.visit_value("sql", &self.sql);
   }
}

impl<C: NativeConnection> Finalize for PreparedStatement<C> {
   fn finalize(&self) {
      self.owner.finalize();
   }
}

impl<C: NativeConnection> Scoped for PreparedStatement<C> {
   fn scope_kind(&self) -> &'static str {
      KIND
   }

   fn release_scope(&self) -> native_handle_rc::Result<()> {
      self.owner.release().map(|_| ())
   }
}

impl<C: NativeConnection> std::fmt::Debug for PreparedStatement<C> {
   fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
      f.debug_struct("PreparedStatement")
         .field("owner", &self.owner)
         .field("sql", &self.sql)
         .finish()
   }
}
