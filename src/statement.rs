use std::sync::Arc;

use native_handle_rc::{
   FieldVisitor, Finalize, Finalizer, HandleId, HandleState, LifecycleConfig, Owner, Scoped,
   Trace, run_scoped,
};

use crate::native::{NativeConnection, NativeStatement};
use crate::results::ResultSet;
use crate::sqlite::SqliteNativeConnection;
use crate::{Error, Result};

pub(crate) const KIND: &str = "statement";

pub(crate) fn finalizer<C: NativeConnection>() -> Finalizer<C::Statement> {
   Finalizer::new(KIND, <C::Statement as NativeStatement>::close)
}

/// A statement for one-off SQL, created by [`Connection::statement`].
///
/// [`Connection::statement`]: crate::Connection::statement
pub struct Statement<C: NativeConnection = SqliteNativeConnection> {
   owner: Owner<C::Statement>,
   lifecycle: LifecycleConfig,
}

impl<C: NativeConnection> Statement<C> {
   pub(crate) fn new(owner: Owner<C::Statement>, lifecycle: LifecycleConfig) -> Self {
      Self { owner, lifecycle }
   }

   /// Runs `sql`. Returns `true` when it produced a result set.
   pub fn execute(&self, sql: &str) -> Result<bool> {
      self
         .owner
         .with_native(|stmt| stmt.execute(sql))?
         .map_err(|e| Error::database("Failed to execute SQL statement", e))
   }

   /// Rows affected by the last execution, or `-1` after a query.
   pub fn update_count(&self) -> Result<i64> {
      self
         .owner
         .with_native(|stmt| stmt.update_count())?
         .map_err(|e| Error::database("Failed to get the update count for the statement", e))
   }

   pub fn results(&self) -> Result<ResultSet<C>> {
      let native = self
         .owner
         .with_parent_native(crate::results::KIND, |stmt| stmt.result_set())?
         .map_err(|e| Error::database("Failed to get the result set for the statement", e))?;
      ResultSet::adopt(&self.owner, native)
   }

   /// Runs `body` with the result set of the last execution.
   pub fn results_scoped<R>(&self, body: impl FnOnce(&Arc<ResultSet<C>>) -> R) -> Result<R> {
      let results = Arc::new(self.results()?);
      Ok(run_scoped(results, self.lifecycle.scope_policy, body))
   }

   /// Keys generated by the last execution, if the library reported any.
   pub fn generated_keys(&self) -> Result<Option<ResultSet<C>>> {
      let native = self
         .owner
         .with_parent_native(crate::results::KIND, |stmt| stmt.generated_keys())?
         .map_err(|e| Error::database("Failed to get the generated keys for the statement", e))?;
      native
         .map(|native| ResultSet::adopt(&self.owner, native))
         .transpose()
   }

   /// Releases this statement's reference.
   pub fn finish(&self) -> Result<()> {
      self.owner.release()?;
      Ok(())
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

   /// Id of the connection this statement was created from, until the
   /// statement is closed.
   pub fn connection_id(&self) -> Option<HandleId> {
      self.owner.parent_id()
   }
}

impl<C: NativeConnection> Trace for Statement<C> {
   fn trace(&self, visitor: &mut dyn FieldVisitor) {
      if let Some(parent) = self.owner.parent_id() {
         visitor.visit_handle("connection", parent);
      }
   }
}

impl<C: NativeConnection> Finalize for Statement<C> {
   fn finalize(&self) {
      self.owner.finalize();
   }
}

impl<C: NativeConnection> Scoped for Statement<C> {
   fn scope_kind(&self) -> &'static str {
      KIND
   }

   fn release_scope(&self) -> native_handle_rc::Result<()> {
      self.owner.release().map(|_| ())
   }
}

impl<C: NativeConnection> std::fmt::Debug for Statement<C> {
   fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
      f.debug_struct("Statement")
         .field("owner", &self.owner)
         .finish_non_exhaustive()
   }
}
