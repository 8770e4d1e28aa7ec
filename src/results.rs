use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use indexmap::IndexMap;
use native_handle_rc::{
   FieldVisitor, Finalize, Finalizer, HandleId, HandleState, Owner, Scoped, Trace,
};
use serde_json::Value as JsonValue;

use crate::native::{Column, NativeConnection, NativeResultSet, Row};
use crate::sqlite::SqliteNativeConnection;
use crate::{Error, Result};

pub(crate) const KIND: &str = "result set";

fn finalizer<C: NativeConnection>() -> Finalizer<C::ResultSet> {
   Finalizer::new(KIND, <C::ResultSet as NativeResultSet>::close)
}

/// Rows produced by a statement or prepared statement.
///
/// Columns and rows are read from the native result set once, on first
/// access, and cached for the life of this object.
pub struct ResultSet<C: NativeConnection = SqliteNativeConnection> {
   owner: Owner<C::ResultSet>,
   columns: Mutex<Option<Arc<Vec<Column>>>>,
   rows: Mutex<Option<Arc<Vec<Row>>>>,
}

impl<C: NativeConnection> ResultSet<C> {
   pub(crate) fn adopt<P: Send + 'static>(parent: &Owner<P>, native: C::ResultSet) -> Result<Self> {
      let owner = parent.adopt(native, finalizer::<C>())?;
      Ok(Self {
         owner,
         columns: Mutex::new(None),
         rows: Mutex::new(None),
      })
   }

   pub fn columns(&self) -> Result<Arc<Vec<Column>>> {
      let mut cached = lock(&self.columns);
      self.owner.with_native(|results| {
         if let Some(columns) = cached.as_ref() {
            return Ok(Arc::clone(columns));
         }
         let columns = results
            .columns()
            .map_err(|e| Error::database("Failed to create column info", e))?;
         let columns = Arc::new(columns);
         *cached = Some(Arc::clone(&columns));
         Ok(columns)
      })?
   }

   /// Every row, read to exhaustion on the first call.
   pub fn rows(&self) -> Result<Arc<Vec<Row>>> {
      let mut cached = lock(&self.rows);
      self.owner.with_native(|results| {
         if let Some(rows) = cached.as_ref() {
            return Ok(Arc::clone(rows));
         }
         let mut rows = Vec::new();
         while let Some(row) = results
            .next_row()
            .map_err(|e| Error::database("Failed to create a rows array", e))?
         {
            rows.push(row);
         }
         let rows = Arc::new(rows);
         *cached = Some(Arc::clone(&rows));
         Ok(rows)
      })?
   }

   /// Rows keyed by column name, in column order.
   pub fn rows_as_maps(&self) -> Result<Vec<IndexMap<String, JsonValue>>> {
      let columns = self.columns()?;
      let rows = self.rows()?;

      Ok(rows
         .iter()
         .map(|row| {
            columns
               .iter()
               .map(|column| column.name.clone())
               .zip(row.iter().cloned())
               .collect()
         })
         .collect())
   }

   /// Iterates over the cached rows.
   pub fn iter(&self) -> Result<impl Iterator<Item = Row> + use<C>> {
      let rows = self.rows()?;
      Ok((0..rows.len()).map(move |index| rows[index].clone()))
   }

   /// Calls `f` for each row.
   pub fn for_each(&self, mut f: impl FnMut(&[JsonValue])) -> Result<()> {
      for row in self.rows()?.iter() {
         f(row);
      }
      Ok(())
   }

   /// Releases this result set's reference.
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

   /// Id of the statement this result set came from, until it is closed.
   pub fn statement_id(&self) -> Option<HandleId> {
      self.owner.parent_id()
   }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
   mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<C: NativeConnection> Trace for ResultSet<C> {
   fn trace(&self, visitor: &mut dyn FieldVisitor) {
      if let Some(parent) = self.owner.parent_id() {
         visitor.visit_handle("statement", parent);
      }
      if let Some(columns) = lock(&self.columns).as_ref() {
         visitor.visit_value("columns", columns);
      }
      if let Some(rows) = lock(&self.rows).as_ref() {
         visitor.visit_value("rows", rows);
      }
   }
}

impl<C: NativeConnection> Finalize for ResultSet<C> {
   fn finalize(&self) {
      self.owner.finalize();
   }
}

impl<C: NativeConnection> Scoped for ResultSet<C> {
   fn scope_kind(&self) -> &'static str {
      KIND
   }

   fn release_scope(&self) -> native_handle_rc::Result<()> {
      self.owner.release().map(|_| ())
   }
}

impl<C: NativeConnection> std::fmt::Debug for ResultSet<C> {
   fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
      f.debug_struct("ResultSet")
         .field("owner", &self.owner)
         .finish_non_exhaustive()
   }
}
