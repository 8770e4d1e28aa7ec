//! Kind-specific close routine expressed as data.

use std::fmt;

use tracing::{error, info};

use crate::host::protect;
use crate::{Error, NativeError, Result};

/// Native close routine for one resource kind.
pub type CloseFn<T> = fn(&mut T) -> std::result::Result<(), NativeError>;

/// Capability record pairing a resource kind's name with its close routine.
///
/// One generic release path drives every kind through this record.
pub struct Finalizer<T> {
   kind: &'static str,
   close: CloseFn<T>,
}

impl<T> Finalizer<T> {
   pub const fn new(kind: &'static str, close: CloseFn<T>) -> Self {
      Self { kind, close }
   }

   pub fn kind(&self) -> &'static str {
      self.kind
   }

   /// Closes `native`, consuming it.
   ///
   /// The native object is dropped whether the close succeeds, fails, or
   /// panics. Failures are translated into [`Error::NativeClose`] and panics
   /// into [`Error::ClosePanicked`]; neither unwinds.
   pub fn finalize(&self, mut native: T) -> Result<()> {
      info!(kind = self.kind, "closing native {}", self.kind);

      let close = self.close;
      let outcome = match protect(|| close(&mut native)) {
         Ok(Ok(())) => Ok(()),
         Ok(Err(err)) => Err(Error::NativeClose {
            kind: self.kind,
            code: err.code,
            message: err.message,
         }),
         Err(panicked) => {
            error!(kind = self.kind, "native close panicked: {}", panicked);
            Err(Error::ClosePanicked {
               kind: self.kind,
               message: panicked.message().to_string(),
            })
         }
      };

      drop(native);
      outcome
   }
}

impl<T> Clone for Finalizer<T> {
   fn clone(&self) -> Self {
      *self
   }
}

impl<T> Copy for Finalizer<T> {}

impl<T> fmt::Debug for Finalizer<T> {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.debug_struct("Finalizer").field("kind", &self.kind).finish()
   }
}
