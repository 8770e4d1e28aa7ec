//! The reference a single wrapper object holds on its handle.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::error;

use crate::config::CloseStrategy;
use crate::engine::{self, Release};
use crate::finalizer::Finalizer;
use crate::handle::{Handle, HandleId, HandleState};
use crate::host::Finalize;
use crate::{Error, Result};

/// One counted reference on a [`Handle`], released at most once.
///
/// Every wrapper exposed to a host owns exactly one `Owner`. Explicit close,
/// host finalization and `Drop` all funnel into the same once-only release,
/// so a wrapper can never decrement its handle twice.
pub struct Owner<T: Send + 'static> {
   handle: Arc<Handle<T>>,
   strategy: CloseStrategy,
   released: AtomicBool,
}

impl<T: Send + 'static> Owner<T> {
   /// Creates a root handle around `native` and takes the first reference.
   pub fn root(native: T, finalizer: Finalizer<T>, strategy: CloseStrategy) -> Result<Self> {
      let handle = Handle::new(native, finalizer);
      engine::acquire(&*handle)?;
      Ok(Self::from_acquired(handle, strategy))
   }

   fn from_acquired(handle: Arc<Handle<T>>, strategy: CloseStrategy) -> Self {
      Self {
         handle,
         strategy,
         released: AtomicBool::new(false),
      }
   }

   /// Runs `f` against the native object.
   pub fn with_native<R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R> {
      self.ensure_held()?;
      self.handle.with_native(f)
   }

   /// Runs a native child-creation call against this owner's native object.
   pub fn with_parent_native<R>(&self, child: &'static str, create: impl FnOnce(&mut T) -> R) -> Result<R> {
      if self.is_released() {
         return Err(Error::ParentInvalid {
            kind: child,
            parent: self.kind(),
         });
      }
      self.handle.with_parent_native(child, create)
   }

   /// Wraps a native child created from this owner's native object.
   ///
   /// The child inherits this owner's close strategy.
   pub fn adopt<C: Send + 'static>(&self, native: C, finalizer: Finalizer<C>) -> Result<Owner<C>> {
      let child = self.handle.adopt(native, finalizer)?;
      Ok(Owner::from_acquired(child, self.strategy))
   }

   /// Releases this owner's reference using its configured strategy.
   pub fn release(&self) -> Result<Release> {
      self.release_with(self.strategy)
   }

   /// Releases this owner's reference. Later calls return
   /// [`Release::AlreadyReleased`].
   ///
   /// With [`CloseStrategy::Lenient`] the native object is closed first,
   /// whatever the remaining count.
   pub fn release_with(&self, strategy: CloseStrategy) -> Result<Release> {
      if self.released.swap(true, Ordering::AcqRel) {
         return Ok(Release::AlreadyReleased);
      }

      match strategy {
         CloseStrategy::Strict => engine::release(&*self.handle),
         CloseStrategy::Lenient => {
            let forced = engine::force_close(&*self.handle);
            let released = engine::release(&*self.handle);
            match (forced, released) {
               (Err(own), Err(release_err)) => {
                  error!(
                     handle = %self.id(),
                     "release failed after forced close failure: {}",
                     release_err
                  );
                  Err(own)
               }
               (Err(own), Ok(_)) => Err(own),
               (Ok(_), released) => released,
            }
         }
      }
   }

   pub fn is_released(&self) -> bool {
      self.released.load(Ordering::Acquire)
   }

   pub fn id(&self) -> HandleId {
      self.handle.id()
   }

   pub fn kind(&self) -> &'static str {
      self.handle.kind()
   }

   pub fn state(&self) -> HandleState {
      self.handle.state()
   }

   pub fn ref_count(&self) -> usize {
      self.handle.ref_count()
   }

   pub fn parent_id(&self) -> Option<HandleId> {
      self.handle.parent_id()
   }

   pub fn strategy(&self) -> CloseStrategy {
      self.strategy
   }

   fn ensure_held(&self) -> Result<()> {
      if self.is_released() {
         return Err(Error::InvalidState { kind: self.kind() });
      }
      Ok(())
   }
}

impl<T: Send + 'static> Finalize for Owner<T> {
   fn finalize(&self) {
      if let Err(err) = self.release() {
         error!(handle = %self.id(), kind = self.kind(), "{}", err);
      }
   }
}

impl<T: Send + 'static> Drop for Owner<T> {
   fn drop(&mut self) {
      self.finalize();
   }
}

impl<T: Send + 'static> fmt::Debug for Owner<T> {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.debug_struct("Owner")
         .field("handle", &self.handle)
         .field("strategy", &self.strategy)
         .field("released", &self.is_released())
         .finish()
   }
}
