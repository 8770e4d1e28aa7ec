//! Handle record pairing a native object with its count and parent link.

use std::fmt;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tracing::{error, warn};

use crate::counter::RefCount;
use crate::engine;
use crate::finalizer::Finalizer;
use crate::{Error, Result};

static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique handle identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct HandleId(u64);

impl HandleId {
   fn next() -> Self {
      Self(NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed))
   }

   pub fn get(self) -> u64 {
      self.0
   }
}

impl fmt::Display for HandleId {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      write!(f, "#{}", self.0)
   }
}

/// Lifecycle state of a handle's native object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum HandleState {
   Live = 0,
   Closing = 1,
   Closed = 2,
}

impl HandleState {
   fn from_u8(value: u8) -> Self {
      match value {
         0 => HandleState::Live,
         1 => HandleState::Closing,
         _ => HandleState::Closed,
      }
   }
}

/// Type-erased view of a handle, as seen by the engine and by child handles.
pub trait Node: Send + Sync {
   fn id(&self) -> HandleId;

   fn kind(&self) -> &'static str;

   fn refs(&self) -> &RefCount;

   fn state(&self) -> HandleState;

   fn parent(&self) -> Option<Arc<dyn Node>>;

   /// Detaches the parent link and returns it.
   fn take_parent(&self) -> Option<Arc<dyn Node>>;

   /// Closes the native object if this caller wins the `Live -> Closing`
   /// transition. Returns `Ok(false)` when another caller already did.
   fn close_native(&self) -> Result<bool>;
}

/// A native object of type `T` under reference-counted ownership.
///
/// Handles are shared through `Arc`; the `Arc` keeps only this record alive.
/// The native object itself lives exactly as long as the reference count
/// says, and is closed through the handle's [`Finalizer`].
pub struct Handle<T> {
   id: HandleId,
   finalizer: Finalizer<T>,
   refs: RefCount,
   state: AtomicU8,
   native: Mutex<Option<T>>,
   parent: Mutex<Option<Arc<dyn Node>>>,
}

impl<T: Send + 'static> Handle<T> {
   /// Creates a root handle with a zero count.
   pub fn new(native: T, finalizer: Finalizer<T>) -> Arc<Self> {
      Self::build(native, finalizer, None)
   }

   fn build(native: T, finalizer: Finalizer<T>, parent: Option<Arc<dyn Node>>) -> Arc<Self> {
      Arc::new(Self {
         id: HandleId::next(),
         finalizer,
         refs: RefCount::new(),
         state: AtomicU8::new(HandleState::Live as u8),
         native: Mutex::new(Some(native)),
         parent: Mutex::new(parent),
      })
   }

   /// Runs `f` against the native object.
   ///
   /// Fails with [`Error::InvalidState`] once the native object is gone. The
   /// handle's lock is held for the duration of `f`, so a concurrent close
   /// waits for it.
   pub fn with_native<R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R> {
      let mut guard = self.lock_native();
      let native = guard.as_mut().ok_or(Error::InvalidState {
         kind: self.finalizer.kind(),
      })?;
      Ok(f(native))
   }

   /// Runs `create` against the native object on behalf of a child of kind
   /// `child`.
   ///
   /// Fails with [`Error::ParentInvalid`] before calling `create` when the
   /// native object is gone.
   pub fn with_parent_native<R>(&self, child: &'static str, create: impl FnOnce(&mut T) -> R) -> Result<R> {
      let mut guard = self.lock_native();
      let native = guard.as_mut().ok_or(Error::ParentInvalid {
         kind: child,
         parent: self.finalizer.kind(),
      })?;
      Ok(create(native))
   }

   /// Wraps `native` in a child handle of this one and acquires it once.
   ///
   /// If this handle was closed after the native child was created, the
   /// child is closed again here and [`Error::ParentInvalid`] is returned.
   pub fn adopt<C: Send + 'static>(self: &Arc<Self>, native: C, finalizer: Finalizer<C>) -> Result<Arc<Handle<C>>> {
      let parent: Arc<dyn Node> = self.clone();
      let child = Handle::build(native, finalizer, Some(parent));

      if let Err(err) = engine::acquire(&*child) {
         if let Err(close_err) = child.close_native() {
            warn!(
               handle = %child.id,
               kind = finalizer.kind(),
               "failed to close orphaned child: {}",
               close_err
            );
         }
         return Err(err);
      }

      Ok(child)
   }

   pub fn id(&self) -> HandleId {
      self.id
   }

   pub fn kind(&self) -> &'static str {
      self.finalizer.kind()
   }

   pub fn ref_count(&self) -> usize {
      self.refs.count()
   }

   pub fn state(&self) -> HandleState {
      HandleState::from_u8(self.state.load(Ordering::Acquire))
   }

   pub fn is_live(&self) -> bool {
      self.state() == HandleState::Live
   }

   /// Id of the parent handle, while the link exists.
   pub fn parent_id(&self) -> Option<HandleId> {
      self.lock_parent().as_ref().map(|parent| parent.id())
   }

   fn lock_native(&self) -> MutexGuard<'_, Option<T>> {
      self.native.lock().unwrap_or_else(PoisonError::into_inner)
   }

   fn lock_parent(&self) -> MutexGuard<'_, Option<Arc<dyn Node>>> {
      self.parent.lock().unwrap_or_else(PoisonError::into_inner)
   }
}

impl<T: Send + 'static> Node for Handle<T> {
   fn id(&self) -> HandleId {
      self.id
   }

   fn kind(&self) -> &'static str {
      self.finalizer.kind()
   }

   fn refs(&self) -> &RefCount {
      &self.refs
   }

   fn state(&self) -> HandleState {
      Handle::state(self)
   }

   fn parent(&self) -> Option<Arc<dyn Node>> {
      self.lock_parent().clone()
   }

   fn take_parent(&self) -> Option<Arc<dyn Node>> {
      self.lock_parent().take()
   }

   fn close_native(&self) -> Result<bool> {
      if self
         .state
         .compare_exchange(
            HandleState::Live as u8,
            HandleState::Closing as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
         )
         .is_err()
      {
         return Ok(false);
      }

      let native = self.lock_native().take();
      let outcome = match native {
         Some(native) => self.finalizer.finalize(native),
         None => Ok(()),
      };

      self.state.store(HandleState::Closed as u8, Ordering::Release);
      outcome.map(|()| true)
   }
}

impl<T> Drop for Handle<T> {
   fn drop(&mut self) {
      let native = self
         .native
         .get_mut()
         .unwrap_or_else(PoisonError::into_inner)
         .take();

      // Only reachable for handles whose count was never released to zero
      if let Some(native) = native {
         warn!(
            handle = %self.id,
            kind = self.finalizer.kind(),
            "handle dropped with an open native object"
         );
         if let Err(err) = self.finalizer.finalize(native) {
            error!(handle = %self.id, "{}", err);
         }
      }
   }
}

impl<T> fmt::Debug for Handle<T> {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.debug_struct("Handle")
         .field("id", &self.id)
         .field("kind", &self.finalizer.kind())
         .field("refs", &self.refs.count())
         .field("state", &HandleState::from_u8(self.state.load(Ordering::Acquire)))
         .finish_non_exhaustive()
   }
}
