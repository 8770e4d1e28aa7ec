//! Reference-count engine.
//!
//! `acquire` and `release` work on any [`Node`], independent of the native
//! resource kind. A child counts once on its parent for as long as the child
//! is live, so a parent's native object stays open while any child needs it,
//! regardless of the order in which owners let go.

use tracing::{debug, error, trace};

use crate::handle::{HandleState, Node};
use crate::{Error, Result};

/// Outcome of a [`release`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Release {
   /// The count was already zero; nothing happened.
   AlreadyReleased,
   /// Other references remain.
   Retained { remaining: usize },
   /// This call performed the zero-transition and closed the handle.
   Closed,
}

/// Adds one reference to `handle` and returns the prior count.
///
/// The first acquire of a child also adds one reference to its parent.
pub fn acquire<N: Node + ?Sized>(handle: &N) -> Result<usize> {
   if handle.state() != HandleState::Live {
      return Err(Error::InvalidState { kind: handle.kind() });
   }

   let prior = handle
      .refs()
      .increment()
      .ok_or(Error::InvalidState { kind: handle.kind() })?;

   if prior == 0
      && let Some(parent) = handle.parent()
      && parent.refs().increment().is_none()
   {
      // Parent closed between the native create and this acquire
      handle.refs().exchange(0);
      return Err(Error::ParentInvalid {
         kind: handle.kind(),
         parent: parent.kind(),
      });
   }

   trace!(
      handle = %handle.id(),
      kind = handle.kind(),
      refs = prior + 1,
      "acquired"
   );
   Ok(prior)
}

/// Drops one reference from `handle`.
///
/// On the zero-transition the native object is closed (unless a force-close
/// already did it) and the parent is released in turn. The cascade runs even
/// when the close fails; the handle's own error is returned first.
pub fn release<N: Node + ?Sized>(handle: &N) -> Result<Release> {
   let Some(prior) = handle.refs().decrement() else {
      trace!(
         handle = %handle.id(),
         kind = handle.kind(),
         "release of a released handle ignored"
      );
      return Ok(Release::AlreadyReleased);
   };

   if prior > 1 {
      trace!(
         handle = %handle.id(),
         kind = handle.kind(),
         refs = prior - 1,
         "released"
      );
      return Ok(Release::Retained { remaining: prior - 1 });
   }

   debug!(
      handle = %handle.id(),
      kind = handle.kind(),
      "reference count reached zero"
   );

   let closed = handle.close_native();

   let cascaded = match handle.take_parent() {
      Some(parent) => {
         debug!(
            handle = %handle.id(),
            parent = %parent.id(),
            "releasing parent {}",
            parent.kind()
         );
         release(&*parent)
      }
      None => Ok(Release::Closed),
   };

   match (closed, cascaded) {
      (Err(own), Err(parent)) => {
         error!(
            handle = %handle.id(),
            "parent release failed after close failure: {}",
            parent
         );
         Err(own)
      }
      (Err(own), Ok(_)) => Err(own),
      (Ok(_), Err(parent)) => Err(parent),
      (Ok(_), Ok(_)) => Ok(Release::Closed),
   }
}

/// Closes the native object now without touching the count.
///
/// Later operations on the handle fail with `InvalidState`. The parent edge
/// is still released at the zero-transition. Returns `Ok(false)` if the
/// handle was already closing or closed.
pub fn force_close<N: Node + ?Sized>(handle: &N) -> Result<bool> {
   debug!(
      handle = %handle.id(),
      kind = handle.kind(),
      refs = handle.refs().count(),
      "force close"
   );
   handle.close_native()
}
