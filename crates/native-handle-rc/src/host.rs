//! Capabilities exchanged with the host runtime.
//!
//! A host that traces reachable objects calls [`Trace::trace`] on each live
//! wrapper and [`Finalize::finalize`] on each unreachable one. Every call the
//! host makes into wrapper code that may run native code goes through
//! [`protect`], so a panic never unwinds into the host.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use crate::HandleId;

/// Receives the fields a wrapper keeps reachable.
pub trait FieldVisitor {
   /// A reference to another handle (typically the parent).
   fn visit_handle(&mut self, field: &'static str, id: HandleId);

   /// A host-visible value owned by the wrapper.
   fn visit_value(&mut self, field: &'static str, value: &dyn Any);
}

/// Mark hook.
pub trait Trace {
   fn trace(&self, visitor: &mut dyn FieldVisitor);
}

/// Finalization hook. Must not panic and must not report errors.
pub trait Finalize {
   fn finalize(&self);
}

/// A panic captured by [`protect`].
pub struct Panicked {
   message: String,
   payload: Box<dyn Any + Send + 'static>,
}

impl Panicked {
   fn from_payload(payload: Box<dyn Any + Send + 'static>) -> Self {
      let message = if let Some(s) = payload.downcast_ref::<&str>() {
         (*s).to_string()
      } else if let Some(s) = payload.downcast_ref::<String>() {
         s.clone()
      } else {
         "unknown panic".to_string()
      };
      Self { message, payload }
   }

   pub fn message(&self) -> &str {
      &self.message
   }

   /// Continues unwinding with the original payload.
   pub fn resume(self) -> ! {
      panic::resume_unwind(self.payload)
   }
}

impl fmt::Debug for Panicked {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.debug_struct("Panicked")
         .field("message", &self.message)
         .finish_non_exhaustive()
   }
}

impl fmt::Display for Panicked {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.write_str(&self.message)
   }
}

/// Runs `body`, capturing a panic instead of letting it unwind.
pub fn protect<R>(body: impl FnOnce() -> R) -> std::result::Result<R, Panicked> {
   panic::catch_unwind(AssertUnwindSafe(body)).map_err(Panicked::from_payload)
}
