//! Scoped-block protocol: construct, use, and optionally release.

use std::sync::Arc;

use tracing::{trace, warn};

use crate::Result;
use crate::config::ScopePolicy;
use crate::host::protect;

/// A resource that can hand its owner reference back at the end of a block.
pub trait Scoped {
   fn scope_kind(&self) -> &'static str;

   /// Releases the owner reference. Called at most once per block.
   fn release_scope(&self) -> Result<()>;
}

/// Runs `body` with `resource`, then applies `policy`.
///
/// A panic in `body` is captured, the policy is applied, and the panic
/// resumes. Release failures at block exit are logged, never returned.
pub fn run_scoped<W, R, F>(resource: Arc<W>, policy: ScopePolicy, body: F) -> R
where
   W: Scoped + ?Sized,
   F: FnOnce(&Arc<W>) -> R,
{
   let kind = resource.scope_kind();
   trace!(kind, ?policy, "entering scoped block");

   let outcome = protect(|| body(&resource));

   if policy == ScopePolicy::AutoRelease
      && let Err(err) = resource.release_scope()
   {
      warn!(kind, "release at end of scoped block failed: {}", err);
   }
   trace!(kind, panicked = outcome.is_err(), "leaving scoped block");
   drop(resource);

   match outcome {
      Ok(value) => value,
      Err(panicked) => panicked.resume(),
   }
}
