//! Atomic reference-count word with a sealed bit.
//!
//! The high bit of the word marks the counter as sealed: it is set in the same
//! read-modify-write that moves the count from 1 to 0, so once a handle's
//! native resource is scheduled for close no later acquire can revive it.

use std::sync::atomic::Ordering;

const SEALED: usize = 1 << (usize::BITS - 1);
const COUNT_MASK: usize = !SEALED;

#[cfg(target_has_atomic = "ptr")]
type Word = std::sync::atomic::AtomicUsize;

#[cfg(not(target_has_atomic = "ptr"))]
type Word = fallback::UnsyncWord;

/// Reference count for a single handle.
///
/// All operations are lock-free on targets with pointer-width atomics.
#[derive(Debug)]
pub struct RefCount {
   word: Word,
}

impl RefCount {
   /// Creates an unsealed counter at zero.
   pub const fn new() -> Self {
      Self { word: Word::new(0) }
   }

   /// Current count, ignoring the sealed bit.
   pub fn count(&self) -> usize {
      self.word.load(Ordering::Acquire) & COUNT_MASK
   }

   /// Whether the zero-transition has happened.
   pub fn is_sealed(&self) -> bool {
      self.word.load(Ordering::Acquire) & SEALED != 0
   }

   /// Adds one reference and returns the prior count.
   ///
   /// Returns `None` if the counter is sealed. A saturated counter is treated
   /// the same way.
   pub fn increment(&self) -> Option<usize> {
      self
         .word
         .fetch_update(Ordering::AcqRel, Ordering::Acquire, |word| {
            (word & SEALED == 0 && word < COUNT_MASK).then_some(word + 1)
         })
         .ok()
   }

   /// Drops one reference and returns the prior count.
   ///
   /// Returns `None` when the count is already zero. A prior count of `1` is
   /// the zero-transition: the counter is sealed in the same operation and the
   /// caller is the only one that will ever observe it.
   pub fn decrement(&self) -> Option<usize> {
      self
         .word
         .fetch_update(Ordering::AcqRel, Ordering::Acquire, |word| {
            match word & COUNT_MASK {
               0 => None,
               1 => Some(SEALED),
               _ => Some(word - 1),
            }
         })
         .ok()
         .map(|prior| prior & COUNT_MASK)
   }

   /// Replaces the count and returns the prior count. The sealed bit is kept.
   ///
   /// Only meaningful before the handle is shared, e.g. to undo a first
   /// acquire that lost a race with its parent's close.
   pub fn exchange(&self, value: usize) -> usize {
      let value = value & COUNT_MASK;
      let prior = self
         .word
         .fetch_update(Ordering::AcqRel, Ordering::Acquire, |word| {
            Some((word & SEALED) | value)
         })
         .unwrap_or_else(|word| word);
      prior & COUNT_MASK
   }

   /// Sets the count to `new` if it currently equals `current` and the
   /// counter is not sealed. Returns the prior count either way.
   pub fn compare_exchange(&self, current: usize, new: usize) -> Result<usize, usize> {
      self
         .word
         .compare_exchange(
            current & COUNT_MASK,
            new & COUNT_MASK,
            Ordering::AcqRel,
            Ordering::Acquire,
         )
         .map_err(|word| word & COUNT_MASK)
   }
}

impl Default for RefCount {
   fn default() -> Self {
      Self::new()
   }
}

#[cfg(not(target_has_atomic = "ptr"))]
mod fallback {
   use std::cell::Cell;
   use std::sync::atomic::Ordering;

   /// Plain word for targets without pointer-width atomics.
   ///
   /// Correct only when the host runs finalizers on the application thread.
   /// Concurrent release from two threads can double-close.
   #[derive(Debug)]
   pub(super) struct UnsyncWord(Cell<usize>);

   // SAFETY: see the type docs. Targets without pointer-width atomics are
   // single-core in practice and the host serializes finalizers.
   unsafe impl Sync for UnsyncWord {}

   impl UnsyncWord {
      pub(super) const fn new(value: usize) -> Self {
         Self(Cell::new(value))
      }

      pub(super) fn load(&self, _: Ordering) -> usize {
         self.0.get()
      }

      pub(super) fn compare_exchange(
         &self,
         current: usize,
         new: usize,
         _: Ordering,
         _: Ordering,
      ) -> Result<usize, usize> {
         let prior = self.0.get();
         if prior == current {
            self.0.set(new);
            Ok(prior)
         } else {
            Err(prior)
         }
      }

      pub(super) fn fetch_update<F>(&self, _: Ordering, _: Ordering, mut f: F) -> Result<usize, usize>
      where
         F: FnMut(usize) -> Option<usize>,
      {
         let prior = self.0.get();
         match f(prior) {
            Some(next) => {
               self.0.set(next);
               Ok(prior)
            }
            None => Err(prior),
         }
      }
   }
}
