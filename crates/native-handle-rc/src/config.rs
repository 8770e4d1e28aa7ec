use serde::{Deserialize, Serialize};

/// What an explicit close does while other references remain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseStrategy {
   /// Drop the caller's reference only. The native resource closes when the
   /// last reference (including live children) goes away.
   #[default]
   Strict,

   /// Close the native resource immediately. Remaining references see
   /// `InvalidState` and children keep the bookkeeping alive until released.
   Lenient,
}

/// Whether a scoped block releases its resource on exit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopePolicy {
   /// Leave the resource to explicit close or host finalization.
   #[default]
   Retain,

   /// Release the owner's reference when the block exits, normally or by
   /// panic.
   AutoRelease,
}

/// Lifecycle settings applied to a resource and the children created from it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LifecycleConfig {
   pub close_strategy: CloseStrategy,
   pub scope_policy: ScopePolicy,
}

impl LifecycleConfig {
   pub fn with_close_strategy(mut self, close_strategy: CloseStrategy) -> Self {
      self.close_strategy = close_strategy;
      self
   }

   pub fn with_scope_policy(mut self, scope_policy: ScopePolicy) -> Self {
      self.scope_policy = scope_policy;
      self
   }
}
