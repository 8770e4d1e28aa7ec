//! # native-handle-rc
//!
//! Hierarchical reference counting for native resources whose wrapper objects
//! are owned by a finalizing host runtime.
//!
//! ## Core Types
//!
//! - **[`Handle`]**: A native object, its atomic count, its parent link and its
//!   [`Finalizer`]
//! - **[`Owner`]**: The single reference a wrapper object holds, released once
//! - **[`RefCount`]**: Atomic count that seals on its zero-transition
//! - **[`engine`]**: `acquire` / `release` / `force_close`, generic over any [`Node`]
//! - **[`Trace`] / [`Finalize`] / [`protect`]**: Host runtime capabilities
//! - **[`run_scoped`]**: Construct-use-release blocks
//!
//! ## Guarantees
//!
//! - A native object is closed exactly once, whatever order owners release in
//! - A parent's native object stays open while any child handle is live
//! - Operations after close fail with [`Error::InvalidState`] and never touch
//!   the native object
//! - A failing or panicking close never unwinds into the caller
//!
//! ## Usage
//!
//! ```
//! use native_handle_rc::{CloseStrategy, Finalizer, NativeError, Owner};
//!
//! struct Socket;
//!
//! fn close_socket(_: &mut Socket) -> Result<(), NativeError> {
//!    Ok(())
//! }
//!
//! fn main() -> native_handle_rc::Result<()> {
//!    let socket = Owner::root(Socket, Finalizer::new("socket", close_socket), CloseStrategy::Strict)?;
//!    let alive = socket.with_native(|_| true)?;
//!    assert!(alive);
//!    socket.release()?;
//!    Ok(())
//! }
//! ```
mod config;
mod counter;
pub mod engine;
mod error;
mod finalizer;
mod handle;
mod host;
mod owner;
mod scope;

pub use config::{CloseStrategy, LifecycleConfig, ScopePolicy};
pub use counter::RefCount;
pub use engine::{Release, acquire, force_close, release};
pub use error::{Error, NativeError, Result};
pub use finalizer::{CloseFn, Finalizer};
pub use handle::{Handle, HandleId, HandleState, Node};
pub use host::{Finalize, FieldVisitor, Panicked, Trace, protect};
pub use owner::Owner;
pub use scope::{Scoped, run_scoped};
