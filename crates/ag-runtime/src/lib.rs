//! Object-lifetime runtime: the C-callable ABI consumed by generated code
//! (§4.5–§4.8, §6).
//!
//! - `header`: bit-exact counter/flag layout (`Counter`, `MT`/`WEAK`/
//!   `SHARED`/`HASH`/`STEP`).
//! - `object`: the object heap — a generational arena of objects plus a
//!   generational arena of weak blocks under one mutex.
//! - `rc`: retain/release family, MT deferred batching, parent
//!   maintenance, splice-cycle check.
//! - `weak`: `mk_weak`/`deref_weak`/`get_parent`.
//! - `copy`: topology-preserving deep copy and freeze.
//! - `mt`: cross-thread ownership rebinding for posted messages.
//! - `scheduler`: per-thread message loop, green threads via `may`.
//! - `channel`: the post-message builder protocol.
//! - `containers`: Blob/Array/Map/String/Cursor built-ins (§4.8).
//! - `diagnostics`: SIGQUIT handler dumping heap/thread stats.

pub mod channel;
pub mod containers;
pub mod copy;
pub mod diagnostics;
pub mod header;
pub mod mt;
pub mod object;
pub mod rc;
pub mod scheduler;
pub mod weak;

pub use ag_core::error::{
    ag_clear_error, ag_get_error, ag_has_error, ag_take_error, clear_runtime_error,
    has_runtime_error, set_runtime_error, take_runtime_error, SourceLocation,
};
pub use header::Counter;
pub use object::{ClassId, ClassLayout, FieldSlot, Heap, Object, ObjectId, ParentLink, WeakBlock, WeakId};
pub use scheduler::ThreadId;

/// Initializes the runtime: installs the SIGQUIT diagnostics handler (see
/// `diagnostics::install_signal_handler`) and returns a fresh heap. Every
/// embedding host (the `agc`-linked binary, or a foreign binding driving
/// the runtime directly) calls this exactly once before allocating.
pub fn init() -> Heap {
    diagnostics::install_signal_handler();
    Heap::new()
}
