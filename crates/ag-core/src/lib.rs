//! Core primitives shared between the object-lifetime runtime and the
//! compiler: the generational arena backing both heaps, the thread-local
//! error slot FFI functions report through, and the cross-thread
//! diagnostics registry the SIGQUIT handler reads.
//!
//! # Modules
//!
//! - `arena`: generational slab allocator (`Arena<T>`, `Index`)
//! - `error`: thread-local last-error slot plus `SourceLocation`
//! - `diagnostics`: cross-thread live-object/weak-block counters

pub mod arena;
pub mod diagnostics;
pub mod error;

pub use arena::{Arena, Index};
pub use error::SourceLocation;
