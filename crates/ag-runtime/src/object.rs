//! The object heap: a generational arena of objects plus a generational
//! arena of weak blocks, both guarded by one mutex.
//!
//! Per the concurrency model, there is no fine-grained lock ordering to
//! worry about: the copy engine and the RC buffer flush both take the same
//! `Heap::inner` mutex. This trades some parallelism for simplicity: finer
//! locking is only needed at the per-thread message-queue level, not the
//! heap level.

use ag_core::arena::{Arena, Index};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::header::Counter;
use crate::scheduler::ThreadId;

pub type ObjectId = Index;
pub type WeakId = Index;

/// Identifies a class's runtime shape. The compiler's layout planner (see
/// `ag-compiler::layout`) assigns these; the runtime only needs them to
/// look up a `ClassLayout` for copy/visit/dispose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(pub u32);

/// Where an object's parent pointer lives: inline in the object's own
/// header, or (once a weak has been taken on it) in the weak block's
/// `org_pointer_to_parent`. An explicit enum instead of a tagged raw
/// pointer, since Rust makes the tri-state distinction free.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParentLink {
    None,
    Inline(ObjectId),
    ViaWeak(WeakId),
}

/// A single field of an object, tagged by ownership kind. Generated code
/// (or, here, the interpreter-style dispatch the compiler's codegen hook
/// targets) reads/writes these through the class's `ClassLayout`.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldSlot {
    Int(i64),
    Float(f64),
    Bool(bool),
    /// Single-owner pointer; null is `None`.
    Own(Option<ObjectId>),
    /// Reference-counted pointer to a shared (frozen) object.
    Shared(Option<ObjectId>),
    /// Weak pointer; does not keep its target alive.
    Weak(Option<WeakId>),
}

pub struct Object {
    pub class: ClassId,
    pub counter: Counter,
    pub parent: ParentLink,
    pub fields: Vec<FieldSlot>,
    pub owning_thread: Option<ThreadId>,
}

impl Object {
    pub fn new(class: ClassId, fields: Vec<FieldSlot>, owning_thread: Option<ThreadId>) -> Self {
        Object {
            class,
            counter: Counter::new(),
            parent: ParentLink::None,
            fields,
            owning_thread,
        }
    }
}

pub struct WeakBlock {
    pub target: Option<ObjectId>,
    pub ref_count: u64,
    pub org_pointer_to_parent: ParentLink,
    pub owning_thread: Option<ThreadId>,
}

/// Describes how to walk a class's fields: used by the copy engine, the
/// cross-thread rebind pass, and disposal. Populated by the layout planner
/// ahead of time; a class with no entry here is treated as opaque
/// (zero fields, e.g. a builtin class implemented natively).
#[derive(Debug, Clone, Default)]
pub struct ClassLayout {
    pub field_count: usize,
}

pub struct HeapInner {
    pub objects: Arena<Object>,
    pub weaks: Arena<WeakBlock>,
    pub layouts: HashMap<ClassId, ClassLayout>,
}

pub struct Heap {
    pub inner: Mutex<HeapInner>,
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

impl Heap {
    pub fn new() -> Self {
        Heap {
            inner: Mutex::new(HeapInner {
                objects: Arena::new(),
                weaks: Arena::new(),
                layouts: HashMap::new(),
            }),
        }
    }

    pub fn register_layout(&self, class: ClassId, layout: ClassLayout) {
        self.inner.lock().unwrap().layouts.insert(class, layout);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_and_read_object() {
        let heap = Heap::new();
        let id = {
            let mut inner = heap.inner.lock().unwrap();
            inner
                .objects
                .insert(Object::new(ClassId(1), vec![FieldSlot::Int(42)], None))
        };
        let inner = heap.inner.lock().unwrap();
        let obj = inner.objects.get(id).unwrap();
        assert_eq!(obj.class, ClassId(1));
        assert_eq!(obj.fields[0], FieldSlot::Int(42));
    }
}
