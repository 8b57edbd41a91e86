//! Weak pointer operations: `mk_weak`, `deref_weak`, `getParent`,
//! `weakExists`, grounded on the equivalent `ag_*` functions in the
//! original runtime.

use crate::object::{Heap, ObjectId, ParentLink, WeakBlock, WeakId};
use crate::scheduler::ThreadId;

/// Take (or reuse) a weak reference to `obj`. The first weak taken on an
/// object allocates its weak block and moves the object's parent pointer
/// into the block's `org_pointer_to_parent`; subsequent calls just retain
/// the existing block.
pub fn mk_weak(heap: &Heap, obj: Option<ObjectId>, thread: Option<ThreadId>) -> Option<WeakId> {
    let id = obj?;
    let mut inner = heap.inner.lock().unwrap();
    let existing = match inner.objects.get(id).map(|o| o.parent) {
        Some(ParentLink::ViaWeak(w)) => Some(w),
        _ => None,
    };
    if let Some(w) = existing {
        if let Some(block) = inner.weaks.get_mut(w) {
            block.ref_count += 1;
        }
        return Some(w);
    }

    let org_parent = inner.objects.get(id).map(|o| o.parent).unwrap_or(ParentLink::None);
    let weak_id = inner.weaks.insert(WeakBlock {
        target: Some(id),
        ref_count: 1,
        org_pointer_to_parent: org_parent,
        owning_thread: thread,
    });
    if let Some(o) = inner.objects.get_mut(id) {
        o.parent = ParentLink::ViaWeak(weak_id);
        o.counter.set_flag(crate::header::WEAK);
    }
    Some(weak_id)
}

/// Dereference a weak, retaining a pin on the result if it is still alive.
/// Returns `None` if the weak is null or its target has been disposed.
pub fn deref_weak(heap: &Heap, w: Option<WeakId>) -> Option<ObjectId> {
    let id = w?;
    let target = {
        let inner = heap.inner.lock().unwrap();
        inner.weaks.get(id).and_then(|block| block.target)
    };
    if let Some(t) = target {
        crate::rc::retain_pin(heap, Some(t));
    }
    target
}

pub fn weak_exists(heap: &Heap, w: Option<WeakId>) -> bool {
    let Some(id) = w else { return false };
    let inner = heap.inner.lock().unwrap();
    inner.weaks.get(id).and_then(|b| b.target).is_some()
}

/// `getParent`: returns the immediate owner of a non-shared object, or
/// `None` for a shared object (shared objects have no single parent) or a
/// rootless object.
pub fn get_parent(heap: &Heap, obj: ObjectId) -> Option<ObjectId> {
    let inner = heap.inner.lock().unwrap();
    let o = inner.objects.get(obj)?;
    if o.counter.is_shared() {
        return None;
    }
    match o.parent {
        ParentLink::Inline(p) => Some(p),
        ParentLink::ViaWeak(w) => match inner.weaks.get(w)?.org_pointer_to_parent {
            ParentLink::Inline(p) => Some(p),
            _ => None,
        },
        ParentLink::None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{ClassId, Object};

    #[test]
    fn mk_weak_then_deref_returns_target() {
        let heap = Heap::new();
        let id = {
            let mut inner = heap.inner.lock().unwrap();
            inner.objects.insert(Object::new(ClassId(1), vec![], None))
        };
        let w = mk_weak(&heap, Some(id), None);
        assert!(w.is_some());
        assert_eq!(deref_weak(&heap, w), Some(id));
        assert!(weak_exists(&heap, w));
    }

    #[test]
    fn deref_after_disposal_is_none() {
        let heap = Heap::new();
        let id = {
            let mut inner = heap.inner.lock().unwrap();
            inner.objects.insert(Object::new(ClassId(1), vec![], None))
        };
        let w = mk_weak(&heap, Some(id), None);
        crate::rc::release_pin(&heap, Some(id));
        assert_eq!(deref_weak(&heap, w), None);
        assert!(!weak_exists(&heap, w));
    }

    #[test]
    fn repeated_mk_weak_reuses_block() {
        let heap = Heap::new();
        let id = {
            let mut inner = heap.inner.lock().unwrap();
            inner.objects.insert(Object::new(ClassId(1), vec![], None))
        };
        let w1 = mk_weak(&heap, Some(id), None);
        let w2 = mk_weak(&heap, Some(id), None);
        assert_eq!(w1, w2);
    }
}
