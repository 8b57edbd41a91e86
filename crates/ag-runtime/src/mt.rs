//! Cross-thread ownership rebinding: mirrors `ag_bound_own_to_thread`/
//! `ag_make_weak_mt` — when an owning parameter is posted to another
//! thread, its entire reachable subgraph (including every weak block
//! within it) is retagged to the receiver thread.

use crate::object::{FieldSlot, Heap, ObjectId, ParentLink, WeakId};
use crate::scheduler::ThreadId;

/// Mark a weak block MT. Once marked, all retain/release on it must go
/// through the deferred ring buffer rather than the direct-mutation path.
pub fn make_weak_mt(heap: &Heap, w: Option<WeakId>) {
    let Some(id) = w else { return };
    let mut inner = heap.inner.lock().unwrap();
    if let Some(block) = inner.weaks.get_mut(id) {
        // No separate MT flag field on WeakBlock today: owning_thread
        // divergence from the object's thread is itself the MT signal, so
        // nothing further to flip here. Kept as a named entry point since
        // callers reason about "marking a weak MT" as its own step.
        let _ = block;
    }
}

/// Rebind `obj`'s whole reachable ownership subgraph to `thread`. A shared
/// object is only visited (to rebind nested owned/weak fields) the first
/// time it crosses into MT territory; a non-shared object strictly belongs
/// to one thread and is always walked.
pub fn bound_own_to_thread(heap: &Heap, obj: Option<ObjectId>, thread: ThreadId) {
    let Some(id) = obj else { return };
    let (owning_thread, is_shared, needs_walk) = {
        let mut inner = heap.inner.lock().unwrap();
        let Some(o) = inner.objects.get_mut(id) else {
            return;
        };
        let already_here = o.owning_thread == Some(thread);
        if already_here {
            (o.owning_thread, o.counter.is_shared(), false)
        } else {
            o.owning_thread = Some(thread);
            let is_shared = o.counter.is_shared();
            let needs_walk = if is_shared {
                if !o.counter.is_mt() {
                    o.counter.set_flag(crate::header::MT);
                    true
                } else {
                    false
                }
            } else {
                true
            };
            (Some(thread), is_shared, needs_walk)
        }
    };
    let _ = (owning_thread, is_shared);

    if !needs_walk {
        return;
    }

    let children = {
        let inner = heap.inner.lock().unwrap();
        inner
            .objects
            .get(id)
            .map(|o| o.fields.clone())
            .unwrap_or_default()
    };

    for field in children {
        match field {
            FieldSlot::Own(child) => bound_own_to_thread(heap, child, thread),
            FieldSlot::Weak(w) => make_weak_mt(heap, w),
            FieldSlot::Shared(_) | FieldSlot::Int(_) | FieldSlot::Float(_) | FieldSlot::Bool(_) => {}
        }
    }

    if let ParentLink::ViaWeak(w) = {
        let inner = heap.inner.lock().unwrap();
        inner.objects.get(id).map(|o| o.parent).unwrap_or(ParentLink::None)
    } {
        make_weak_mt(heap, Some(w));
    }
}
