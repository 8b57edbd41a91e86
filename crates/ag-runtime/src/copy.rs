//! Topology-preserving deep copy.
//!
//! The original algorithm repurposes two pointer-tag bits during the walk
//! to track "destination not yet weak-fixed" and "source object whose weak
//! block needs redirecting" without extra allocation. Our arena gives every
//! object a stable `ObjectId`, so the same two-pass shape is expressed with
//! a `HashMap<ObjectId, ObjectId>` (src -> copy) instead of pointer tagging:
//!
//! 1. Walk `Own`/`Shared` edges recursively, allocating a copy for each
//!    newly visited source object and recording it in the map. Revisiting
//!    an already-mapped source (shared substructure, or a cycle reachable
//!    only through weak edges) returns the existing copy instead of
//!    recursing again.
//! 2. Walk every copied object's original weak fields. A weak pointing at
//!    an object that got copied is redirected to a fresh weak block whose
//!    target is the copy; a weak pointing outside the copied subgraph keeps
//!    pointing at the original target (copy doesn't force it to diverge).
//! 3. Run any `afterCopy` fixers registered during the walk.

use std::cell::RefCell;
use std::collections::HashMap;

use crate::header::Counter;
use crate::object::{ClassLayout, FieldSlot, Heap, Object, ObjectId, ParentLink, WeakBlock, WeakId};
use crate::scheduler::ThreadId;

pub type CopyFixer = fn(&Heap, ObjectId);

thread_local! {
    static PENDING_FIXERS: RefCell<Vec<(CopyFixer, ObjectId)>> = const { RefCell::new(Vec::new()) };
}

/// Registers a fixer to run once the in-flight `copy`/`copy_freeze` call
/// finishes its structural pass. Mirrors `reg_copy_fixer` from §6.
pub fn reg_copy_fixer(fixer: CopyFixer, object: ObjectId) {
    PENDING_FIXERS.with(|f| f.borrow_mut().push((fixer, object)));
}

pub fn copy(heap: &Heap, src: ObjectId, owning_thread: Option<ThreadId>) -> ObjectId {
    copy_impl(heap, src, owning_thread, false)
}

/// Identical to `copy`, but every newly allocated object is marked SHARED:
/// a frozen copy may be reached from many roots afterward.
pub fn copy_freeze(heap: &Heap, src: ObjectId, owning_thread: Option<ThreadId>) -> ObjectId {
    copy_impl(heap, src, owning_thread, true)
}

fn copy_impl(heap: &Heap, src: ObjectId, owning_thread: Option<ThreadId>, freeze: bool) -> ObjectId {
    let mut visited: HashMap<ObjectId, ObjectId> = HashMap::new();
    let root_copy = copy_structural(heap, src, owning_thread, freeze, &mut visited);
    fix_up_weak_fields(heap, owning_thread, freeze, &visited);
    run_pending_fixers(heap);
    root_copy
}

fn copy_structural(
    heap: &Heap,
    src: ObjectId,
    owning_thread: Option<ThreadId>,
    freeze: bool,
    visited: &mut HashMap<ObjectId, ObjectId>,
) -> ObjectId {
    if let Some(&existing) = visited.get(&src) {
        return existing;
    }

    let (class, src_fields) = {
        let inner = heap.inner.lock().unwrap();
        let obj = inner
            .objects
            .get(src)
            .expect("copy: source object vanished mid-walk");
        (obj.class, obj.fields.clone())
    };

    // Reserve the destination id before recursing so shared/cyclic
    // substructure reachable from src's own children can already find it.
    let dst = {
        let mut inner = heap.inner.lock().unwrap();
        let mut counter = Counter::new();
        if freeze {
            counter.set_flag(crate::header::SHARED);
        }
        let mut obj = Object::new(class, Vec::new(), owning_thread);
        obj.counter = counter;
        inner.objects.insert(obj)
    };
    visited.insert(src, dst);

    let mut dst_fields = Vec::with_capacity(src_fields.len());
    for field in &src_fields {
        let copied = match field {
            FieldSlot::Own(Some(child)) => {
                FieldSlot::Own(Some(copy_structural(heap, *child, owning_thread, freeze, visited)))
            }
            FieldSlot::Shared(Some(child)) => {
                FieldSlot::Shared(Some(copy_structural(heap, *child, owning_thread, freeze, visited)))
            }
            // Weak fields are patched in the second pass, once `visited` is complete.
            FieldSlot::Weak(w) => FieldSlot::Weak(*w),
            other => other.clone(),
        };
        dst_fields.push(copied);
    }

    {
        let mut inner = heap.inner.lock().unwrap();
        if let Some(obj) = inner.objects.get_mut(dst) {
            obj.fields = dst_fields;
        }
    }

    dst
}

fn fix_up_weak_fields(
    heap: &Heap,
    owning_thread: Option<ThreadId>,
    freeze: bool,
    visited: &HashMap<ObjectId, ObjectId>,
) {
    for (&src, &dst) in visited {
        let weak_field_indices: Vec<(usize, WeakId)> = {
            let inner = heap.inner.lock().unwrap();
            let src_fields = &inner.objects.get(src).unwrap().fields;
            src_fields
                .iter()
                .enumerate()
                .filter_map(|(i, f)| match f {
                    FieldSlot::Weak(Some(w)) => Some((i, *w)),
                    _ => None,
                })
                .collect()
        };

        for (field_index, src_weak) in weak_field_indices {
            let (weak_target, weak_owner_thread) = {
                let inner = heap.inner.lock().unwrap();
                let block = inner.weaks.get(src_weak).unwrap();
                (block.target, block.owning_thread)
            };

            // Cross-thread weaks are never retargeted on copy (decided in
            // DESIGN.md): the copy keeps pointing at the original block.
            let crosses_thread = weak_owner_thread.is_some()
                && owning_thread.is_some()
                && weak_owner_thread != owning_thread;

            let new_weak = match weak_target {
                Some(target) if !crosses_thread => visited.get(&target).map(|&copied_target| {
                    let mut inner = heap.inner.lock().unwrap();
                    let org_parent = inner
                        .objects
                        .get(copied_target)
                        .map(|o| o.parent)
                        .unwrap_or(ParentLink::None);
                    inner.weaks.insert(WeakBlock {
                        target: Some(copied_target),
                        ref_count: 1,
                        org_pointer_to_parent: org_parent,
                        owning_thread,
                    })
                }),
                _ => None,
            };

            let mut inner = heap.inner.lock().unwrap();
            if let Some(obj) = inner.objects.get_mut(dst)
                && let Some(slot) = obj.fields.get_mut(field_index)
            {
                *slot = match new_weak {
                    Some(w) => FieldSlot::Weak(Some(w)),
                    None => FieldSlot::Weak(Some(src_weak)), // keep pointing at the original block
                };
            }
        }
    }
    let _ = freeze;
}

fn run_pending_fixers(heap: &Heap) {
    let fixers = PENDING_FIXERS.with(|f| std::mem::take(&mut *f.borrow_mut()));
    for (fixer, object) in fixers {
        fixer(heap, object);
    }
}

pub fn register_class_layout(heap: &Heap, class: crate::object::ClassId, layout: ClassLayout) {
    heap.register_layout(class, layout);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::ClassId;

    fn make_leaf(heap: &Heap, value: i64) -> ObjectId {
        let mut inner = heap.inner.lock().unwrap();
        inner.objects.insert(Object::new(ClassId(1), vec![FieldSlot::Int(value)], None))
    }

    #[test]
    fn copy_is_independent_of_source() {
        let heap = Heap::new();
        let src = make_leaf(&heap, 7);
        let dst = copy(&heap, src, None);
        assert_ne!(src, dst);

        {
            let mut inner = heap.inner.lock().unwrap();
            inner.objects.get_mut(src).unwrap().fields[0] = FieldSlot::Int(99);
        }
        let inner = heap.inner.lock().unwrap();
        assert_eq!(inner.objects.get(dst).unwrap().fields[0], FieldSlot::Int(7));
    }

    #[test]
    fn copy_preserves_shared_substructure_topology() {
        let heap = Heap::new();
        let shared_leaf = make_leaf(&heap, 1);
        let root_id = {
            let mut inner = heap.inner.lock().unwrap();
            inner.objects.insert(Object::new(
                ClassId(2),
                vec![
                    FieldSlot::Shared(Some(shared_leaf)),
                    FieldSlot::Shared(Some(shared_leaf)),
                ],
                None,
            ))
        };

        let copy_id = copy(&heap, root_id, None);
        let inner = heap.inner.lock().unwrap();
        let copied = inner.objects.get(copy_id).unwrap();
        let (FieldSlot::Shared(Some(a)), FieldSlot::Shared(Some(b))) =
            (&copied.fields[0], &copied.fields[1])
        else {
            panic!("expected shared fields");
        };
        assert_eq!(a, b, "both fields should point at the same copied object");
        assert_ne!(*a, shared_leaf, "the copy must not alias the source");
    }

    #[test]
    fn copy_freeze_marks_new_objects_shared() {
        let heap = Heap::new();
        let src = make_leaf(&heap, 3);
        let dst = copy_freeze(&heap, src, None);
        let inner = heap.inner.lock().unwrap();
        assert!(inner.objects.get(dst).unwrap().counter.is_shared());
        assert!(!inner.objects.get(src).unwrap().counter.is_shared());
    }
}
