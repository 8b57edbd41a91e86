//! Integration tests mirroring the teacher workspace's `runtime/tests`
//! layout: cross-crate-boundary behavior that a unit test colocated with
//! a single module can't exercise on its own.

use std::sync::Arc;

use ag_runtime::channel::{prepare_post_from_ag, Message, Param};
use ag_runtime::copy::copy;
use ag_runtime::object::{ClassId, FieldSlot, Heap, Object};
use ag_runtime::rc::{release_own, retain_own};
use ag_runtime::scheduler::{spawn_thread, thread_handle, ThreadId};
use ag_runtime::weak::mk_weak;

fn dispatch_noop(_heap: &Heap, _msg: &Message) {}

/// §8 scenario 5 (multithreading), reduced to the runtime-level assertion:
/// posting an owning parameter across threads rebinds its subgraph, and
/// the receiver thread can dereference the accompanying weak receiver.
#[test]
fn post_own_param_rebinds_subgraph_and_receiver_can_dereference() {
    let heap = Arc::new(Heap::new());

    let payload = {
        let mut inner = heap.inner.lock().unwrap();
        inner.objects.insert(Object::new(ClassId(1), vec![FieldSlot::Int(7)], Some(ThreadId(0))))
    };
    let worker_root = {
        let mut inner = heap.inner.lock().unwrap();
        inner.objects.insert(Object::new(ClassId(2), vec![], None))
    };

    let worker = spawn_thread(heap.clone(), worker_root, dispatch_noop);
    let worker_weak = mk_weak(&heap, Some(worker_root), Some(worker)).unwrap();

    let sent = prepare_post_from_ag(worker, worker_weak, 0)
        .post_own_param(Some(payload))
        .post_param(Param::Int(1))
        .finalize_post_message(&heap);
    assert!(sent);

    let inner = heap.inner.lock().unwrap();
    assert_eq!(inner.objects.get(payload).unwrap().owning_thread, Some(worker));
    drop(inner);

    thread_handle(worker).unwrap().sender.send(Message::Shutdown).unwrap();
}

/// §8 "topo-copy" scenario, reduced to the runtime-level assertion: copying
/// an object with a weak back-pointer into one of its own owned children
/// retargets that weak to the corresponding copy, not the original.
#[test]
fn copy_retargets_internal_weak_to_the_copy() {
    let heap = Heap::new();

    let child = {
        let mut inner = heap.inner.lock().unwrap();
        inner.objects.insert(Object::new(ClassId(1), vec![FieldSlot::Weak(None)], None))
    };
    let root = {
        let mut inner = heap.inner.lock().unwrap();
        inner.objects.insert(Object::new(ClassId(2), vec![FieldSlot::Own(Some(child))], None))
    };
    retain_own(&heap, Some(child), root);

    let back_weak = mk_weak(&heap, Some(root), None).unwrap();
    {
        let mut inner = heap.inner.lock().unwrap();
        inner.objects.get_mut(child).unwrap().fields[0] = FieldSlot::Weak(Some(back_weak));
    }

    let root_copy = copy(&heap, root, None);

    let inner = heap.inner.lock().unwrap();
    let copied_child = match inner.objects.get(root_copy).unwrap().fields[0] {
        FieldSlot::Own(Some(c)) => c,
        _ => panic!("expected owned child field"),
    };
    let copied_back_weak = match inner.objects.get(copied_child).unwrap().fields[0] {
        FieldSlot::Weak(Some(w)) => w,
        _ => panic!("expected weak field"),
    };
    let retargeted = inner.weaks.get(copied_back_weak).unwrap().target;
    assert_eq!(retargeted, Some(root_copy), "weak inside the copy should point at the copy, not the original");
    drop(inner);

    release_own(&heap, Some(root));
}
