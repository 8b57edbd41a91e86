//! Thread runtime (§4.7): one green thread (May coroutine) per language
//! thread, each running its own message loop to completion before sleeping.
//!
//! The original runtime hand-rolls an `in`/`out` queue pair per thread with
//! a pthread mutex/condvar so a sender never has to lock someone else's
//! queue while holding its own. May's `mpmc` channel already gives us a
//! lock-free, multi-producer mailbox, so the `out` queue's job (buffer
//! locally, then redistribute under the target's lock) collapses to a
//! direct cross-thread `send` — every sender already owns a cheap clone of
//! the receiver's `Sender`. This is the one place this crate trades the
//! original's two-phase queue for May's greener primitive; see DESIGN.md.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use may::coroutine;
use may::sync::mpmc;

use crate::channel::Message;
use crate::object::ObjectId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadId(pub u32);

static NEXT_THREAD_ID: AtomicU32 = AtomicU32::new(0);

pub static ACTIVE_THREADS: AtomicUsize = AtomicUsize::new(0);
pub static TOTAL_SPAWNED: AtomicU64 = AtomicU64::new(0);
pub static TOTAL_COMPLETED: AtomicU64 = AtomicU64::new(0);
pub static PEAK_THREADS: AtomicUsize = AtomicUsize::new(0);

pub struct TimerEntry {
    pub at_ms: u64,
    pub fire: fn(&crate::object::Heap, ObjectId),
    pub receiver: crate::object::WeakId,
}

pub struct ThreadHandle {
    pub id: ThreadId,
    pub sender: mpmc::Sender<Message>,
    pub root: Mutex<Option<ObjectId>>,
    pub timer: Mutex<Option<TimerEntry>>,
}

struct Registry {
    threads: HashMap<ThreadId, Arc<ThreadHandle>>,
    free_handles: Vec<Arc<ThreadHandle>>,
}

static REGISTRY: Mutex<Option<Registry>> = Mutex::new(None);
static REGISTRY_INIT: Once = Once::new();

fn registry() -> std::sync::MutexGuard<'static, Option<Registry>> {
    REGISTRY_INIT.call_once(|| {
        *REGISTRY.lock().unwrap() = Some(Registry {
            threads: HashMap::new(),
            free_handles: Vec::new(),
        });
    });
    REGISTRY.lock().unwrap()
}

pub fn thread_handle(id: ThreadId) -> Option<Arc<ThreadHandle>> {
    registry().as_ref().unwrap().threads.get(&id).cloned()
}

/// Spawn a new language thread rooted at `root`, running `dispatch` for
/// every message the thread receives. Returns the new thread's id.
pub fn spawn_thread(
    heap: Arc<crate::object::Heap>,
    root: ObjectId,
    dispatch: fn(&crate::object::Heap, &Message),
) -> ThreadId {
    let id = ThreadId(NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed));
    let (tx, rx) = mpmc::channel();
    let handle = Arc::new(ThreadHandle {
        id,
        sender: tx,
        root: Mutex::new(Some(root)),
        timer: Mutex::new(None),
    });

    {
        let mut guard = registry();
        guard.as_mut().unwrap().threads.insert(id, handle.clone());
    }

    ACTIVE_THREADS.fetch_add(1, Ordering::Relaxed);
    TOTAL_SPAWNED.fetch_add(1, Ordering::Relaxed);
    let active = ACTIVE_THREADS.load(Ordering::Relaxed);
    let mut peak = PEAK_THREADS.load(Ordering::Relaxed);
    while active > peak {
        match PEAK_THREADS.compare_exchange_weak(peak, active, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => break,
            Err(cur) => peak = cur,
        }
    }

    let handle_for_proc = handle.clone();
    let _ = coroutine::spawn(move || {
        thread_proc(heap, handle_for_proc, rx, dispatch);
        ACTIVE_THREADS.fetch_sub(1, Ordering::Relaxed);
        TOTAL_COMPLETED.fetch_add(1, Ordering::Relaxed);
    });

    id
}

/// Run the main thread's message loop inline (it is never spawned as its
/// own coroutine: `agc`'s entry point calls this directly after seeding the
/// root object).
pub fn handle_main_thread(
    heap: Arc<crate::object::Heap>,
    root: ObjectId,
    rx: mpmc::Receiver<Message>,
    handle: Arc<ThreadHandle>,
    dispatch: fn(&crate::object::Heap, &Message),
) {
    *handle.root.lock().unwrap() = Some(root);
    thread_proc(heap, handle, rx, dispatch);
}

fn thread_proc(
    heap: Arc<crate::object::Heap>,
    handle: Arc<ThreadHandle>,
    rx: mpmc::Receiver<Message>,
    dispatch: fn(&crate::object::Heap, &Message),
) {
    loop {
        let deadline = handle.timer.lock().unwrap().as_ref().map(|t| t.at_ms);

        let msg = match deadline {
            Some(at_ms) => {
                let now_ms = now_millis();
                let wait = at_ms.saturating_sub(now_ms);
                match rx.recv_timeout(Duration::from_millis(wait)) {
                    Ok(m) => Some(m),
                    Err(_) => None, // timed out: fall through to fire the timer
                }
            }
            None => rx.recv().ok(),
        };

        match msg {
            Some(Message::Shutdown) => {
                let root = handle.root.lock().unwrap().take();
                crate::rc::release_own(&heap, root);
                *handle.timer.lock().unwrap() = None;
                crate::rc::flush_retain_release(&heap);
                break;
            }
            Some(m) => dispatch(&heap, &m),
            None => {
                // recv_timeout expired with no message: the armed timer is due.
                let due = handle.timer.lock().unwrap().take();
                if let Some(entry) = due
                    && now_millis() >= entry.at_ms
                    && let Some(target) = crate::weak::deref_weak(&heap, Some(entry.receiver))
                {
                    (entry.fire)(&heap, target);
                    crate::rc::release_pin(&heap, Some(target));
                }
            }
        }
    }
}

fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// `postTimer`: arm (or replace) the thread's single pending timer.
/// Returns `false` if the receiver's thread has already shut down.
pub fn post_timer(
    receiver_thread: ThreadId,
    at_ms: u64,
    fire: fn(&crate::object::Heap, ObjectId),
    receiver: crate::object::WeakId,
) -> bool {
    let Some(handle) = thread_handle(receiver_thread) else {
        return false;
    };
    *handle.timer.lock().unwrap() = Some(TimerEntry { at_ms, fire, receiver });
    let _ = handle.sender.send(Message::WakeForTimer);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{ClassId, Heap, Object};
    use std::sync::atomic::AtomicUsize;

    static RECEIVED: AtomicUsize = AtomicUsize::new(0);

    fn counting_dispatch(_heap: &crate::object::Heap, msg: &Message) {
        if let Message::Call { .. } = msg {
            RECEIVED.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn spawn_thread_processes_posted_message_then_shuts_down() {
        let heap = Arc::new(Heap::new());
        let root = {
            let mut inner = heap.inner.lock().unwrap();
            inner.objects.insert(Object::new(ClassId(1), vec![], None))
        };
        let before = RECEIVED.load(Ordering::SeqCst);
        let id = spawn_thread(heap.clone(), root, counting_dispatch);
        let handle = thread_handle(id).unwrap();

        handle
            .sender
            .send(Message::Call {
                receiver: crate::weak::mk_weak(&heap, Some(root), Some(id)).unwrap(),
                entry: 0,
                params: vec![],
            })
            .unwrap();
        handle.sender.send(Message::Shutdown).unwrap();

        // Give the coroutine scheduler a moment to drain the mailbox.
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(RECEIVED.load(Ordering::SeqCst), before + 1);
    }
}
