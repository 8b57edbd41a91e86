//! Message posting protocol (§4.7): mirrors the
//! `ag_prepare_post` / `ag_post_param` / `ag_post_own_param` /
//! `ag_post_weak_param` / `ag_finalize_post` family, a message built up
//! parameter-by-parameter against a pending `PostBuilder` that only becomes
//! visible to the receiver thread once finalized, so a partially-constructed
//! call is never observed.

use crate::mt::bound_own_to_thread;
use crate::object::{Heap, ObjectId, WeakId};
use crate::scheduler::{thread_handle, ThreadId};

/// One parameter of a posted message. Cross-thread ownership/weak rebinding
/// happens at post time (`finalize_post_message`), not at dispatch time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Param {
    Int(i64),
    Float(f64),
    Bool(bool),
    Own(Option<ObjectId>),
    Shared(Option<ObjectId>),
    Weak(Option<WeakId>),
}

#[derive(Debug, Clone)]
pub enum Message {
    /// Dispatch `entry` on `receiver` with `params`. `entry` indexes into
    /// the compiler-generated trampoline table; the runtime never
    /// interprets it directly.
    Call {
        receiver: WeakId,
        entry: u32,
        params: Vec<Param>,
    },
    /// Re-check the armed timer (sent after `post_timer` arms or replaces
    /// one, so a thread parked on `recv_timeout` wakes against the new
    /// deadline instead of the stale one).
    WakeForTimer,
    /// Ask the thread to drop its root and exit its message loop.
    Shutdown,
}

/// A message under construction. Builder methods consume and return `self`
/// so a post reads as a straight-line sequence: prepare, append each
/// parameter, finalize.
pub struct PostBuilder {
    receiver_thread: ThreadId,
    receiver: WeakId,
    entry: u32,
    params: Vec<Param>,
}

/// `ag_prepare_post_from_ag`: begin building a call to `receiver` (on
/// `receiver_thread`) for trampoline entry `entry`.
pub fn prepare_post_from_ag(receiver_thread: ThreadId, receiver: WeakId, entry: u32) -> PostBuilder {
    PostBuilder {
        receiver_thread,
        receiver,
        entry,
        params: Vec::new(),
    }
}

impl PostBuilder {
    /// `ag_post_param_from_ag`: append a plain (Int/Float/Bool) parameter.
    pub fn post_param(mut self, param: Param) -> Self {
        debug_assert!(
            !matches!(param, Param::Own(_) | Param::Weak(_)),
            "use post_own_param/post_weak_param for ownership-carrying parameters"
        );
        self.params.push(param);
        self
    }

    /// `ag_post_own_param_from_ag`: append an owning parameter. The whole
    /// subgraph reachable from `obj` is rebound to the receiver thread once
    /// the message is finalized.
    pub fn post_own_param(mut self, obj: Option<ObjectId>) -> Self {
        self.params.push(Param::Own(obj));
        self
    }

    /// `ag_post_weak_param_from_ag`: append a weak parameter as-is; weak
    /// blocks are never rebound by a post (§4.7).
    pub fn post_weak_param(mut self, w: Option<WeakId>) -> Self {
        self.params.push(Param::Weak(w));
        self
    }

    /// `ag_finalize_post`: rebind every owning parameter's subgraph to the
    /// receiver thread, then hand the finished message to its mailbox.
    /// Returns `false` if the receiver thread has already shut down.
    pub fn finalize_post_message(self, heap: &Heap) -> bool {
        for param in &self.params {
            if let Param::Own(Some(obj)) = param {
                bound_own_to_thread(heap, Some(*obj), self.receiver_thread);
            }
        }

        let Some(handle) = thread_handle(self.receiver_thread) else {
            return false;
        };

        handle
            .sender
            .send(Message::Call {
                receiver: self.receiver,
                entry: self.entry,
                params: self.params,
            })
            .is_ok()
    }
}
