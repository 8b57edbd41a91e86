//! Cross-thread heap statistics registry.
//!
//! The object heap and weak-block heap are owned by a single global
//! mutex (see `ag-runtime::rc`), but per-thread counters still need a
//! home: the scheduler's SIGQUIT handler (see `ag-runtime::scheduler`)
//! reports live object counts without being able to borrow into another
//! thread's locals. Each worker thread claims an exclusive slot here and
//! updates it with a plain atomic store; the handler thread only reads.
//!
//! ```text
//! ┌───────────────────────────────────────────────────┐
//! │            HeapStatsRegistry (global)              │
//! ├───────────────────────────────────────────────────┤
//! │ slots: [HeapSlot; MAX_THREADS]                     │
//! │  Slot 0 (Thread A): live_objects, peak_objects      │
//! │  Slot 1 (Thread B): live_objects, peak_objects      │
//! └───────────────────────────────────────────────────┘
//! ```

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};

const MAX_THREADS: usize = 64;

#[derive(Debug)]
pub struct HeapSlot {
    /// Thread ID, 0 meaning the slot is free.
    pub thread_id: AtomicU64,
    pub live_objects: AtomicU64,
    pub peak_objects: AtomicU64,
    pub live_weak_blocks: AtomicU64,
}

impl HeapSlot {
    const fn new() -> Self {
        Self {
            thread_id: AtomicU64::new(0),
            live_objects: AtomicU64::new(0),
            peak_objects: AtomicU64::new(0),
            live_weak_blocks: AtomicU64::new(0),
        }
    }
}

pub struct HeapStatsRegistry {
    slots: Box<[HeapSlot]>,
    pub overflow_count: AtomicU64,
}

impl HeapStatsRegistry {
    fn new(capacity: usize) -> Self {
        let slots: Vec<HeapSlot> = (0..capacity).map(|_| HeapSlot::new()).collect();
        Self {
            slots: slots.into_boxed_slice(),
            overflow_count: AtomicU64::new(0),
        }
    }

    /// Claim a slot for the current thread. Returns `None` once the
    /// registry is full; callers degrade to not reporting per-thread
    /// detail rather than failing.
    pub fn register(&self) -> Option<usize> {
        let thread_id = current_thread_id();
        for (idx, slot) in self.slots.iter().enumerate() {
            if slot
                .thread_id
                .compare_exchange(0, thread_id, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                return Some(idx);
            }
        }
        self.overflow_count.fetch_add(1, Ordering::Relaxed);
        None
    }

    #[inline]
    pub fn update_objects(&self, slot_idx: usize, live_objects: usize) {
        if let Some(slot) = self.slots.get(slot_idx) {
            let count = live_objects as u64;
            slot.live_objects.store(count, Ordering::Relaxed);

            let mut peak = slot.peak_objects.load(Ordering::Relaxed);
            while count > peak {
                match slot.peak_objects.compare_exchange_weak(
                    peak,
                    count,
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => break,
                    Err(current) => peak = current,
                }
            }
        }
    }

    #[inline]
    pub fn update_weak_blocks(&self, slot_idx: usize, live_weak_blocks: usize) {
        if let Some(slot) = self.slots.get(slot_idx) {
            slot.live_weak_blocks
                .store(live_weak_blocks as u64, Ordering::Relaxed);
        }
    }

    pub fn aggregate_stats(&self) -> AggregateHeapStats {
        let mut total_live_objects: u64 = 0;
        let mut total_peak_objects: u64 = 0;
        let mut total_weak_blocks: u64 = 0;
        let mut active_threads: usize = 0;

        for slot in self.slots.iter() {
            if slot.thread_id.load(Ordering::Acquire) > 0 {
                active_threads += 1;
                total_live_objects += slot.live_objects.load(Ordering::Relaxed);
                total_peak_objects += slot.peak_objects.load(Ordering::Relaxed);
                total_weak_blocks += slot.live_weak_blocks.load(Ordering::Relaxed);
            }
        }

        AggregateHeapStats {
            active_threads,
            total_live_objects,
            total_peak_objects,
            total_weak_blocks,
            overflow_count: self.overflow_count.load(Ordering::Relaxed),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AggregateHeapStats {
    pub active_threads: usize,
    pub total_live_objects: u64,
    pub total_peak_objects: u64,
    pub total_weak_blocks: u64,
    pub overflow_count: u64,
}

static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static THIS_THREAD_ID: u64 = NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed);
}

fn current_thread_id() -> u64 {
    THIS_THREAD_ID.with(|&id| id)
}

static HEAP_REGISTRY: OnceLock<HeapStatsRegistry> = OnceLock::new();

pub fn heap_registry() -> &'static HeapStatsRegistry {
    HEAP_REGISTRY.get_or_init(|| HeapStatsRegistry::new(MAX_THREADS))
}

thread_local! {
    static SLOT_INDEX: std::cell::Cell<Option<usize>> = const { std::cell::Cell::new(None) };
}

pub fn get_or_register_slot() -> Option<usize> {
    SLOT_INDEX.with(|cell| {
        if let Some(idx) = cell.get() {
            Some(idx)
        } else {
            let idx = heap_registry().register();
            cell.set(idx);
            idx
        }
    })
}

#[inline]
pub fn report_live_objects(live_objects: usize) {
    if let Some(idx) = SLOT_INDEX.with(|cell| cell.get()) {
        heap_registry().update_objects(idx, live_objects);
    }
}

#[inline]
pub fn report_live_weak_blocks(live_weak_blocks: usize) {
    if let Some(idx) = SLOT_INDEX.with(|cell| cell.get()) {
        heap_registry().update_weak_blocks(idx, live_weak_blocks);
    }
}
