//! Runtime diagnostics for production debugging.
//!
//! Installs a SIGQUIT (`kill -3`) handler that dumps live object/weak-block
//! counts and thread counters to stderr, in the spirit of a JVM thread
//! dump, without stopping the process. Retargeted from strand/channel
//! counts onto this runtime's heap and thread-runtime counters
//! (`ag_core::diagnostics`, `crate::scheduler`).

use std::sync::Once;
use std::sync::atomic::Ordering;

use ag_core::diagnostics::heap_registry;

static SIGNAL_HANDLER_INIT: Once = Once::new();

/// Installs the SIGQUIT handler. Idempotent; safe to call from every
/// thread that calls `crate::init()`.
pub fn install_signal_handler() {
    SIGNAL_HANDLER_INIT.call_once(|| {
        #[cfg(unix)]
        {
            unsafe {
                let _ = signal_hook::low_level::register(signal_hook::consts::SIGQUIT, || {
                    dump_diagnostics();
                });
            }
        }
        #[cfg(not(unix))]
        {
            // No signal handling outside Unix; callers can still invoke
            // dump_diagnostics() directly.
        }
    });
}

/// Dumps runtime diagnostics to stderr. Callable directly (e.g. from a
/// test or a foreign binding's own debug command), not only via SIGQUIT.
pub fn dump_diagnostics() {
    use std::io::Write;
    let mut out = std::io::stderr().lock();

    let _ = writeln!(out, "\n=== Runtime Diagnostics ===");
    let _ = writeln!(out, "Timestamp: {:?}", std::time::SystemTime::now());

    let _ = writeln!(out, "\n[Threads]");
    let _ = writeln!(
        out,
        "  Active: {}  Spawned: {}  Completed: {}  Peak: {}",
        crate::scheduler::ACTIVE_THREADS.load(Ordering::Relaxed),
        crate::scheduler::TOTAL_SPAWNED.load(Ordering::Relaxed),
        crate::scheduler::TOTAL_COMPLETED.load(Ordering::Relaxed),
        crate::scheduler::PEAK_THREADS.load(Ordering::Relaxed),
    );

    let stats = heap_registry().aggregate_stats();
    let _ = writeln!(out, "\n[Heap]");
    let _ = writeln!(out, "  Reporting threads: {}", stats.active_threads);
    let _ = writeln!(out, "  Live objects:      {}", stats.total_live_objects);
    let _ = writeln!(out, "  Peak objects:      {}", stats.total_peak_objects);
    let _ = writeln!(out, "  Live weak blocks:  {}", stats.total_weak_blocks);
    if stats.overflow_count > 0 {
        let _ = writeln!(out, "  Registry overflow: {} (raise MAX_THREADS)", stats.overflow_count);
    }

    let _ = writeln!(out, "\n=== End Diagnostics ===\n");
}

/// Updates this thread's slot in the heap-stats registry. A generated
/// program (or this crate's own `Heap`-driving tests) calls this after a
/// batch of allocations/disposals.
pub fn report_heap_snapshot(live_objects: usize, live_weak_blocks: usize) {
    if ag_core::diagnostics::get_or_register_slot().is_some() {
        ag_core::diagnostics::report_live_objects(live_objects);
        ag_core::diagnostics::report_live_weak_blocks(live_weak_blocks);
    }
}

#[cfg(feature = "report-json")]
pub fn diagnostics_json() -> serde_json::Value {
    let stats = heap_registry().aggregate_stats();
    serde_json::json!({
        "threads": {
            "active": crate::scheduler::ACTIVE_THREADS.load(Ordering::Relaxed),
            "spawned": crate::scheduler::TOTAL_SPAWNED.load(Ordering::Relaxed),
            "completed": crate::scheduler::TOTAL_COMPLETED.load(Ordering::Relaxed),
            "peak": crate::scheduler::PEAK_THREADS.load(Ordering::Relaxed),
        },
        "heap": {
            "reporting_threads": stats.active_threads,
            "live_objects": stats.total_live_objects,
            "peak_objects": stats.total_peak_objects,
            "live_weak_blocks": stats.total_weak_blocks,
            "overflow_count": stats.overflow_count,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dump_diagnostics_does_not_panic() {
        dump_diagnostics();
    }

    #[test]
    fn install_signal_handler_is_idempotent() {
        install_signal_handler();
        install_signal_handler();
    }

    #[test]
    fn report_heap_snapshot_updates_registry() {
        report_heap_snapshot(5, 1);
        let stats = heap_registry().aggregate_stats();
        assert!(stats.total_live_objects >= 5);
    }
}
