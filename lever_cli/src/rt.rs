//! Real-time setup for the control thread (SCHED_FIFO, affinity, mlockall).
//!
//! Everything here is best-effort: failures are logged and the session runs
//! with normal scheduling.

use crate::cli::RtLock;

#[cfg(feature = "rt")]
pub fn setup_rt_once(rt: bool, prio: Option<i32>, lock: RtLock, rt_cpu: Option<usize>) {
    use lever_hardware::rt::{MemLock, lock_memory, pin_to_cpu, set_thread_fifo};
    use std::sync::OnceLock;
    static RT_ONCE: OnceLock<()> = OnceLock::new();

    if !rt || RT_ONCE.set(()).is_err() {
        return;
    }

    let mode = match lock {
        RtLock::None => MemLock::None,
        RtLock::Current => MemLock::Current,
        RtLock::All => MemLock::All,
    };
    match lock_memory(mode) {
        Ok(()) => tracing::info!(?lock, "memory locked"),
        Err(e) => tracing::warn!(error = %e, ?lock, "memory lock failed; continuing"),
    }

    let cpu = rt_cpu.unwrap_or(0);
    match pin_to_cpu(cpu) {
        Ok(()) => tracing::info!(cpu, "pinned to CPU"),
        Err(e) => tracing::warn!(error = %e, cpu, "CPU affinity unchanged"),
    }

    // Called on the thread that goes on to run the control loop.
    match set_thread_fifo(prio) {
        Ok(applied) => tracing::info!(prio = applied, "SCHED_FIFO enabled"),
        Err(e) => tracing::warn!(error = %e, "SCHED_FIFO unavailable; running with normal scheduling"),
    }
}

#[cfg(not(feature = "rt"))]
pub fn setup_rt_once(rt: bool, _prio: Option<i32>, _lock: RtLock, _rt_cpu: Option<usize>) {
    if rt {
        tracing::warn!("--rt requested but this build lacks the `rt` feature; ignoring");
    }
}
