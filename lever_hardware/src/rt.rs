//! Real-time scheduling helpers (Linux SCHED_FIFO, CPU affinity, mlockall).
//!
//! These are best-effort: callers log failures and keep running with normal
//! scheduling rather than refusing to start.

use crate::error::{HwError, Result};

/// Which pages `lock_memory` pins.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum MemLock {
    None,
    Current,
    All,
}

/// Lock the process address space into RAM.
pub fn lock_memory(mode: MemLock) -> Result<()> {
    use nix::sys::mman::{MlockAllFlags, mlockall};
    let flags = match mode {
        MemLock::None => return Ok(()),
        MemLock::Current => MlockAllFlags::MCL_CURRENT,
        MemLock::All => MlockAllFlags::MCL_CURRENT | MlockAllFlags::MCL_FUTURE,
    };
    match mlockall(flags) {
        Ok(()) => Ok(()),
        // MCL_FUTURE is the part that usually trips RLIMIT_MEMLOCK.
        Err(first) if mode == MemLock::All => mlockall(MlockAllFlags::MCL_CURRENT).map_err(|e| {
            HwError::Realtime(format!(
                "mlockall(current|future) failed: {first}; fallback current failed: {e}"
            ))
        }),
        Err(e) => Err(HwError::Realtime(format!("mlockall(current) failed: {e}"))),
    }
}

/// Put the calling thread under SCHED_FIFO. `prio` is clamped to the
/// system range; `None` picks the maximum. Returns the applied priority.
#[cfg(target_os = "linux")]
pub fn set_thread_fifo(prio: Option<i32>) -> Result<i32> {
    let (min, max) = unsafe {
        let min = libc::sched_get_priority_min(libc::SCHED_FIFO);
        let max = libc::sched_get_priority_max(libc::SCHED_FIFO);
        if min < 0 || max < 0 { (1, 99) } else { (min, max) }
    };
    let applied = prio.unwrap_or(max).clamp(min, max);
    let param = libc::sched_param {
        sched_priority: applied,
    };
    let rc = unsafe { libc::pthread_setschedparam(libc::pthread_self(), libc::SCHED_FIFO, &param) };
    if rc != 0 {
        return Err(HwError::Realtime(format!(
            "pthread_setschedparam(SCHED_FIFO, {applied}) failed: {}; needs CAP_SYS_NICE or root",
            std::io::Error::from_raw_os_error(rc)
        )));
    }
    Ok(applied)
}

#[cfg(not(target_os = "linux"))]
pub fn set_thread_fifo(_prio: Option<i32>) -> Result<i32> {
    Err(HwError::Realtime(
        "SCHED_FIFO is only available on Linux".into(),
    ))
}

/// Pin the whole process to one CPU.
#[cfg(target_os = "linux")]
pub fn pin_to_cpu(cpu: usize) -> Result<()> {
    let capacity = std::mem::size_of::<libc::cpu_set_t>() * 8;
    if cpu >= capacity {
        return Err(HwError::Realtime(format!(
            "cpu {cpu} exceeds cpu_set_t capacity {capacity}"
        )));
    }
    let online = unsafe { libc::sysconf(libc::_SC_NPROCESSORS_ONLN) };
    if online < 1 || cpu as libc::c_long >= online {
        return Err(HwError::Realtime(format!(
            "cpu {cpu} is not online (online = {online})"
        )));
    }
    let rc = unsafe {
        let mut set: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_ZERO(&mut set);
        libc::CPU_SET(cpu, &mut set);
        libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &set)
    };
    if rc != 0 {
        return Err(HwError::Realtime(format!(
            "sched_setaffinity({cpu}) failed: {}",
            std::io::Error::last_os_error()
        )));
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
pub fn pin_to_cpu(_cpu: usize) -> Result<()> {
    Err(HwError::Realtime(
        "CPU affinity is only available on Linux".into(),
    ))
}
