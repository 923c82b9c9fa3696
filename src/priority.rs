use core_affinity::CoreId;
#[cfg(target_os = "linux")]
use libc::{sched_param, sched_setscheduler, SCHED_BATCH};
use tracing::warn;

/// The event-loop thread's priority relative to the OS default (§4.6:
/// "below-normal priority"). `Low` requests `SCHED_BATCH`, a non-realtime
/// policy the kernel schedules behind normally-prioritized threads — unlike
/// `SCHED_FIFO`, it needs no elevated capability to set.
#[derive(Clone, Copy, Debug)]
pub enum ThreadPriority {
    OsDefault,
    Low,
}

#[cfg(target_os = "linux")]
impl ThreadPriority {
    fn to_sched_param(self) -> Option<sched_param> {
        match self {
            ThreadPriority::OsDefault => None,
            ThreadPriority::Low => Some(sched_param { sched_priority: 0 }),
        }
    }
}

#[cfg(target_os = "linux")]
fn set_thread_prio(prio: ThreadPriority) {
    if let Some(param) = prio.to_sched_param() {
        unsafe {
            let code = sched_setscheduler(0, SCHED_BATCH, &param);
            if code != 0 {
                warn!(%code, ?param, "couldn't set thread priority");
            }
        }
    }
}

#[cfg(not(target_os = "linux"))]
fn set_thread_prio(prio: ThreadPriority) {
    if !matches!(prio, ThreadPriority::OsDefault) {
        warn!(?prio, "thread priority setting only supported on linux");
    }
}

fn set_thread_affinity(core: usize) {
    if !core_affinity::set_for_current(CoreId { id: core }) {
        warn!(?core, "couldn't set core affinity");
    }
}

/// Applies core affinity (if requested) and thread priority before a worker
/// thread enters its event loop.
pub fn thread_boot(core: Option<usize>, prio: ThreadPriority) {
    if let Some(core) = core {
        set_thread_affinity(core);
    }
    set_thread_prio(prio);
}
