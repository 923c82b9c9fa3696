//! Wall-clock helpers.
//!
//! The teacher workspace's `flux_timing::Instant`/`Nanos` are rdtsc-cycle
//! counters calibrated per-socket for intra-machine latency measurement; they
//! are the wrong tool here because the client clock-sync algorithm (§4.5)
//! needs a timestamp that means the same thing to both ends of the wire, not
//! a CPU cycle count local to this machine. This module is a thin
//! wall-clock-microseconds helper in the same spirit as
//! `flux_timing::instant`, minus the rdtsc plumbing.

use std::time::{SystemTime, UNIX_EPOCH};

/// Microseconds since the Unix epoch, matching the original implementation's
/// `GetTimestampUs()` (a wall-clock, not a monotonic, source).
#[inline]
pub fn now_us() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_micros() as u64
}

/// Idle timeout per §4.5: 60 seconds with no accepted inbound traffic.
pub const IDLE_TIMEOUT_US: u64 = 60 * 1_000_000;
