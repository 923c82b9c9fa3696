use std::{
    net::SocketAddrV4,
    sync::atomic::{AtomicI64, AtomicU32, Ordering},
    sync::Mutex,
};

use crate::protocol::{fragment_frame, Fragment, PAYLOAD_SIZE};

/// Connection facts read by the video producer thread and written by the
/// event loop: the current client address and whether streaming is active
/// (§3 `SessionState`, §5 "client endpoint, Connected, Streaming ... written
/// by the loop, read by the producer").
///
/// The distilled spec's Design Notes call out that the original implementation
/// left these as three independently racy fields and recommend unifying them
/// behind one lock so the producer observes a single consistent fact instead
/// of three fields that can individually tear relative to each other. This is
/// that unification: `client` and `streaming` share one small `Mutex`
/// (`packet_counter` is independently monotonic and does not need to be
/// consistent with the other two, so it stays a separate atomic, matching
/// §5's "a small mutex or atomics covering the triple is sufficient").
#[derive(Default)]
struct ConnectionState {
    client: Option<SocketAddrV4>,
    streaming: bool,
}

pub struct SessionShared {
    connection: Mutex<ConnectionState>,
    packet_counter: AtomicU32,
    /// Signed microsecond clock offset (§3 `TimeDiff`, §9: stored signed here
    /// rather than the original's unsigned field, which silently wraps when
    /// `server < client`). Written by the event loop on every mode-2
    /// time-sync exchange; read by whichever thread needs to translate a
    /// timestamp between clocks.
    time_diff_us: AtomicI64,
}

impl Default for SessionShared {
    fn default() -> Self {
        Self {
            connection: Mutex::new(ConnectionState::default()),
            packet_counter: AtomicU32::new(0),
            time_diff_us: AtomicI64::new(0),
        }
    }
}

impl SessionShared {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idle → Connected (or re-Connect to a new address). Streaming is left
    /// untouched: control of streaming is independent per §4.5.
    pub fn set_client(&self, addr: SocketAddrV4) {
        let mut guard = self.connection.lock().unwrap_or_else(|p| p.into_inner());
        guard.client = Some(addr);
    }

    /// Connected/Streaming → Idle on idle timeout or explicit stop (§4.5).
    /// Clears both the client and the streaming flag in one step so the
    /// producer never observes `client = None, streaming = true`.
    pub fn invalidate_client(&self) {
        let mut guard = self.connection.lock().unwrap_or_else(|p| p.into_inner());
        guard.client = None;
        guard.streaming = false;
    }

    pub fn set_streaming(&self, streaming: bool) {
        let mut guard = self.connection.lock().unwrap_or_else(|p| p.into_inner());
        guard.streaming = streaming;
    }

    pub fn client(&self) -> Option<SocketAddrV4> {
        self.connection.lock().unwrap_or_else(|p| p.into_inner()).client
    }

    pub fn is_connected(&self) -> bool {
        self.client().is_some()
    }

    /// `Connected ∧ Streaming` — the single gate `send_video_frame` checks
    /// (§4.5 invariant 1: "Streaming ⇒ Connected").
    pub fn is_streaming(&self) -> Option<SocketAddrV4> {
        let guard = self.connection.lock().unwrap_or_else(|p| p.into_inner());
        (guard.streaming && guard.client.is_some()).then_some(guard.client).flatten()
    }

    /// Byte-equal address+port match against the current client (§4.2
    /// `isLegitClient`).
    pub fn is_legit_client(&self, addr: SocketAddrV4) -> bool {
        self.client() == Some(addr)
    }

    /// Allocates `count` consecutive packet-counter values, returning the
    /// first. Monotonic for the lifetime of the process; does not reset on
    /// reconnect (§3 `PacketCounter`).
    pub fn next_packet_counters(&self, count: u32) -> u32 {
        self.packet_counter.fetch_add(count, Ordering::Relaxed)
    }

    pub fn set_time_diff(&self, diff_us: i64) {
        self.time_diff_us.store(diff_us, Ordering::Relaxed);
    }

    pub fn time_diff(&self) -> i64 {
        self.time_diff_us.load(Ordering::Relaxed)
    }

    /// `server_time = client_time + TimeDiff` (§4.5).
    pub fn client_to_server(&self, client_time_us: u64) -> u64 {
        (client_time_us as i64).wrapping_add(self.time_diff()) as u64
    }

    /// `client_time = server_time - TimeDiff` (§4.5).
    pub fn server_to_client(&self, server_time_us: u64) -> u64 {
        (server_time_us as i64).wrapping_sub(self.time_diff()) as u64
    }

    /// Fragments one video frame for the current client, or produces nothing
    /// if the session isn't `Connected ∧ Streaming` (§3 invariant 1).
    /// Shared by [`crate::engine::SessionEngine::send_video_frame`] and
    /// [`crate::host::VideoProducer::send_video_frame`] so the gating and
    /// packet-counter allocation live in exactly one place regardless of
    /// which thread is calling in.
    pub fn fragment_if_streaming(
        &self,
        data: &[u8],
        presentation_time_us: u64,
        frame_index: u64,
    ) -> Vec<Fragment> {
        if self.is_streaming().is_none() {
            return Vec::new();
        }
        let chunk_count = data.len().div_ceil(PAYLOAD_SIZE).max(1) as u32;
        let start_counter = self.next_packet_counters(chunk_count);
        fragment_frame(data, presentation_time_us, frame_index, start_counter)
    }
}
