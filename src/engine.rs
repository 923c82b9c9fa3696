use std::{
    net::{Ipv4Addr, SocketAddrV4},
    sync::Arc,
};

use tracing::debug;

use crate::{
    callbacks::SessionCallbacks,
    discovery::{sanitize_device_name, DiscoveryTable},
    protocol::{
        ChangeSettingsMessage, ClientMessage, Fragment, StreamControlMessage, TimeSyncMessage,
        CONNECTION_ACK,
    },
    session::SessionShared,
    time::{now_us, IDLE_TIMEOUT_US},
    tracking::TrackingSnapshot,
};

/// `SessionSettings` (§3): the pair of fields mirrored to the client as a
/// ChangeSettings datagram whenever either changes via a control command.
#[derive(Default)]
struct SessionSettings {
    test_mode: i32,
    suspend: i32,
}

/// One outbound UDP datagram the engine wants sent. The engine never touches
/// a socket directly — the thread host drains these and calls
/// `DatagramSocket::send_to` against the current client address.
pub struct Outbound {
    pub bytes: Vec<u8>,
}

impl Outbound {
    fn of(bytes: impl Into<Vec<u8>>) -> Self {
        Self { bytes: bytes.into() }
    }
}

/// The state machine, request table, liveness tracking, time sync, and
/// control-command dispatch of §4.5. Owns everything except the sockets
/// themselves and the thread that drives the event loop.
pub struct SessionEngine {
    shared: Arc<SessionShared>,
    tracking: Arc<TrackingSnapshot>,
    discovery: DiscoveryTable,
    settings: SessionSettings,
    /// Updated on every accepted inbound datagram from the connected client
    /// (§3 invariant 5); read-compared against [`IDLE_TIMEOUT_US`] once per
    /// loop iteration. Lives here rather than in `SessionShared` because only
    /// the event-loop thread ever touches it.
    last_seen_us: u64,
}

impl Default for SessionEngine {
    fn default() -> Self {
        Self {
            shared: Arc::new(SessionShared::new()),
            tracking: Arc::new(TrackingSnapshot::new()),
            discovery: DiscoveryTable::new(),
            settings: SessionSettings::default(),
            last_seen_us: 0,
        }
    }
}

impl SessionEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared(&self) -> &SessionShared {
        &self.shared
    }

    /// Clones the `Arc` so the video producer thread can check
    /// `Connected ∧ Streaming` and allocate packet counters without holding
    /// a reference to the whole engine (§5: the only state the producer
    /// needs is the triple and the tracking mutex, never the discovery table
    /// or settings).
    pub fn shared_handle(&self) -> Arc<SessionShared> {
        Arc::clone(&self.shared)
    }

    pub fn tracking(&self) -> &TrackingSnapshot {
        &self.tracking
    }

    pub fn tracking_handle(&self) -> Arc<TrackingSnapshot> {
        Arc::clone(&self.tracking)
    }

    /// Connected/Streaming → Idle on §4.5's `now - LastSeen > 60s` rule.
    /// Called once per event-loop iteration before polling.
    pub fn check_idle_timeout(&mut self) {
        if !self.shared.is_connected() {
            return;
        }
        if now_us().saturating_sub(self.last_seen_us) > IDLE_TIMEOUT_US {
            debug!("session: idle timeout, returning to Idle");
            self.shared.invalidate_client();
        }
    }

    /// Routes one decoded inbound UDP datagram. `peer` is the datagram's
    /// source address; everything but Hello is gated on matching the current
    /// client (§3 invariant 2, §9 "single predicate" guidance).
    pub fn handle_datagram(&mut self, msg: ClientMessage, peer: SocketAddrV4) -> Vec<Outbound> {
        match msg {
            ClientMessage::Hello(hello) => {
                let name = sanitize_device_name(&hello.device_name);
                self.discovery.push(peer, name);
                Vec::new()
            }
            other => {
                if !self.shared.is_legit_client(peer) {
                    debug!(%peer, "session: dropping datagram from non-client address");
                    return Vec::new();
                }
                self.last_seen_us = now_us();
                self.handle_authorized(other)
            }
        }
    }

    fn handle_authorized(&mut self, msg: ClientMessage) -> Vec<Outbound> {
        match msg {
            ClientMessage::Hello(_) => unreachable!("Hello handled before the authorization gate"),
            ClientMessage::Tracking(tracking) => {
                self.tracking.store(tracking);
                Vec::new()
            }
            ClientMessage::TimeSync(sync) => self.handle_time_sync(sync),
            ClientMessage::StreamControl(control) => {
                self.handle_stream_control(control);
                Vec::new()
            }
        }
    }

    fn handle_time_sync(&mut self, msg: TimeSyncMessage) -> Vec<Outbound> {
        match msg.mode {
            0 => {
                let now = now_us();
                vec![Outbound::of(msg.reflect(now))]
            }
            2 => {
                let now = now_us();
                let rtt = now.saturating_sub(msg.server_time);
                let diff = now as i64 - (msg.client_time as i64 + rtt as i64 / 2);
                self.shared.set_time_diff(diff);
                Vec::new()
            }
            other => {
                debug!(mode = other, "session: ignoring unrecognized time-sync mode");
                Vec::new()
            }
        }
    }

    fn handle_stream_control(&self, msg: StreamControlMessage) {
        match msg.mode {
            StreamControlMessage::START => self.shared.set_streaming(true),
            StreamControlMessage::STOP => self.shared.set_streaming(false),
            other => debug!(mode = other, "session: ignoring unrecognized stream-control mode"),
        }
    }

    /// Fragments one video frame into wire-ready datagrams (§4.4), gated on
    /// `Connected ∧ Streaming` (§3 invariant 1). Called from the producer
    /// thread; packet counters are allocated from the shared atomic so the
    /// producer never races the loop for them.
    pub fn send_video_frame(
        &self,
        data: &[u8],
        presentation_time_us: u64,
        frame_index: u64,
    ) -> Vec<Fragment> {
        self.shared.fragment_if_streaming(data, presentation_time_us, frame_index)
    }

    /// Dispatches one line from the control channel (§4.5 command table).
    /// Returns the control-channel response text and any UDP datagrams the
    /// command triggers (ConnectionAck on `Connect`, ChangeSettings on
    /// `EnableTestMode`/`Suspend`).
    pub fn handle_command(
        &mut self,
        line: &str,
        callbacks: &dyn SessionCallbacks,
    ) -> (String, Vec<Outbound>) {
        let (command, args) = line.split_once(' ').unwrap_or((line, ""));

        match command {
            "EnableTestMode" => self.handle_settings_command(args, |s| &mut s.test_mode),
            "Suspend" => self.handle_settings_command(args, |s| &mut s.suspend),
            "GetRequests" => (self.handle_get_requests(), Vec::new()),
            "Connect" => self.handle_connect(args),
            "" => ("Fail\n".to_string(), Vec::new()),
            other => (callbacks.on_unknown_command(other, args), Vec::new()),
        }
    }

    /// Shared shape of `EnableTestMode`/`Suspend`: parse an integer, store it
    /// through `field`, and emit a ChangeSettings datagram if a client is
    /// currently set (§4.5 command table).
    fn handle_settings_command(
        &mut self,
        args: &str,
        field: impl FnOnce(&mut SessionSettings) -> &mut i32,
    ) -> (String, Vec<Outbound>) {
        let Ok(value) = args.trim().parse::<i32>() else {
            return ("Fail\n".to_string(), Vec::new());
        };
        *field(&mut self.settings) = value;

        let datagrams = if self.shared.is_connected() {
            let msg = ChangeSettingsMessage { test_mode: self.settings.test_mode, suspend: self.settings.suspend };
            vec![Outbound::of(msg.encode())]
        } else {
            Vec::new()
        };
        ("Success\n".to_string(), datagrams)
    }

    fn handle_get_requests(&self) -> String {
        let mut out = String::new();
        for entry in self.discovery.entries() {
            out.push_str(&entry.address.to_string());
            out.push(' ');
            out.push_str(entry.device_name_str());
            out.push('\n');
        }
        out
    }

    /// `Connect <ipv4>:<port>` (§4.5). Sets the client directly — Hello is
    /// not required first (§9 open question, preserved as intentional).
    fn handle_connect(&mut self, args: &str) -> (String, Vec<Outbound>) {
        let Ok(addr) = args.trim().parse::<SocketAddrV4>() else {
            return ("Fail\n".to_string(), Vec::new());
        };
        self.discovery.remove(addr);
        self.shared.set_client(addr);
        self.last_seen_us = now_us();
        ("Success\n".to_string(), vec![Outbound::of(CONNECTION_ACK)])
    }

    /// Three-line status dump (§6 `DumpConfig`).
    pub fn dump_config(&self) -> String {
        let client = self.shared.client();
        let connected = u8::from(client.is_some());
        let streaming = u8::from(self.shared.is_streaming().is_some());
        let client_str = client
            .map(|a| a.to_string())
            .unwrap_or_else(|| SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0).to_string());
        format!("Connected {connected}\nClient {client_str}\nStreaming {streaming}\n")
    }
}
