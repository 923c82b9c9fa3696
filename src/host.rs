use std::{
    net::{SocketAddr, SocketAddrV4},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::JoinHandle,
    time::Duration,
};

use tracing::{debug, info};

use crate::{
    callbacks::SessionCallbacks,
    config::SessionConfig,
    engine::SessionEngine,
    error::StartupError,
    net::{ControlChannel, DatagramSocket},
    poller::{Poller, CONTROL_LISTENER_TOKEN, CONTROL_PEER_TOKEN, UDP_TOKEN},
    priority::{thread_boot, ThreadPriority},
    protocol::ClientMessage,
    session::SessionShared,
    tracking::TrackingSnapshot,
};

/// How long the loop blocks in `Poller::wait` between idle-timeout checks.
/// Bounds the worst-case delay between `Stop` and the worker thread
/// noticing, without the teacher's original approach of shutting down
/// sockets to unblock a blocking wait — that approach fights the video
/// producer's need for an independent, unregistered socket clone. A bounded
/// wait plus an exit flag gets the same cooperative-cancellation behavior
/// §4.6 asks for with none of that conflict (see DESIGN.md).
const POLL_TIMEOUT: Duration = Duration::from_millis(200);

/// Handle the video producer thread uses to push frames, independent of the
/// event loop (§5: the producer only ever needs the session triple and a
/// socket to send on).
pub struct VideoProducer {
    shared: Arc<SessionShared>,
    socket: DatagramSocket,
}

impl VideoProducer {
    /// Fragments `data` and sends each fragment to the current client.
    /// A no-op, per §3 invariant 1, unless the session is `Connected ∧
    /// Streaming` at the moment this is called.
    pub fn send_video_frame(&self, data: &[u8], presentation_time_us: u64, frame_index: u64) {
        let Some(client) = self.shared.is_streaming() else {
            return;
        };
        for fragment in self.shared.fragment_if_streaming(data, presentation_time_us, frame_index) {
            self.socket.send_to(&fragment.bytes, client);
        }
    }
}

/// Handle the pose consumer thread uses to read the latest tracking snapshot
/// (§5).
pub struct PoseConsumer {
    tracking: Arc<TrackingSnapshot>,
}

impl PoseConsumer {
    pub fn tracking_snapshot(&self) -> Option<crate::protocol::TrackingMessage> {
        self.tracking.get()
    }
}

/// Owns the event-loop worker thread and its lifecycle (§4.6). Constructed
/// with the host's [`SessionConfig`] and [`SessionCallbacks`]; `start`
/// spawns the thread (below-normal priority, per §4.6) and binds both
/// sockets, `stop` joins it.
pub struct ThreadHost {
    exit: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
    shared: Arc<SessionShared>,
    tracking: Arc<TrackingSnapshot>,
    video_socket: Option<DatagramSocket>,
}

impl ThreadHost {
    pub fn new() -> Self {
        Self {
            exit: Arc::new(AtomicBool::new(false)),
            join: None,
            shared: Arc::new(SessionShared::new()),
            tracking: Arc::new(TrackingSnapshot::new()),
            video_socket: None,
        }
    }

    /// Binds both sockets and spawns the worker thread. Returns once the
    /// sockets are bound and registered; the thread then runs the event
    /// loop of §2 until `stop` is called.
    pub fn start(
        &mut self,
        config: SessionConfig,
        callbacks: Arc<dyn SessionCallbacks>,
    ) -> Result<(), StartupError> {
        if self.join.is_some() {
            return Err(StartupError::AlreadyRunning);
        }

        let mut poller = Poller::new()?;

        let udp_addr = SocketAddrV4::new(config.udp_host, config.udp_port);
        let mut udp_socket = DatagramSocket::startup(udp_addr, poller.registry(), UDP_TOKEN)?;
        let video_socket = udp_socket
            .try_clone_for_sending()
            .map_err(|source| StartupError::UdpBind { addr: udp_addr.to_string(), source })?;

        let control_addr = SocketAddrV4::new(config.control_host, config.control_port);
        let mut control = ControlChannel::startup(control_addr, poller.registry(), CONTROL_LISTENER_TOKEN)?;

        let mut engine = SessionEngine::new();
        self.shared = engine.shared_handle();
        self.tracking = engine.tracking_handle();

        let exit = Arc::clone(&self.exit);
        exit.store(false, Ordering::SeqCst);

        self.join = Some(std::thread::spawn(move || {
            thread_boot(None, ThreadPriority::Low);
            info!("session: event loop starting");
            run_event_loop(&mut poller, &mut udp_socket, &mut control, &mut engine, &callbacks, &exit);
            udp_socket.shutdown(poller.registry());
            control.shutdown(poller.registry());
            info!("session: event loop stopped");
        }));

        self.video_socket = Some(video_socket);
        Ok(())
    }

    /// Cooperative shutdown (§4.6): flips the exit flag and joins. The loop
    /// notices within one [`POLL_TIMEOUT`] interval.
    pub fn stop(&mut self) {
        self.exit.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }

    /// Hands out a [`VideoProducer`] for the encoder-driving thread. Panics
    /// if called before `start`.
    pub fn video_producer(&self) -> VideoProducer {
        let socket = self
            .video_socket
            .as_ref()
            .expect("video_producer() called before start()")
            .try_clone_for_sending()
            .expect("failed to duplicate UDP socket for a second producer handle");
        VideoProducer { shared: Arc::clone(&self.shared), socket }
    }

    pub fn pose_consumer(&self) -> PoseConsumer {
        PoseConsumer { tracking: Arc::clone(&self.tracking) }
    }
}

impl Default for ThreadHost {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ThreadHost {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_event_loop(
    poller: &mut Poller,
    udp_socket: &mut DatagramSocket,
    control: &mut ControlChannel,
    engine: &mut SessionEngine,
    callbacks: &Arc<dyn SessionCallbacks>,
    exit: &AtomicBool,
) {
    // `poller.wait` ties `ready`'s lifetime to a mutable borrow of `poller`,
    // so `poller.registry()` can't be called again while a `ready` is still
    // in scope. A cloned `Registry` handle (referring to the same selector)
    // sidesteps that without restructuring the loop body.
    let registry = poller.registry().try_clone().expect("cloning a Registry handle cannot fail");
    let mut recv_buf = [0u8; crate::net::RECV_BUFFER_SIZE];

    while !exit.load(Ordering::Relaxed) {
        engine.check_idle_timeout();
        let ready = poller.wait(POLL_TIMEOUT);

        if ready.is_ready(UDP_TOKEN) {
            drain_udp(udp_socket, engine, &mut recv_buf, callbacks.as_ref());
        }
        if ready.is_ready(CONTROL_LISTENER_TOKEN) {
            control.accept(&registry, CONTROL_PEER_TOKEN);
        }
        if ready.is_ready(CONTROL_PEER_TOKEN) && control.is_connected() {
            drain_control(control, engine, udp_socket, callbacks.as_ref());
        }
    }
}

fn drain_udp(
    socket: &DatagramSocket,
    engine: &mut SessionEngine,
    buf: &mut [u8],
    callbacks: &dyn SessionCallbacks,
) {
    loop {
        match socket.recv(buf) {
            Ok(Some((len, SocketAddr::V4(peer)))) => match ClientMessage::decode(&buf[..len]) {
                Ok(msg) => {
                    let is_tracking = matches!(msg, ClientMessage::Tracking(_));
                    let accepted = is_tracking && engine.shared().is_legit_client(peer);
                    for datagram in engine.handle_datagram(msg, peer) {
                        socket.send_to(&datagram.bytes, peer);
                    }
                    if accepted {
                        callbacks.on_pose_updated();
                    }
                }
                Err(err) => debug!(?err, %peer, "udp: dropping malformed datagram"),
            },
            Ok(Some((_, SocketAddr::V6(peer)))) => {
                debug!(%peer, "udp: dropping unexpected ipv6 datagram");
            }
            Ok(None) => break,
            Err(err) => {
                debug!(?err, "udp: recv failed");
                break;
            }
        }
    }
}

fn drain_control(
    control: &mut ControlChannel,
    engine: &mut SessionEngine,
    udp_socket: &DatagramSocket,
    callbacks: &dyn SessionCallbacks,
) {
    for line in control.recv() {
        let (response, outbound) = engine.handle_command(&line, callbacks);
        control.send(&response);
        if !outbound.is_empty() {
            if let Some(client) = engine.shared().client() {
                for datagram in outbound {
                    udp_socket.send_to(&datagram.bytes, client);
                }
            }
        }
    }
}
