use std::{
    io,
    net::{SocketAddr, SocketAddrV4},
};

use mio::{net::UdpSocket, Interest, Registry, Token};
use tracing::debug;

use crate::error::StartupError;

/// Datagrams larger than this are truncated by the kernel and discarded
/// whole by us (§4.2: "Receive buffer size ≥ 2000 bytes; packets exceeding
/// this are truncated and discarded").
pub const RECV_BUFFER_SIZE: usize = 2000;

/// Bound, non-blocking UDP endpoint (§4.2).
///
/// Unlike the distilled spec's description, this type does not itself track
/// "the current client address" — that's centralized in
/// [`crate::session::SessionShared`] so the producer thread and the event
/// loop agree on one fact instead of two copies (see DESIGN.md). This type
/// is purely the socket primitive: bind, register, send, receive, shut down.
pub struct DatagramSocket {
    socket: UdpSocket,
}

impl DatagramSocket {
    /// Binds to `addr` and registers it with `registry` under `token`,
    /// interested in readability only (§4.2 `startup`).
    pub fn startup(addr: SocketAddrV4, registry: &Registry, token: Token) -> Result<Self, StartupError> {
        let mut socket = UdpSocket::bind(SocketAddr::V4(addr))
            .map_err(|source| StartupError::UdpBind { addr: addr.to_string(), source })?;
        registry
            .register(&mut socket, token, Interest::READABLE)
            .map_err(StartupError::Poller)?;
        Ok(Self { socket })
    }

    /// Receives one datagram into `buf`. Returns `Ok(None)` on would-block
    /// (§7: transient I/O, loop silently), truncating any datagram over
    /// [`RECV_BUFFER_SIZE`] per the kernel's UDP truncation semantics.
    pub fn recv(&self, buf: &mut [u8]) -> io::Result<Option<(usize, SocketAddr)>> {
        match self.socket.recv_from(buf) {
            Ok((len, peer)) => Ok(Some((len, peer))),
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Best-effort send to `peer`. Lost datagrams are not retried by this
    /// layer (§4.2 guarantees); failures are logged and swallowed by the
    /// caller, never propagated as a reason to tear down the session.
    pub fn send_to(&self, bytes: &[u8], peer: SocketAddrV4) {
        if let Err(err) = self.socket.send_to(bytes, SocketAddr::V4(peer)) {
            debug!(?err, %peer, "udp: send failed, dropping");
        }
    }

    /// Unblocks the poller and closes the socket (§4.2 `shutdown`). Dropping
    /// a `mio::net::UdpSocket` closes the underlying fd; deregistering first
    /// avoids a dangling registration if the `Poll` outlives this socket.
    pub fn shutdown(&mut self, registry: &Registry) {
        let _ = registry.deregister(&mut self.socket);
    }

    /// Duplicates the underlying file descriptor so the video producer
    /// thread can send on the same bound address/port without taking part in
    /// the event loop's poll registration.
    ///
    /// The clone is never registered with a `Poll` and is only ever used for
    /// `send_to`; mirrors `flux_network::tcp::stream::set_socket_buf_size`'s
    /// use of raw `libc` fd operations alongside the safe `mio` API.
    pub fn try_clone_for_sending(&self) -> io::Result<DatagramSocket> {
        use std::os::fd::{AsRawFd, FromRawFd};

        let fd = unsafe { libc::dup(self.socket.as_raw_fd()) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        let std_socket = unsafe { std::net::UdpSocket::from_raw_fd(fd) };
        std_socket.set_nonblocking(true)?;
        Ok(DatagramSocket { socket: UdpSocket::from_std(std_socket) })
    }
}
