use std::{
    io::{self, Read, Write},
    net::{SocketAddr, SocketAddrV4},
};

use mio::{net::TcpListener, net::TcpStream, Interest, Registry, Token};
use tracing::{debug, warn};

use crate::error::StartupError;

/// Local, line-delimited ASCII control channel (§4.3). Accepts at most one
/// supervisor connection at a time; a second incoming connection replaces
/// the first (the supervisor is assumed to be a single, cooperating
/// process — the distilled spec does not describe multi-supervisor
/// arbitration).
pub struct ControlChannel {
    listener: TcpListener,
    peer: Option<TcpStream>,
    rx_buf: Vec<u8>,
}

impl ControlChannel {
    pub fn startup(
        addr: SocketAddrV4,
        registry: &Registry,
        listener_token: Token,
    ) -> Result<Self, StartupError> {
        let mut listener = TcpListener::bind(SocketAddr::V4(addr))
            .map_err(|source| StartupError::ControlBind { addr: addr.to_string(), source })?;
        registry
            .register(&mut listener, listener_token, Interest::READABLE)
            .map_err(StartupError::Poller)?;
        Ok(Self { listener, peer: None, rx_buf: Vec::with_capacity(256) })
    }

    /// Accepts a pending connection if one is waiting; a no-op otherwise
    /// (§4.3: "`accept()` is non-blocking and idempotent"). Registers the new
    /// peer at `peer_token`, replacing and closing any previous peer.
    pub fn accept(&mut self, registry: &Registry, peer_token: Token) {
        loop {
            match self.listener.accept() {
                Ok((mut stream, addr)) => {
                    debug!(%addr, "control: supervisor connected");
                    if let Some(mut old) = self.peer.take() {
                        let _ = registry.deregister(&mut old);
                    }
                    if let Err(err) = registry.register(&mut stream, peer_token, Interest::READABLE) {
                        warn!(?err, "control: failed to register new peer");
                        continue;
                    }
                    self.rx_buf.clear();
                    self.peer = Some(stream);
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(err) => {
                    warn!(?err, "control: accept failed");
                    return;
                }
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        self.peer.is_some()
    }

    /// Reads everything currently available and returns complete lines
    /// (newline stripped). Partial tail bytes stay buffered until the next
    /// readable event (§4.3). Drops the peer on EOF/error.
    pub fn recv(&mut self) -> Vec<String> {
        let Some(stream) = self.peer.as_mut() else {
            return Vec::new();
        };

        let mut chunk = [0u8; 1024];
        loop {
            match stream.read(&mut chunk) {
                Ok(0) => {
                    self.drop_peer();
                    break;
                }
                Ok(n) => self.rx_buf.extend_from_slice(&chunk[..n]),
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) => {
                    debug!(?err, "control: read failed");
                    self.drop_peer();
                    break;
                }
            }
        }

        let mut lines = Vec::new();
        while let Some(pos) = self.rx_buf.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.rx_buf.drain(..=pos).collect();
            let line = &line[..line.len() - 1];
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            lines.push(String::from_utf8_lossy(line).into_owned());
        }
        lines
    }

    /// Writes `response` to the current peer. If the peer has disconnected
    /// the response is silently dropped (§4.3).
    pub fn send(&mut self, response: &str) {
        let Some(stream) = self.peer.as_mut() else {
            return;
        };
        if let Err(err) = stream.write_all(response.as_bytes()) {
            debug!(?err, "control: write failed, dropping peer");
            self.drop_peer();
        }
    }

    fn drop_peer(&mut self) {
        self.peer = None;
        self.rx_buf.clear();
    }

    pub fn shutdown(&mut self, registry: &Registry) {
        if let Some(mut peer) = self.peer.take() {
            let _ = registry.deregister(&mut peer);
        }
        let _ = registry.deregister(&mut self.listener);
    }
}
