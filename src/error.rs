use std::io;

use thiserror::Error;

/// Failures that can prevent the session core from starting up.
///
/// Per-datagram and per-command failures are not represented here: those are
/// logged and dropped in place (malformed/unauthorized datagrams, control
/// parse errors), never surfaced as a `Result`. Only conditions that prevent
/// the worker thread from starting at all are fatal.
#[derive(Error, Debug)]
pub enum StartupError {
    #[error("failed to bind UDP socket at {addr}: {source}")]
    UdpBind { addr: String, #[source] source: io::Error },

    #[error("failed to bind control channel at {addr}: {source}")]
    ControlBind { addr: String, #[source] source: io::Error },

    #[error("failed to set up poller: {0}")]
    Poller(#[source] io::Error),

    #[error("session worker thread already running")]
    AlreadyRunning,
}
