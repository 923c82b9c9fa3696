use std::time::Duration;

use mio::{Events, Poll, Token};
use tracing::warn;

use crate::error::StartupError;

/// Token assigned to the UDP video/telemetry socket.
pub const UDP_TOKEN: Token = Token(0);
/// Token assigned to the control-channel listener.
pub const CONTROL_LISTENER_TOKEN: Token = Token(1);
/// Token assigned to the control channel's one accepted peer.
pub const CONTROL_PEER_TOKEN: Token = Token(2);

/// Level-triggered readiness multiplexer over the UDP socket and the control
/// channel's listener/peer (§4.1). Registration happens once, at startup, on
/// the sockets themselves; this wrapper only owns the `Poll` instance and the
/// event buffer used to drain it.
pub struct Poller {
    poll: Poll,
    events: Events,
}

impl Poller {
    pub fn new() -> Result<Self, StartupError> {
        let poll = Poll::new().map_err(StartupError::Poller)?;
        Ok(Self { poll, events: Events::with_capacity(16) })
    }

    pub fn registry(&self) -> &mio::Registry {
        self.poll.registry()
    }

    /// Waits up to `timeout` for readiness on any registered source.
    ///
    /// A spurious wake with zero ready sources is not an error (§4.1);
    /// callers loop and re-check their own state (idle timeout, exit flag)
    /// regardless of whether anything was actually ready. A failure to wait
    /// is logged and retried rather than propagated, matching "Failure to
    /// wait is logged and retried".
    pub fn wait(&mut self, timeout: Duration) -> ReadySet<'_> {
        match self.poll.poll(&mut self.events, Some(timeout)) {
            Ok(()) => {}
            Err(err) => warn!(?err, "poller: wait failed, retrying next iteration"),
        }
        ReadySet { events: &self.events }
    }
}

/// Borrowed view over whichever tokens became ready on the last `wait`.
pub struct ReadySet<'a> {
    events: &'a Events,
}

impl ReadySet<'_> {
    pub fn is_ready(&self, token: Token) -> bool {
        self.events.iter().any(|e| e.token() == token)
    }
}
