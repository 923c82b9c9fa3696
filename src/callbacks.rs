/// Extension seam for the two external collaborators the session core talks
/// to besides the wire (§9 Design Notes): the supervisor's fallback command
/// handler, and the pose consumer's "new tracking data is in" notification.
///
/// Represented as one trait object rather than a pair of `dyn Fn`s, per the
/// distilled spec's explicit guidance: "should be represented as an
/// interface capability supplied at construction".
pub trait SessionCallbacks: Send + Sync {
    /// Called for any control command that isn't one of the built-ins
    /// (`EnableTestMode`, `Suspend`, `GetRequests`, `Connect`). The returned
    /// string is written back to the supervisor verbatim as the command's
    /// response (§4.5 command table, "any other" row).
    fn on_unknown_command(&self, name: &str, args: &str) -> String;

    /// Invoked synchronously from the event loop immediately after a
    /// tracking datagram updates the snapshot (§4.6). Implementations must
    /// keep this short or dispatch to their own queue — it runs on the same
    /// thread that services both sockets.
    fn on_pose_updated(&self);
}

/// A [`SessionCallbacks`] that answers unknown commands with `Fail\n` and
/// ignores pose updates. Useful for tests and for hosts that don't extend
/// the command grammar.
#[derive(Default)]
pub struct NoopCallbacks;

impl SessionCallbacks for NoopCallbacks {
    fn on_unknown_command(&self, name: &str, _args: &str) -> String {
        tracing::debug!(command = name, "no handler registered for unknown command");
        "Fail\n".to_string()
    }

    fn on_pose_updated(&self) {}
}
