//! Session and transport core for a wireless VR streaming server.
//!
//! Owns the discovery/connect/streaming state machine, the UDP wire
//! protocol (framing, fragmentation, clock sync), client-liveness tracking,
//! and a local control-channel command dispatcher. The video encoder, the
//! pose consumer's rendering/prediction, and the supervisor process on the
//! other end of the control channel are external collaborators reached only
//! through [`callbacks::SessionCallbacks`] and the handles returned by
//! [`host::ThreadHost`].

pub mod callbacks;
pub mod config;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod host;
mod net;
mod poller;
mod priority;
pub mod protocol;
pub mod session;
pub mod time;
pub mod tracking;

pub use callbacks::{NoopCallbacks, SessionCallbacks};
pub use config::SessionConfig;
pub use error::StartupError;
pub use host::{PoseConsumer, ThreadHost, VideoProducer};
