//! Wire protocol: the fixed binary message types exchanged with the client
//! (§4.4), plus video fragmentation.
//!
//! All integers are little-endian. Every message starts with a 4-byte `u32`
//! type tag. Decoding never panics on truncated input: a datagram shorter
//! than a tag's minimum length is reported as [`DecodeError`] and the caller
//! drops it (§7, "malformed datagram").

mod codec;
mod fragment;

pub use codec::{
    ChangeSettingsMessage, ClientMessage, DecodeError, HelloMessage, StreamControlMessage,
    TimeSyncMessage, TrackingMessage, CONNECTION_ACK, CONTROLLER_STATE_LEN, TAG_CHANGE_SETTINGS,
    TAG_CONNECTION_ACK, TAG_HELLO, TAG_STREAM_CONTROL, TAG_TIME_SYNC, TAG_TRACKING,
};
pub use fragment::{fragment_frame, Fragment, PAYLOAD_SIZE};
