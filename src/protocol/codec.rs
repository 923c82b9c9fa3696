use thiserror::Error;

pub const TAG_HELLO: u32 = 1;
pub const TAG_TRACKING: u32 = 2;
pub const TAG_TIME_SYNC: u32 = 3;
pub const TAG_CHANGE_SETTINGS: u32 = 4;
pub const TAG_CONNECTION_ACK: u32 = 6;
pub const TAG_STREAM_CONTROL: u32 = 7;

/// Controller telemetry is opaque to this crate beyond its size (§3); the
/// pose consumer interprets it. Sized generously enough to hold whatever a
/// real controller-state payload needs without forcing a protocol revision
/// every time the encoder's controller schema grows.
pub const CONTROLLER_STATE_LEN: usize = 128;

const HELLO_DEVICE_NAME_LEN: usize = 32;
const HELLO_MIN_LEN: usize = 4 + HELLO_DEVICE_NAME_LEN;
const TRACKING_MIN_LEN: usize = 4 + 8 + 16 + CONTROLLER_STATE_LEN;
const TIME_SYNC_RESERVED_LEN: usize = 8;
const TIME_SYNC_MIN_LEN: usize = 4 + 4 + 4 + 8 + 8 + TIME_SYNC_RESERVED_LEN;
const STREAM_CONTROL_MIN_LEN: usize = 4 + 4;

/// Fully-assembled connection ack: tag only, nothing else (§4.4).
pub const CONNECTION_ACK: [u8; 4] = TAG_CONNECTION_ACK.to_le_bytes();

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DecodeError {
    #[error("datagram too short to contain a type tag ({len} bytes)")]
    TooShortForTag { len: usize },
    #[error("unknown message tag {tag}")]
    UnknownTag { tag: u32 },
    #[error("datagram too short for tag {tag} (need {need}, got {got})")]
    TooShortForPayload { tag: u32, need: usize, got: usize },
}

/// Announces a headset looking to be connected to. C→S, does not require
/// prior authorization (§4.5: "The Hello handler does not require the client
/// to be authorized").
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HelloMessage {
    pub device_name: [u8; HELLO_DEVICE_NAME_LEN],
}

/// Head/controller telemetry. C→S, only while `Connected` and from the
/// authorized peer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrackingMessage {
    pub frame_index: u64,
    /// Head pose orientation quaternion, (x, y, z, w).
    pub head_orientation: [f32; 4],
    pub controller_state: [u8; CONTROLLER_STATE_LEN],
}

/// Clock-sync exchange. C↔S; mode 0 requests a reflection, mode 2 carries the
/// round-trip needed to compute `TimeDiff` (§4.5).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimeSyncMessage {
    pub mode: u32,
    pub sequence: u32,
    pub server_time: u64,
    pub client_time: u64,
    /// Trailing fields the client may send that this crate does not
    /// interpret; echoed back verbatim on reflection (§4.4: "... any
    /// trailing fields the client sends (ignored)").
    pub reserved: [u8; TIME_SYNC_RESERVED_LEN],
}

/// Settings push. S→C only.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChangeSettingsMessage {
    pub test_mode: i32,
    pub suspend: i32,
}

impl ChangeSettingsMessage {
    pub fn encode(&self) -> [u8; 12] {
        let mut buf = [0u8; 12];
        buf[0..4].copy_from_slice(&TAG_CHANGE_SETTINGS.to_le_bytes());
        buf[4..8].copy_from_slice(&self.test_mode.to_le_bytes());
        buf[8..12].copy_from_slice(&self.suspend.to_le_bytes());
        buf
    }
}

/// Start/stop streaming request. C→S.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamControlMessage {
    pub mode: u32,
}

impl StreamControlMessage {
    pub const START: u32 = 1;
    pub const STOP: u32 = 2;
}

/// Decoded inbound datagram, dispatched to the session engine.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ClientMessage {
    Hello(HelloMessage),
    Tracking(TrackingMessage),
    TimeSync(TimeSyncMessage),
    StreamControl(StreamControlMessage),
}

impl ClientMessage {
    /// Decodes a raw datagram. Returns `Err` for anything too short or
    /// carrying an unrecognized tag; the caller logs and drops (§7).
    pub fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        if buf.len() < 4 {
            return Err(DecodeError::TooShortForTag { len: buf.len() });
        }
        let tag = u32::from_le_bytes(buf[0..4].try_into().unwrap());

        match tag {
            TAG_HELLO => {
                if buf.len() < HELLO_MIN_LEN {
                    return Err(too_short(tag, HELLO_MIN_LEN, buf.len()));
                }
                let mut device_name = [0u8; HELLO_DEVICE_NAME_LEN];
                device_name.copy_from_slice(&buf[4..4 + HELLO_DEVICE_NAME_LEN]);
                Ok(ClientMessage::Hello(HelloMessage { device_name }))
            }
            TAG_TRACKING => {
                if buf.len() < TRACKING_MIN_LEN {
                    return Err(too_short(tag, TRACKING_MIN_LEN, buf.len()));
                }
                let mut pos = 4;
                let frame_index = read_u64(buf, &mut pos);
                let mut head_orientation = [0f32; 4];
                for v in &mut head_orientation {
                    *v = read_f32(buf, &mut pos);
                }
                let mut controller_state = [0u8; CONTROLLER_STATE_LEN];
                controller_state.copy_from_slice(&buf[pos..pos + CONTROLLER_STATE_LEN]);
                Ok(ClientMessage::Tracking(TrackingMessage {
                    frame_index,
                    head_orientation,
                    controller_state,
                }))
            }
            TAG_TIME_SYNC => {
                if buf.len() < TIME_SYNC_MIN_LEN {
                    return Err(too_short(tag, TIME_SYNC_MIN_LEN, buf.len()));
                }
                let mut pos = 4;
                let mode = read_u32(buf, &mut pos);
                let sequence = read_u32(buf, &mut pos);
                let server_time = read_u64(buf, &mut pos);
                let client_time = read_u64(buf, &mut pos);
                let mut reserved = [0u8; TIME_SYNC_RESERVED_LEN];
                reserved.copy_from_slice(&buf[pos..pos + TIME_SYNC_RESERVED_LEN]);
                Ok(ClientMessage::TimeSync(TimeSyncMessage {
                    mode,
                    sequence,
                    server_time,
                    client_time,
                    reserved,
                }))
            }
            TAG_STREAM_CONTROL => {
                if buf.len() < STREAM_CONTROL_MIN_LEN {
                    return Err(too_short(tag, STREAM_CONTROL_MIN_LEN, buf.len()));
                }
                let mut pos = 4;
                let mode = read_u32(buf, &mut pos);
                Ok(ClientMessage::StreamControl(StreamControlMessage { mode }))
            }
            other => Err(DecodeError::UnknownTag { tag: other }),
        }
    }
}

impl TimeSyncMessage {
    /// Builds the mode-1 reflection: same sequence/client_time/reserved,
    /// `mode` forced to 1 and `server_time` set to `now`.
    pub fn reflect(&self, now_us: u64) -> [u8; TIME_SYNC_MIN_LEN] {
        let mut buf = [0u8; TIME_SYNC_MIN_LEN];
        buf[0..4].copy_from_slice(&TAG_TIME_SYNC.to_le_bytes());
        buf[4..8].copy_from_slice(&1u32.to_le_bytes());
        buf[8..12].copy_from_slice(&self.sequence.to_le_bytes());
        buf[12..20].copy_from_slice(&now_us.to_le_bytes());
        buf[20..28].copy_from_slice(&self.client_time.to_le_bytes());
        buf[28..28 + TIME_SYNC_RESERVED_LEN].copy_from_slice(&self.reserved);
        buf
    }
}

#[inline]
fn too_short(tag: u32, need: usize, got: usize) -> DecodeError {
    DecodeError::TooShortForPayload { tag, need, got }
}

#[inline]
fn read_u32(buf: &[u8], pos: &mut usize) -> u32 {
    let v = u32::from_le_bytes(buf[*pos..*pos + 4].try_into().unwrap());
    *pos += 4;
    v
}

#[inline]
fn read_u64(buf: &[u8], pos: &mut usize) -> u64 {
    let v = u64::from_le_bytes(buf[*pos..*pos + 8].try_into().unwrap());
    *pos += 8;
    v
}

#[inline]
fn read_f32(buf: &[u8], pos: &mut usize) -> f32 {
    let v = f32::from_le_bytes(buf[*pos..*pos + 4].try_into().unwrap());
    *pos += 4;
    v
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hello_bytes(name: &[u8]) -> Vec<u8> {
        let mut buf = TAG_HELLO.to_le_bytes().to_vec();
        let mut device_name = [0u8; HELLO_DEVICE_NAME_LEN];
        let n = name.len().min(HELLO_DEVICE_NAME_LEN);
        device_name[..n].copy_from_slice(&name[..n]);
        buf.extend_from_slice(&device_name);
        buf
    }

    #[test]
    fn decode_rejects_sub_tag_length() {
        assert_eq!(
            ClientMessage::decode(&[1, 0, 0]),
            Err(DecodeError::TooShortForTag { len: 3 })
        );
    }

    #[test]
    fn decode_rejects_unknown_tag() {
        let buf = 42u32.to_le_bytes();
        assert_eq!(ClientMessage::decode(&buf), Err(DecodeError::UnknownTag { tag: 42 }));
    }

    #[test]
    fn decode_rejects_truncated_hello() {
        let buf = TAG_HELLO.to_le_bytes();
        assert!(matches!(
            ClientMessage::decode(&buf),
            Err(DecodeError::TooShortForPayload { tag: TAG_HELLO, .. })
        ));
    }

    #[test]
    fn decode_hello_roundtrip() {
        let buf = hello_bytes(b"Test Device 1");
        let msg = ClientMessage::decode(&buf).unwrap();
        match msg {
            ClientMessage::Hello(h) => assert!(h.device_name.starts_with(b"Test Device 1")),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn decode_stream_control() {
        let mut buf = TAG_STREAM_CONTROL.to_le_bytes().to_vec();
        buf.extend_from_slice(&StreamControlMessage::START.to_le_bytes());
        match ClientMessage::decode(&buf).unwrap() {
            ClientMessage::StreamControl(s) => assert_eq!(s.mode, StreamControlMessage::START),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn time_sync_reflect_preserves_sequence_and_client_time() {
        let mut buf = TAG_TIME_SYNC.to_le_bytes().to_vec();
        buf.extend_from_slice(&0u32.to_le_bytes()); // mode
        buf.extend_from_slice(&7u32.to_le_bytes()); // sequence
        buf.extend_from_slice(&0u64.to_le_bytes()); // server_time
        buf.extend_from_slice(&123u64.to_le_bytes()); // client_time
        buf.extend_from_slice(&[0u8; TIME_SYNC_RESERVED_LEN]);

        let ClientMessage::TimeSync(msg) = ClientMessage::decode(&buf).unwrap() else {
            panic!("wrong variant")
        };
        let reply = msg.reflect(999);
        let ClientMessage::TimeSync(reflected) = ClientMessage::decode(&reply).unwrap() else {
            panic!("wrong variant")
        };
        assert_eq!(reflected.mode, 1);
        assert_eq!(reflected.sequence, 7);
        assert_eq!(reflected.server_time, 999);
        assert_eq!(reflected.client_time, 123);
    }

    #[test]
    fn change_settings_encodes_tag_and_fields() {
        let msg = ChangeSettingsMessage { test_mode: 1, suspend: 0 };
        let buf = msg.encode();
        assert_eq!(u32::from_le_bytes(buf[0..4].try_into().unwrap()), TAG_CHANGE_SETTINGS);
        assert_eq!(i32::from_le_bytes(buf[4..8].try_into().unwrap()), 1);
        assert_eq!(i32::from_le_bytes(buf[8..12].try_into().unwrap()), 0);
    }
}
