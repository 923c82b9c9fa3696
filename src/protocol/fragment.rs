/// Per-datagram video payload budget (§4.4). ALVR calls this `PACKET_SIZE`.
pub const PAYLOAD_SIZE: usize = 1000;

const SUBTYPE_FIRST: u32 = 1;
const SUBTYPE_CONTINUATION: u32 = 2;

/// End-of-frame sentinel appended to the final fragment of every frame.
const TRAILER: [u8; 4] = [0x00, 0x00, 0x00, 0x02];

/// One ready-to-send UDP datagram carrying a slice of a video frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Fragment {
    pub bytes: Vec<u8>,
    pub packet_counter: u32,
}

/// Splits `data` into wire-ready fragments per §4.4.
///
/// - The first fragment carries subtype 1 plus `presentation_time` and
///   `frame_index` headers.
/// - Subsequent fragments carry subtype 2.
/// - Every fragment carries a `packet_counter` starting at `start_counter`
///   and incrementing by exactly one per fragment.
/// - The final fragment of the frame has the 4-byte trailer appended.
/// - A zero-length frame still produces exactly one (header + trailer only)
///   fragment.
pub fn fragment_frame(
    data: &[u8],
    presentation_time: u64,
    frame_index: u64,
    start_counter: u32,
) -> Vec<Fragment> {
    let chunk_count = data.len().div_ceil(PAYLOAD_SIZE).max(1);
    let mut fragments = Vec::with_capacity(chunk_count);

    for i in 0..chunk_count {
        let offset = i * PAYLOAD_SIZE;
        let end = (offset + PAYLOAD_SIZE).min(data.len());
        let chunk = &data[offset..end];
        let packet_counter = start_counter.wrapping_add(i as u32);
        let is_first = i == 0;
        let is_last = i == chunk_count - 1;

        let header_len = if is_first { 4 + 4 + 8 + 8 } else { 4 + 4 };
        let trailer_len = if is_last { TRAILER.len() } else { 0 };
        let mut bytes = Vec::with_capacity(header_len + chunk.len() + trailer_len);

        if is_first {
            bytes.extend_from_slice(&SUBTYPE_FIRST.to_le_bytes());
            bytes.extend_from_slice(&packet_counter.to_le_bytes());
            bytes.extend_from_slice(&presentation_time.to_le_bytes());
            bytes.extend_from_slice(&frame_index.to_le_bytes());
        } else {
            bytes.extend_from_slice(&SUBTYPE_CONTINUATION.to_le_bytes());
            bytes.extend_from_slice(&packet_counter.to_le_bytes());
        }

        bytes.extend_from_slice(chunk);

        if is_last {
            bytes.extend_from_slice(&TRAILER);
        }

        fragments.push(Fragment { bytes, packet_counter });
    }

    fragments
}
