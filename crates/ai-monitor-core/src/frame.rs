//! Wrapper frame codec (component A).
//!
//! Wire layout, all multi-byte integers big-endian:
//!
//! ```text
//! magic:      u32 = 0x54594149  ("TYAI")
//! flags:      u8  = [reserved:6 | direction:2]
//! pkg_header: PacketHead (8 bytes, see below)
//! pkg_len:    u32
//! pkg_body:   bytes[pkg_len]
//! ```
//!
//! `PacketHead` is a reconstruction of the original `AI_PACKET_HEAD_T`: the
//! upstream header is produced by a packet protocol this core consumes but
//! does not own, and its exact byte layout isn't part of the retrieved
//! source. Only the fields this core actually validates are reproduced here;
//! the rest is a fixed reserved pad so frame arithmetic lines up the same way
//! the original's `sizeof(ai_monitor_header_t)` does.

pub const MAGIC: u32 = 0x5459_4149;

pub const DIRECTION_US: u8 = 0;
pub const DIRECTION_DS: u8 = 1;
pub const DIRECTION_ACK: u8 = 2;

pub const PROTOCOL_VERSION: u8 = 1;
pub const SECURITY_LEVEL_NONE: u8 = 0;
pub const FRAG_NONE: u8 = 0;

/// magic(4) + flags(1) + pkg_header(8)
pub const WRAPPER_HEADER_LEN: usize = 4 + 1 + PacketHead::WIRE_LEN;
pub const LENGTH_FIELD_LEN: usize = 4;
/// The 5-byte preamble the Writer Adapter's PRE_WRITE stage emits: magic
/// big-endian plus one flag byte carrying the direction.
pub const PREAMBLE_LEN: usize = 5;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PacketHead {
    pub version: u8,
    pub iv_flag: u8,
    pub security_level: u8,
    pub frag_flag: u8,
    pub sequence: u16,
}

impl PacketHead {
    pub const WIRE_LEN: usize = 8;

    fn decode(buf: &[u8]) -> Self {
        debug_assert!(buf.len() >= Self::WIRE_LEN);
        Self {
            version: buf[0],
            iv_flag: buf[1],
            security_level: buf[2],
            frag_flag: buf[3],
            sequence: u16::from_be_bytes([buf[4], buf[5]]),
        }
    }

    fn is_valid(&self) -> bool {
        self.version == PROTOCOL_VERSION
            && self.iv_flag == 0
            && self.security_level == SECURITY_LEVEL_NONE
            && self.frag_flag == FRAG_NONE
    }
}

/// Outcome of attempting to decode one frame from the front of a client's
/// receive buffer.
pub enum FrameStep<'a> {
    /// A complete, validated frame was found at the front of the buffer.
    /// `consumed` bytes (header + length + body) should be dropped.
    Frame { direction: u8, header: PacketHead, body: &'a [u8], consumed: usize },
    /// Not enough data buffered yet; stop and wait for more.
    NeedMore,
    /// `consumed` garbage bytes were skipped (no sync word found, or a
    /// candidate frame failed validation); drop them and retry decoding.
    Skip { consumed: usize },
}

/// Scan for the next occurrence of the magic word. Returns `None` if absent
/// anywhere in `buf`.
fn find_magic(buf: &[u8]) -> Option<usize> {
    let needle = MAGIC.to_be_bytes();
    if buf.len() < needle.len() {
        return None;
    }
    buf.windows(needle.len()).position(|w| w == needle)
}

/// Attempt to decode one frame from the front of `buf`. Never panics on
/// short or garbage input; callers drive this in a loop, dropping
/// `consumed` bytes between calls (see `Service::process_buffered_frames`).
pub fn decode(buf: &[u8]) -> FrameStep<'_> {
    let Some(offset) = find_magic(buf) else {
        return FrameStep::Skip { consumed: buf.len() };
    };
    if offset > 0 {
        return FrameStep::Skip { consumed: offset };
    }

    if buf.len() < WRAPPER_HEADER_LEN + LENGTH_FIELD_LEN {
        return FrameStep::NeedMore;
    }

    let flags = buf[4];
    let direction = flags & 0b11;
    let header = PacketHead::decode(&buf[5..5 + PacketHead::WIRE_LEN]);
    let pkg_len = u32::from_be_bytes(
        buf[WRAPPER_HEADER_LEN..WRAPPER_HEADER_LEN + LENGTH_FIELD_LEN]
            .try_into()
            .unwrap(),
    ) as usize;

    if direction != DIRECTION_ACK || !header.is_valid() {
        // Conservative step: advance past the 4-byte length field and retry
        // resync, same as the original's "skip magic for next frame" path.
        return FrameStep::Skip { consumed: LENGTH_FIELD_LEN };
    }

    let total_needed = WRAPPER_HEADER_LEN + LENGTH_FIELD_LEN + pkg_len;
    if buf.len() < total_needed {
        return FrameStep::NeedMore;
    }

    let body = &buf[WRAPPER_HEADER_LEN + LENGTH_FIELD_LEN..total_needed];
    FrameStep::Frame { direction, header, body, consumed: total_needed }
}

/// PRE_WRITE stage: the 5-byte preamble prepended before any encoder-emitted
/// bytes.
pub fn encode_preamble(direction: u8) -> [u8; PREAMBLE_LEN] {
    let mut out = [0u8; PREAMBLE_LEN];
    out[..4].copy_from_slice(&MAGIC.to_be_bytes());
    out[4] = direction & 0b11;
    out
}

/// Encode the reconstructed `pkg_header` (8 bytes) for an outbound frame.
pub fn encode_packet_head(sequence: u16) -> [u8; PacketHead::WIRE_LEN] {
    let mut out = [0u8; PacketHead::WIRE_LEN];
    out[0] = PROTOCOL_VERSION;
    out[1] = 0; // iv_flag
    out[2] = SECURITY_LEVEL_NONE;
    out[3] = FRAG_NONE;
    out[4..6].copy_from_slice(&sequence.to_be_bytes());
    // out[6..8] reserved, left zeroed
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_frame(body: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&encode_preamble(DIRECTION_ACK));
        out.extend_from_slice(&encode_packet_head(1));
        out.extend_from_slice(&(body.len() as u32).to_be_bytes());
        out.extend_from_slice(body);
        out
    }

    #[test]
    fn decodes_a_single_valid_frame_and_reports_exact_consumption() {
        let body = b"hello";
        let frame = valid_frame(body);
        match decode(&frame) {
            FrameStep::Frame { body: got, consumed, direction, .. } => {
                assert_eq!(got, body);
                assert_eq!(consumed, frame.len());
                assert_eq!(direction, DIRECTION_ACK);
            }
            _ => panic!("expected a complete frame"),
        }
    }

    #[test]
    fn buffer_with_no_magic_is_entirely_consumed() {
        let garbage = b"no magic word anywhere in here at all";
        match decode(garbage) {
            FrameStep::Skip { consumed } => assert_eq!(consumed, garbage.len()),
            _ => panic!("expected the whole buffer to be skipped"),
        }
    }

    #[test]
    fn garbage_prefix_is_skipped_before_a_valid_frame() {
        let body = b"ping";
        let mut buf = b"ZZZZ".to_vec();
        buf.extend_from_slice(&valid_frame(body));

        match decode(&buf) {
            FrameStep::Skip { consumed } => assert_eq!(consumed, 4),
            _ => panic!("expected the garbage prefix to be skipped first"),
        }

        let (_, rest) = buf.split_at(4);
        match decode(rest) {
            FrameStep::Frame { body: got, .. } => assert_eq!(got, body),
            _ => panic!("expected a frame after dropping the garbage"),
        }
    }

    #[test]
    fn partial_frame_waits_for_more_data() {
        let frame = valid_frame(b"longer body here");
        let partial = &frame[..frame.len() - 3];
        assert!(matches!(decode(partial), FrameStep::NeedMore));
    }

    #[test]
    fn wrong_direction_is_skipped_conservatively() {
        let mut frame = valid_frame(b"x");
        frame[4] = DIRECTION_US;
        match decode(&frame) {
            FrameStep::Skip { consumed } => assert_eq!(consumed, LENGTH_FIELD_LEN),
            _ => panic!("expected the invalid frame to be skipped"),
        }
    }
}
