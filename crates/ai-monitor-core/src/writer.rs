//! Writer Adapter (component B).
//!
//! The original splits packet emission between a PRE_WRITE hook (stamps the
//! preamble) and an external AI protocol encoder (stamps `pkg_header` plus
//! the body). That encoder's ABI isn't part of the retrieved source, so this
//! module owns the whole outbound wrapper frame instead of delegating the
//! back half of it: `send_packet` builds preamble + packet head + length +
//! body in one pass and hands the result to the per-client non-blocking send
//! path (component C's `ConnectedClient::send`).

use mio::Registry;

use crate::client::{ConnState, ConnectedClient};
use crate::frame;

/// Assemble and send one outbound frame to `client`, stamping its next
/// sequence number.
pub fn send_packet(client: &mut ConnectedClient, registry: &Registry, direction: u8, body: &[u8]) -> ConnState {
    let sequence = client.writer.next_sequence();
    client.send(registry, build_frame(direction, sequence, body))
}

/// Build a complete outbound wrapper frame without touching any client
/// state, for callers (tests, fan-out dry-runs) that need the bytes alone.
pub fn build_frame(direction: u8, sequence: u16, body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(frame::PREAMBLE_LEN + frame::PacketHead::WIRE_LEN + frame::LENGTH_FIELD_LEN + body.len());
    out.extend_from_slice(&frame::encode_preamble(direction));
    out.extend_from_slice(&frame::encode_packet_head(sequence));
    out.extend_from_slice(&(body.len() as u32).to_be_bytes());
    out.extend_from_slice(body);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{decode, FrameStep, DIRECTION_ACK};

    #[test]
    fn built_frame_round_trips_through_the_codec() {
        let body = b"pong payload";
        let encoded = build_frame(DIRECTION_ACK, 7, body);
        match decode(&encoded) {
            FrameStep::Frame { body: got, header, consumed, .. } => {
                assert_eq!(got, body);
                assert_eq!(header.sequence, 7);
                assert_eq!(consumed, encoded.len());
            }
            _ => panic!("expected a decodable frame"),
        }
    }
}
