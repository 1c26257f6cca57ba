//! Fan-out Dispatcher (component E): relays upstream/downstream AI-session
//! traffic to every observer subscribed to that packet type.
//!
//! `BizHead`/`AudioInfo` reconstruct the external business-packet metadata
//! this core receives from the AI session pipeline but doesn't define
//! (`AI_BIZ_HEAD_INFO_T`/`AI_BIZ_ATTR_INFO_T` aren't part of the retrieved
//! source). `dispatch` itself only inspects them for the fragmentation
//! guard and relays `body` as already assembled by the caller; the Broadcast
//! API (`broadcast.rs`), which builds its own packets rather than relaying
//! pre-assembled ones, serializes `BizHead`/`AudioInfo` onto the wire via
//! `encode_into` so the metadata actually reaches the observer.

use mio::Registry;

use crate::client::ClientTable;
use crate::error::{MonitorError, Result};
use crate::writer::send_packet;

pub mod stream_flag {
    pub const START: u8 = 1;
    pub const ING: u8 = 2;
    pub const END: u8 = 4;
}

/// Business-packet content type (`AI_BIZ_ATTR_INFO_T.type`), distinct from
/// the control-plane attribute TLV types in `attr.rs`.
pub mod biz_attr_type {
    pub const TEXT: u8 = 1;
    pub const AUDIO: u8 = 2;
}

#[derive(Debug, Clone, Copy)]
pub struct BizHead {
    pub stream_flag: u8,
    pub total_len: u32,
    pub len: u32,
}

impl BizHead {
    /// Serialize onto the wire as `[stream_flag][total_len: u32 BE][len: u32 BE]`.
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        out.push(self.stream_flag);
        out.extend_from_slice(&self.total_len.to_be_bytes());
        out.extend_from_slice(&self.len.to_be_bytes());
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AudioInfo {
    pub codec_type: u8,
    pub sample_rate: u32,
    pub channels: u8,
    pub bit_depth: u8,
}

impl AudioInfo {
    /// Serialize onto the wire as `[codec_type][sample_rate: u32 BE][channels][bit_depth]`.
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        out.push(self.codec_type);
        out.extend_from_slice(&self.sample_rate.to_be_bytes());
        out.push(self.channels);
        out.push(self.bit_depth);
    }
}

pub const AUDIO_CODEC_PCM: u8 = 0;
pub const AUDIO_CHANNELS_MONO: u8 = 1;

/// Relay `body` (already fully assembled — fragmented business packets
/// aren't supported, matching the upstream handler's own restriction) to
/// every client subscribed to `msg_type`.
pub fn dispatch(
    table: &mut ClientTable,
    registry: &Registry,
    direction: u8,
    msg_type: u8,
    head: &BizHead,
    body: &[u8],
) -> Result<()> {
    if head.total_len > 0 && head.total_len != head.len {
        return Err(MonitorError::unsupported("fragmented business packets are not supported"));
    }

    for client in table.iter_mut() {
        if !client.is_subscribed(msg_type) {
            continue;
        }
        send_packet(client, registry, direction, body);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_a_fragment_whose_total_len_does_not_match_this_chunk() {
        let mut table = ClientTable::new(1);
        let poll = mio::Poll::new().unwrap();
        let head = BizHead { stream_flag: stream_flag::ING, total_len: 100, len: 10 };

        let err = dispatch(&mut table, poll.registry(), 1, 34, &head, b"partial").unwrap_err();
        assert!(matches!(err, MonitorError::Unsupported(_)));
    }

    #[test]
    fn an_unfragmented_packet_with_no_subscribers_is_a_no_op() {
        let mut table = ClientTable::new(1);
        let poll = mio::Poll::new().unwrap();
        let head = BizHead { stream_flag: 0, total_len: 0, len: 5 };

        assert!(dispatch(&mut table, poll.registry(), 1, 34, &head, b"hello").is_ok());
    }
}
