//! Broadcast API (component E's public surface): the host firmware's entry
//! points for pushing text, log, and audio data out to every subscribed
//! observer, independent of any upstream/downstream AI-session traffic.
//!
//! Channel ids distinguish the several logical streams that all route under
//! the same packet type (text vs. log both fan out as `TEXT_STREAM`; mic/ref/
//! aec audio all fan out as `AUDIO_STREAM`), mirroring the upstream
//! `TY_AI_MONITOR_US_*`/`TY_AI_MONITOR_DS_*` channel id constants. Prepended
//! as a 2-byte big-endian field ahead of the rest of the body, since the
//! channel id belongs to an external business-packet envelope this core
//! doesn't own. Unlike the Fan-out Dispatcher's generic relay path, this
//! module builds its own packets, so the `{attr, head}` spec §4.F mandates
//! is assembled and serialized here rather than merely checked and dropped.

use mio::Registry;

use crate::client::ClientTable;
use crate::error::Result;
use crate::fanout::{self, biz_attr_type, stream_flag, AudioInfo, BizHead, AUDIO_CHANNELS_MONO, AUDIO_CODEC_PCM};
use crate::frame::DIRECTION_ACK;
use crate::packet::msg_type;

pub mod channel {
    pub const US_AUDIO: u16 = 1;
    pub const US_VIDEO: u16 = 3;
    pub const US_TEXT: u16 = 5;
    pub const US_IMAGE: u16 = 7;
    pub const DS_AUDIO: u16 = 2;
    pub const DS_TEXT: u16 = 4;
    pub const US_LOG: u16 = 0x8001;
    pub const US_MIC: u16 = 0x8003;
    pub const US_REF: u16 = 0x8005;
    pub const US_AEC: u16 = 0x8007;
}

/// Flag byte preceding an optional `AudioInfo` block in the serialized body:
/// `0` means no audio attribute follows, `1` means one does.
const AUDIO_INFO_ABSENT: u8 = 0;
const AUDIO_INFO_PRESENT: u8 = 1;

/// Build the `{attr, head}` wire body for a text/log broadcast:
/// `[channel_id: u16 BE][biz_attr_type::TEXT][head][no audio info][data]`.
fn build_text_body(channel_id: u16, data: &[u8]) -> (BizHead, Vec<u8>) {
    let head = BizHead { stream_flag: stream_flag::START | stream_flag::END, total_len: data.len() as u32, len: data.len() as u32 };

    let mut body = Vec::with_capacity(2 + 1 + 9 + 1 + data.len());
    body.extend_from_slice(&channel_id.to_be_bytes());
    body.push(biz_attr_type::TEXT);
    head.encode_into(&mut body);
    body.push(AUDIO_INFO_ABSENT);
    body.extend_from_slice(data);

    (head, body)
}

fn broadcast_text_on_channel(table: &mut ClientTable, registry: &Registry, channel_id: u16, data: &[u8]) -> Result<()> {
    if data.is_empty() {
        return Ok(());
    }
    let (head, body) = build_text_body(channel_id, data);
    fanout::dispatch(table, registry, DIRECTION_ACK, msg_type::TEXT_STREAM, &head, &body)
}

pub fn broadcast_text(table: &mut ClientTable, registry: &Registry, data: &[u8]) -> Result<()> {
    broadcast_text_on_channel(table, registry, channel::US_TEXT, data)
}

pub fn broadcast_log(table: &mut ClientTable, registry: &Registry, data: &[u8]) -> Result<()> {
    broadcast_text_on_channel(table, registry, channel::US_LOG, data)
}

/// Build the `{attr, head}` wire body for an audio broadcast:
/// `[channel_id: u16 BE][biz_attr_type::AUDIO][head][audio info present][audio info][data]`.
fn build_audio_body(channel_id: u16, stream_flag_bits: u8, data: &[u8]) -> (BizHead, Vec<u8>) {
    let audio_info = AudioInfo {
        codec_type: AUDIO_CODEC_PCM,
        sample_rate: 16_000,
        channels: AUDIO_CHANNELS_MONO,
        bit_depth: 16,
    };
    let head = BizHead { stream_flag: stream_flag_bits, total_len: data.len() as u32, len: data.len() as u32 };

    let mut body = Vec::with_capacity(2 + 1 + 9 + 1 + 7 + data.len());
    body.extend_from_slice(&channel_id.to_be_bytes());
    body.push(biz_attr_type::AUDIO);
    head.encode_into(&mut body);
    body.push(AUDIO_INFO_PRESENT);
    audio_info.encode_into(&mut body);
    body.extend_from_slice(data);

    (head, body)
}

fn broadcast_audio_on_channel(
    table: &mut ClientTable,
    registry: &Registry,
    channel_id: u16,
    stream_flag_bits: u8,
    data: &[u8],
) -> Result<()> {
    if data.is_empty() {
        return Ok(());
    }
    let (head, body) = build_audio_body(channel_id, stream_flag_bits, data);
    fanout::dispatch(table, registry, DIRECTION_ACK, msg_type::AUDIO_STREAM, &head, &body)
}

pub fn broadcast_audio_mic(table: &mut ClientTable, registry: &Registry, stream_flag_bits: u8, data: &[u8]) -> Result<()> {
    broadcast_audio_on_channel(table, registry, channel::US_MIC, stream_flag_bits, data)
}

pub fn broadcast_audio_ref(table: &mut ClientTable, registry: &Registry, stream_flag_bits: u8, data: &[u8]) -> Result<()> {
    broadcast_audio_on_channel(table, registry, channel::US_REF, stream_flag_bits, data)
}

pub fn broadcast_audio_aec(table: &mut ClientTable, registry: &Registry, stream_flag_bits: u8, data: &[u8]) -> Result<()> {
    broadcast_audio_on_channel(table, registry, channel::US_AEC, stream_flag_bits, data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_body_carries_channel_id_attr_type_head_and_data() {
        let (head, body) = build_text_body(channel::US_LOG, b"hello");

        assert_eq!(head.stream_flag, stream_flag::START | stream_flag::END);
        assert_eq!(head.total_len, 5);
        assert_eq!(head.len, 5);

        assert_eq!(&body[0..2], &channel::US_LOG.to_be_bytes());
        assert_eq!(body[2], biz_attr_type::TEXT);
        assert_eq!(body[3], head.stream_flag);
        assert_eq!(u32::from_be_bytes(body[4..8].try_into().unwrap()), head.total_len);
        assert_eq!(u32::from_be_bytes(body[8..12].try_into().unwrap()), head.len);
        assert_eq!(body[12], AUDIO_INFO_ABSENT);
        assert_eq!(&body[13..], b"hello");
    }

    #[test]
    fn audio_body_carries_audio_info_ahead_of_the_data() {
        let (head, body) = build_audio_body(channel::US_MIC, stream_flag::START, b"pcm");

        assert_eq!(head.stream_flag, stream_flag::START);
        assert_eq!(&body[0..2], &channel::US_MIC.to_be_bytes());
        assert_eq!(body[2], biz_attr_type::AUDIO);
        assert_eq!(body[3], stream_flag::START);
        assert_eq!(body[12], AUDIO_INFO_PRESENT);
        assert_eq!(body[13], AUDIO_CODEC_PCM);
        assert_eq!(u32::from_be_bytes(body[14..18].try_into().unwrap()), 16_000);
        assert_eq!(body[18], AUDIO_CHANNELS_MONO);
        assert_eq!(body[19], 16, "bit depth");
        assert_eq!(&body[20..], b"pcm");
    }
}
