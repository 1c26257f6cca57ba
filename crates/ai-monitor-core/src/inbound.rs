//! Inbound Handler (component D): dispatches decoded upstream/downstream
//! frames addressed to the control plane (PING, EVENT) and produces the
//! client's reply.
//!
//! Body layouts below are reconstructions of the upstream `AI_PAYLOAD_HEAD_T`
//! + attribute-TLV scheme, since that ABI belongs to an external packet
//! protocol this core consumes but doesn't own:
//!
//! PING body:  `[attr_len: u32][attr block]`
//! EVENT body: `[has_attr: u8][attr_len: u32 if has_attr][attr block if has_attr]
//!              [event_type: u16][head_len: u16][head bytes (unused, skipped)]`

use mio::Registry;
use tracing::{debug, trace, warn};

use crate::attr::{self, attr_type, AttrValue, EventAttr};
use crate::client::{ConnState, ConnectedClient};
use crate::error::{MonitorError, Result};
use crate::frame::DIRECTION_ACK;
use crate::packet::{event_type, msg_type};
use crate::writer::send_packet;

/// Route one decoded frame body to its control-plane handler. Frames whose
/// type isn't a control message are left for the Fan-out Dispatcher.
pub fn handle_inbound_packet(
    client: &mut ConnectedClient,
    registry: &Registry,
    msg_type_code: u8,
    body: &[u8],
) -> Result<ConnState> {
    match msg_type_code {
        msg_type::PING => handle_ping(client, registry, body),
        msg_type::EVENT => handle_event(client, registry, body),
        other => Err(MonitorError::unsupported(format!("packet type {other} is not control-plane"))),
    }
}

fn handle_ping(client: &mut ConnectedClient, registry: &Registry, body: &[u8]) -> Result<ConnState> {
    if body.len() < 4 {
        return Err(MonitorError::malformed("ping packet missing attribute block"));
    }
    let attr_len = u32::from_be_bytes(body[0..4].try_into().unwrap()) as usize;
    let attr_block = body.get(4..4 + attr_len).ok_or_else(|| MonitorError::malformed("ping attribute block truncated"))?;

    let client_ts = attr::parse_ping_client_ts(attr_block)?;
    let server_ts = now_posix_ms();
    client.last_ping_at = Some(std::time::Instant::now());
    debug!(addr = %client.addr, client_ts, "received ping");

    let mut resp = Vec::new();
    attr::encode_attribute_into(attr_type::CLIENT_TS, &AttrValue::U64(client_ts), &mut resp);
    attr::encode_attribute_into(attr_type::SERVER_TS, &AttrValue::U64(server_ts), &mut resp);

    Ok(send_packet(client, registry, DIRECTION_ACK, &resp))
}

fn handle_event(client: &mut ConnectedClient, registry: &Registry, body: &[u8]) -> Result<ConnState> {
    if body.is_empty() {
        return Err(MonitorError::malformed("event packet empty"));
    }
    let has_attr = body[0] != 0;
    let mut offset = 1usize;
    let mut event = EventAttr::default();

    if has_attr {
        if body.len() < offset + 4 {
            return Err(MonitorError::malformed("event attribute length truncated"));
        }
        let attr_len = u32::from_be_bytes(body[offset..offset + 4].try_into().unwrap()) as usize;
        offset += 4;
        let attr_block = body
            .get(offset..offset + attr_len)
            .ok_or_else(|| MonitorError::malformed("event attribute block truncated"))?;
        event = attr::parse_event_attrs(attr_block)?;
        offset += attr_len;
    }

    if body.len() < offset + 4 {
        return Err(MonitorError::malformed("event head truncated"));
    }
    let event_type_code = u16::from_be_bytes(body[offset..offset + 2].try_into().unwrap());
    let head_len = u16::from_be_bytes(body[offset + 2..offset + 4].try_into().unwrap()) as usize;
    offset += 4 + head_len;
    let _ = offset; // remaining head bytes carry no fields this service reads

    trace!(session_id = %event.session_id, event_id = %event.event_id, event_type_code, "received event");

    let result = match event_type_code {
        event_type::MONITOR_FILTER => handle_event_filter(client, &event),
        event_type::MONITOR_ALG_CTRL => handle_event_alg_ctrl(client, &event),
        other => {
            warn!(event_type_code = other, "unsupported event type");
            Err(MonitorError::unsupported(format!("event type {other:#06x}")))
        }
    };
    let result_code = match &result {
        Ok(()) => 0,
        Err(err) => err.code(),
    };

    let mut resp = Vec::new();
    attr::encode_attribute_into(attr_type::SESSION_ID, &AttrValue::Str(event.session_id), &mut resp);
    attr::encode_attribute_into(attr_type::EVENT_ID, &AttrValue::Str(event.event_id), &mut resp);
    attr::encode_attribute_into(attr_type::USER_DATA, &AttrValue::Bytes(event.user_data), &mut resp);
    resp.extend_from_slice(&event_type_code.to_be_bytes());
    resp.extend_from_slice(&4u16.to_be_bytes());
    resp.extend_from_slice(&result_code.to_be_bytes());

    Ok(send_packet(client, registry, DIRECTION_ACK, &resp))
}

/// `MONITOR_FILTER`: clear the client's subscriptions, then set only the
/// bits among the recognized packet types (video/audio/image/file/text/event/
/// custom_log) that are present in the 64-bit bitmap carried in `user_data`.
/// Every other bit in the caller-supplied bitmap is ignored, matching the
/// original's per-type `__client_register` calls rather than a wholesale
/// copy of the bitmap. The CUSTOM_LOG add/remove-sink side effect is driven
/// by the caller, which compares subscription state before and after this
/// call (component G owns the sink reference count).
fn handle_event_filter(client: &mut ConnectedClient, event: &EventAttr) -> Result<()> {
    if event.user_data.len() != 8 {
        return Err(MonitorError::invalid("monitor filter user_data must be 8 bytes"));
    }
    let bitmap = u64::from_be_bytes(event.user_data[..8].try_into().unwrap());
    let mut subscriptions = 0u64;
    for &t in &crate::packet::FILTERABLE_TYPES {
        if bitmap & crate::packet::subscription_bit(t) != 0 {
            subscriptions |= crate::packet::subscription_bit(t);
        }
    }
    client.subscriptions = subscriptions;
    debug!(addr = %client.addr, bitmap = format!("{subscriptions:#018x}"), "updated subscription filter");
    Ok(())
}

/// `MONITOR_ALG_CTRL`: not implemented upstream either.
fn handle_event_alg_ctrl(_client: &mut ConnectedClient, _event: &EventAttr) -> Result<()> {
    Err(MonitorError::unsupported("algorithm control is not implemented"))
}

fn now_posix_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{msg_type, subscription_bit};
    use mio::Token;
    use std::net::TcpListener as StdListener;

    fn test_client() -> ConnectedClient {
        let listener = StdListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client_std = std::net::TcpStream::connect(addr).unwrap();
        let (server_std, _) = listener.accept().unwrap();
        server_std.set_nonblocking(true).unwrap();
        drop(client_std);
        ConnectedClient::new(Token(1), addr, mio::net::TcpStream::from_std(server_std), 1024)
    }

    #[test]
    fn monitor_filter_only_sets_recognized_bits_and_ignores_the_rest() {
        let mut client = test_client();
        let mut event = EventAttr::default();
        // Bit 34 (TEXT_STREAM, recognized) and bit 2 (unrecognized) both set.
        let bitmap: u64 = subscription_bit(msg_type::TEXT_STREAM) | (1u64 << 2);
        event.user_data = bitmap.to_be_bytes().to_vec();

        handle_event_filter(&mut client, &event).unwrap();

        assert_eq!(client.subscriptions, subscription_bit(msg_type::TEXT_STREAM));
    }

    #[test]
    fn monitor_filter_clears_bits_absent_from_the_new_bitmap() {
        let mut client = test_client();
        client.subscriptions = subscription_bit(msg_type::AUDIO_STREAM);

        let mut event = EventAttr::default();
        let bitmap: u64 = subscription_bit(msg_type::TEXT_STREAM);
        event.user_data = bitmap.to_be_bytes().to_vec();
        handle_event_filter(&mut client, &event).unwrap();

        assert!(!client.is_subscribed(msg_type::AUDIO_STREAM));
        assert!(client.is_subscribed(msg_type::TEXT_STREAM));
    }

    #[test]
    fn monitor_filter_sets_custom_log_bit_when_requested() {
        let mut client = test_client();
        let mut event = EventAttr::default();
        let bitmap: u64 = subscription_bit(msg_type::CUSTOM_LOG);
        event.user_data = bitmap.to_be_bytes().to_vec();

        handle_event_filter(&mut client, &event).unwrap();

        assert!(client.is_subscribed(msg_type::CUSTOM_LOG));
    }
}
