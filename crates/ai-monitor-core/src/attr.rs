//! Attribute TLV encoding consumed/produced by the Inbound Handler and
//! Fan-out Dispatcher (components D and E).
//!
//! The real attribute wire format belongs to the external AI protocol
//! encoder and isn't part of the retrieved source. This module reconstructs
//! a minimal, self-consistent TLV scheme — `[type: u8][len: u32 BE][value]`
//! — sufficient to carry everything §4.D/§4.E actually name (CLIENT_TS,
//! SERVER_TS, SESSION_ID, EVENT_ID, USER_DATA, plus the head/audio fields
//! the fan-out path forwards). Documented as a reconstruction in DESIGN.md.

use crate::error::{MonitorError, Result};

pub mod attr_type {
    pub const CLIENT_TS: u8 = 1;
    pub const SERVER_TS: u8 = 2;
    pub const SESSION_ID: u8 = 3;
    pub const EVENT_ID: u8 = 4;
    pub const USER_DATA: u8 = 5;
    pub const HEAD_INFO: u8 = 6;
    pub const AUDIO_INFO: u8 = 7;
    pub const SESSION_IDS: u8 = 8;
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    U64(u64),
    Str(String),
    Bytes(Vec<u8>),
}

impl AttrValue {
    fn as_bytes(&self) -> Vec<u8> {
        match self {
            AttrValue::U64(v) => v.to_be_bytes().to_vec(),
            AttrValue::Str(s) => s.as_bytes().to_vec(),
            AttrValue::Bytes(b) => b.clone(),
        }
    }
}

/// Append one encoded attribute to `out`.
pub fn encode_attribute_into(attr_type: u8, value: &AttrValue, out: &mut Vec<u8>) {
    let bytes = value.as_bytes();
    out.push(attr_type);
    out.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    out.extend_from_slice(&bytes);
}

/// Decode one attribute from the front of `buf`, returning the attribute
/// type, its value, and the number of bytes consumed.
pub fn decode_attribute(buf: &[u8]) -> Result<(u8, AttrValue, usize)> {
    if buf.len() < 5 {
        return Err(MonitorError::malformed("attribute header truncated"));
    }
    let attr_type = buf[0];
    let len = u32::from_be_bytes(buf[1..5].try_into().unwrap()) as usize;
    let total = 5 + len;
    if buf.len() < total {
        return Err(MonitorError::malformed("attribute value truncated"));
    }
    let value_bytes = &buf[5..total];
    let value = match attr_type {
        attr_type::CLIENT_TS | attr_type::SERVER_TS => {
            if value_bytes.len() != 8 {
                return Err(MonitorError::malformed("timestamp attribute must be 8 bytes"));
            }
            AttrValue::U64(u64::from_be_bytes(value_bytes.try_into().unwrap()))
        }
        attr_type::SESSION_ID | attr_type::EVENT_ID | attr_type::SESSION_IDS => {
            AttrValue::Str(String::from_utf8_lossy(value_bytes).into_owned())
        }
        _ => AttrValue::Bytes(value_bytes.to_vec()),
    };
    Ok((attr_type, value, total))
}

/// Event attributes carried on every EVENT packet: session id, event id, and
/// a free-form user-data payload (the MONITOR_FILTER bitmap rides in here).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventAttr {
    pub session_id: String,
    pub event_id: String,
    pub user_data: Vec<u8>,
}

/// Parse a PING packet's attribute block, extracting `CLIENT_TS`.
///
/// Per the source's flagged bug (spec §9 Open Questions): the original loop
/// bounds itself against the already-advanced absolute `offset` rather than
/// the attribute block's own length, which would never terminate correctly.
/// Here the loop runs while the cursor is within the attribute block itself.
pub fn parse_ping_client_ts(attr_block: &[u8]) -> Result<u64> {
    let mut offset = 0usize;
    let mut client_ts = 0u64;
    while offset < attr_block.len() {
        let (attr_type, value, consumed) = decode_attribute(&attr_block[offset..])?;
        offset += consumed;
        if attr_type == attr_type::CLIENT_TS {
            if let AttrValue::U64(v) = value {
                client_ts = v;
            }
        }
    }
    Ok(client_ts)
}

/// Parse an EVENT packet's attribute block into session id / event id /
/// user data.
pub fn parse_event_attrs(attr_block: &[u8]) -> Result<EventAttr> {
    let mut offset = 0usize;
    let mut event = EventAttr::default();
    while offset < attr_block.len() {
        let (attr_type, value, consumed) = decode_attribute(&attr_block[offset..])?;
        offset += consumed;
        match (attr_type, value) {
            (self::attr_type::SESSION_ID, AttrValue::Str(s)) => event.session_id = s,
            (self::attr_type::EVENT_ID, AttrValue::Str(s)) => event.event_id = s,
            (self::attr_type::USER_DATA, AttrValue::Bytes(b)) => event.user_data = b,
            _ => {}
        }
    }
    Ok(event)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_u64_attribute() {
        let mut buf = Vec::new();
        encode_attribute_into(attr_type::CLIENT_TS, &AttrValue::U64(0x1122_3344_5566_7788), &mut buf);
        let (t, v, consumed) = decode_attribute(&buf).unwrap();
        assert_eq!(t, attr_type::CLIENT_TS);
        assert_eq!(v, AttrValue::U64(0x1122_3344_5566_7788));
        assert_eq!(consumed, buf.len());
    }

    #[test]
    fn ping_parse_extracts_client_ts_among_other_attrs() {
        let mut buf = Vec::new();
        encode_attribute_into(attr_type::SESSION_ID, &AttrValue::Str("sid".into()), &mut buf);
        encode_attribute_into(attr_type::CLIENT_TS, &AttrValue::U64(42), &mut buf);
        assert_eq!(parse_ping_client_ts(&buf).unwrap(), 42);
    }

    #[test]
    fn event_parse_collects_known_fields() {
        let mut buf = Vec::new();
        encode_attribute_into(attr_type::SESSION_ID, &AttrValue::Str("s1".into()), &mut buf);
        encode_attribute_into(attr_type::EVENT_ID, &AttrValue::Str("e1".into()), &mut buf);
        encode_attribute_into(attr_type::USER_DATA, &AttrValue::Bytes(vec![1, 2, 3, 4, 5, 6, 7, 8]), &mut buf);
        let event = parse_event_attrs(&buf).unwrap();
        assert_eq!(event.session_id, "s1");
        assert_eq!(event.event_id, "e1");
        assert_eq!(event.user_data, vec![1, 2, 3, 4, 5, 6, 7, 8]);
    }
}
