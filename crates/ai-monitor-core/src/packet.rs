//! Packet-type codes, monitor event sub-types, and config defaults shared
//! across the Inbound Handler, Fan-out Dispatcher, and Subscription Filter.
//!
//! Values are taken verbatim from the upstream `ai_monitor_msg_type_e` enum
//! and its related `#define`s; this crate doesn't invent new codes, since
//! observers on the wire key off these exact numbers.

/// Packet-type code, also used directly as the subscription bitmap's bit
/// index (component C): bit `n` set means packets of type `n` are wanted.
pub mod msg_type {
    pub const PING: u8 = 4;
    pub const PONG: u8 = 5;
    pub const VIDEO_STREAM: u8 = 30;
    pub const AUDIO_STREAM: u8 = 31;
    pub const IMAGE_STREAM: u8 = 32;
    pub const FILE_STREAM: u8 = 33;
    pub const TEXT_STREAM: u8 = 34;
    pub const EVENT: u8 = 35;
    pub const CUSTOM_LOG: u8 = 60;
    pub const ERROR: u8 = 0xFF;
}

/// EVENT sub-type carried in an EVENT packet's event-head, distinguishing
/// the two control events observers may issue from ordinary session events.
pub mod event_type {
    pub const MONITOR_FILTER: u16 = 0xF000;
    pub const MONITOR_ALG_CTRL: u16 = 0xF001;
    pub const INVALID: u16 = 0xFFFF;
}

pub const PORT_DEFAULT: u16 = 5055;
pub const MAX_CLIENTS_DEFAULT: usize = 3;
pub const RECV_BUF_SIZE_DEFAULT: usize = 1024;
pub const SEND_BUF_SIZE_DEFAULT: usize = 1024;
pub const HEARTBEAT_INTERVAL_DEFAULT_SECS: u64 = 30;
pub const HEARTBEAT_TIMEOUT_DEFAULT_SECS: u64 = 60;

/// Maximum number of queued-but-unwritten frames per client before the
/// connection is dropped as unresponsive (component B's backlog cap).
pub const WRITE_BACKLOG_CAP: usize = 5;

/// Returns `true` for the packet types a newly-connected observer is
/// subscribed to by default: PING/PONG keepalive traffic is always audible
/// so the liveness check in component D always has somewhere to reply.
pub fn is_always_subscribed(msg_type: u8) -> bool {
    matches!(msg_type, msg_type::PING | msg_type::PONG)
}

/// Bit index for a given packet type within the 64-bit subscription bitmap.
pub fn subscription_bit(msg_type: u8) -> u64 {
    1u64 << (msg_type as u64)
}

/// The packet types `MONITOR_FILTER` actually recognizes. Any other bit set
/// in the filter bitmap is ignored, matching the original's explicit
/// `__client_register` call per type rather than a wholesale copy of the
/// caller-supplied bitmap.
pub const FILTERABLE_TYPES: [u8; 7] = [
    msg_type::VIDEO_STREAM,
    msg_type::AUDIO_STREAM,
    msg_type::IMAGE_STREAM,
    msg_type::FILE_STREAM,
    msg_type::TEXT_STREAM,
    msg_type::EVENT,
    msg_type::CUSTOM_LOG,
];

/// Tag passed to `LogFacility::add_sink`/`remove_sink`, mirroring the
/// original's `AI_MONITOR_TAG`.
pub const LOG_SINK_NAME: &str = "ai_monitor";
