use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::thread;
use std::time::Duration;

use ai_monitor_core::collaborators::{ActivationGate, LogFacility, LogLevel, NetworkManager};
use ai_monitor_core::fanout::BizHead;
use ai_monitor_core::{Config, Service};

struct AlwaysReady;
impl NetworkManager for AlwaysReady {
    fn is_network_ready(&self) -> bool {
        true
    }
}
impl ActivationGate for AlwaysReady {
    fn is_activated(&self) -> bool {
        true
    }
}
struct SilentLog;
impl LogFacility for SilentLog {
    fn emit(&self, _level: LogLevel, _message: &str) {}
    fn add_sink(&self, _name: &str) {}
    fn remove_sink(&self, _name: &str) {}
}

const MAGIC: [u8; 4] = 0x5459_4149u32.to_be_bytes();
const MSG_TYPE_TEXT_STREAM: u8 = 34;
const MSG_TYPE_AUDIO_STREAM: u8 = 31;

fn encode_attribute(attr_type: u8, value: &[u8]) -> Vec<u8> {
    let mut out = vec![attr_type];
    out.extend_from_slice(&(value.len() as u32).to_be_bytes());
    out.extend_from_slice(value);
    out
}

/// Build a MONITOR_FILTER EVENT frame subscribing only to `msg_type` (plus
/// whatever else is already set in `bitmap`).
fn build_filter_event_frame(sequence: u16, bitmap: u64) -> Vec<u8> {
    let session_id = b"sess-1";
    let event_id = b"evt-1";
    let mut attrs = Vec::new();
    attrs.extend_from_slice(&encode_attribute(3, session_id)); // SESSION_ID
    attrs.extend_from_slice(&encode_attribute(4, event_id)); // EVENT_ID
    attrs.extend_from_slice(&encode_attribute(5, &bitmap.to_be_bytes())); // USER_DATA

    let mut body = vec![35u8]; // msg_type = EVENT
    body.push(1); // attribute_flag = has_attr

    body.push(1); // event body's own has_attr flag
    body.extend_from_slice(&(attrs.len() as u32).to_be_bytes());
    body.extend_from_slice(&attrs);

    body.extend_from_slice(&0xF000u16.to_be_bytes()); // MONITOR_FILTER
    body.extend_from_slice(&0u16.to_be_bytes()); // head_len = 0

    let mut frame = Vec::new();
    frame.extend_from_slice(&MAGIC);
    frame.push(2); // direction ACK
    frame.push(1);
    frame.push(0);
    frame.push(0);
    frame.push(0);
    frame.extend_from_slice(&sequence.to_be_bytes());
    frame.extend_from_slice(&[0, 0]);
    frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
    frame.extend_from_slice(&body);
    frame
}

#[test]
fn client_only_receives_packet_types_it_subscribed_to() {
    let port = 15_303;
    let cfg = Config { port, ..Config::default() };
    let mut service = Service::new(cfg, AlwaysReady, AlwaysReady, SilentLog).unwrap();

    let server = thread::spawn(move || {
        let deadline = std::time::Instant::now() + Duration::from_secs(3);
        while std::time::Instant::now() < deadline {
            service.poll_once().unwrap();
            service
                .dispatch_business_packet(
                    1,
                    MSG_TYPE_TEXT_STREAM,
                    &BizHead { stream_flag: 0b11, total_len: 5, len: 5 },
                    b"hello",
                )
                .unwrap();
            service
                .dispatch_business_packet(
                    1,
                    MSG_TYPE_AUDIO_STREAM,
                    &BizHead { stream_flag: 0b11, total_len: 5, len: 5 },
                    b"audio",
                )
                .unwrap();
            thread::sleep(Duration::from_millis(10));
        }
    });

    thread::sleep(Duration::from_millis(100));
    let addr: SocketAddr = format!("127.0.0.1:{port}").parse().unwrap();
    let mut stream = TcpStream::connect_timeout(&addr, Duration::from_secs(2)).unwrap();
    stream.set_read_timeout(Some(Duration::from_millis(500))).unwrap();

    // Subscribe only to TEXT_STREAM (bit 34).
    let bitmap = 1u64 << MSG_TYPE_TEXT_STREAM as u64;
    stream.write_all(&build_filter_event_frame(1, bitmap)).unwrap();

    // First reply is the EVENT ack; keep reading until a TEXT_STREAM frame
    // with our payload turns up, and make sure no AUDIO_STREAM frame ever
    // does.
    let mut saw_text = false;
    let mut buf = vec![0u8; 4096];
    for _ in 0..20 {
        match stream.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                if buf[..n].windows(b"hello".len()).any(|w| w == b"hello") {
                    saw_text = true;
                }
                assert!(
                    !buf[..n].windows(b"audio".len()).any(|w| w == b"audio"),
                    "unsubscribed packet type leaked to client"
                );
                if saw_text {
                    break;
                }
            }
            Err(_) => break,
        }
    }

    assert!(saw_text, "expected the subscribed TEXT_STREAM payload to arrive");
    server.join().unwrap();
}
