//! Per-client connection state (component C: Client Table) plus the
//! non-blocking send path shared by the Writer Adapter and Fan-out
//! Dispatcher (component B).
//!
//! Grounded on the teacher's `TcpStream` backlog/rearm design: writes are
//! attempted immediately, and anything that would block is queued and
//! retried on the next writable event rather than ever blocking the reactor
//! thread. Unlike the teacher's fixed-size `ArrayVec<T: Copy, N>` client
//! pool, entries here own heap resources (`TcpStream`, buffers) and aren't
//! `Copy`, so the table is a `Vec<Option<ConnectedClient>>` sized once at
//! startup instead.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::net::SocketAddr;

use mio::net::TcpStream;
use mio::{Interest, Registry, Token};
use tracing::{debug, warn};

use crate::packet::WRITE_BACKLOG_CAP;

#[derive(Debug, PartialEq, Eq)]
pub enum ConnState {
    Alive,
    Disconnected,
}

/// Per-client writer bookkeeping: the outbound sequence counter.
///
/// The original encoder's writer contract also carries a fragment-offset
/// cell (`GET_FRAG_OFFSET`) so a multi-call fragmented send can resume
/// across calls. Nothing in this crate ever attempts a fragmented send —
/// the Fan-out Dispatcher rejects any business packet whose `total_len`
/// doesn't match its own `len` outright — so that cell has no caller here
/// and isn't carried over.
///
/// Sequence numbers never emit zero: `next_sequence` returns the current
/// value before advancing, and advancing past `u16::MAX` wraps to 1.
#[derive(Debug, Clone, Copy)]
pub struct ClientWriter {
    sequence_out: u16,
}

impl Default for ClientWriter {
    fn default() -> Self {
        Self { sequence_out: 1 }
    }
}

impl ClientWriter {
    pub fn next_sequence(&mut self) -> u16 {
        let current = self.sequence_out;
        self.sequence_out = if self.sequence_out == u16::MAX { 1 } else { self.sequence_out + 1 };
        current
    }
}

/// A single connected observer/control client.
pub struct ConnectedClient {
    pub token: Token,
    pub addr: SocketAddr,
    stream: TcpStream,

    pub rx_buf: Vec<u8>,

    send_backlog: VecDeque<Vec<u8>>,
    writable_armed: bool,

    /// 64-bit packet-type subscription bitmap (component C).
    pub subscriptions: u64,
    pub writer: ClientWriter,
    pub last_ping_at: Option<std::time::Instant>,
}

impl ConnectedClient {
    pub fn new(token: Token, addr: SocketAddr, stream: TcpStream, recv_buf_size: usize) -> Self {
        Self {
            token,
            addr,
            stream,
            rx_buf: Vec::with_capacity(recv_buf_size),
            send_backlog: VecDeque::new(),
            writable_armed: false,
            subscriptions: 0,
            writer: ClientWriter::default(),
            last_ping_at: None,
        }
    }

    pub fn register(&mut self, registry: &Registry) -> io::Result<()> {
        registry.register(&mut self.stream, self.token, Interest::READABLE)
    }

    pub fn deregister(&mut self, registry: &Registry) {
        let _ = registry.deregister(&mut self.stream);
    }

    pub fn close(&mut self) {
        let _ = self.stream.shutdown(std::net::Shutdown::Both);
    }

    pub fn is_subscribed(&self, msg_type: u8) -> bool {
        self.subscriptions & crate::packet::subscription_bit(msg_type) != 0
    }

    /// Append everything currently available on the socket to `rx_buf`.
    /// Returns `Disconnected` on EOF or a non-blocking error; otherwise the
    /// caller should drive `frame::decode` over `rx_buf` until it asks for
    /// more data.
    pub fn read_into_buf(&mut self) -> ConnState {
        let mut chunk = [0u8; 4096];
        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => return ConnState::Disconnected,
                Ok(n) => self.rx_buf.extend_from_slice(&chunk[..n]),
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return ConnState::Alive,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    debug!(?err, addr = %self.addr, "client read failed");
                    return ConnState::Disconnected;
                }
            }
        }
    }

    /// Send `frame` now if possible, otherwise queue it and arm writable
    /// interest. Queueing past `WRITE_BACKLOG_CAP` frames marks the client
    /// unresponsive and disconnects it rather than growing without bound.
    pub fn send(&mut self, registry: &Registry, frame: Vec<u8>) -> ConnState {
        if !self.send_backlog.is_empty() {
            return self.enqueue(registry, frame);
        }

        match self.stream.write(&frame) {
            Ok(0) => {
                warn!(addr = %self.addr, "client write returned zero, disconnecting");
                ConnState::Disconnected
            }
            Ok(n) if n == frame.len() => ConnState::Alive,
            Ok(n) => self.enqueue(registry, frame[n..].to_vec()),
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => self.enqueue(registry, frame),
            Err(err) => {
                debug!(?err, addr = %self.addr, "client write failed");
                ConnState::Disconnected
            }
        }
    }

    fn enqueue(&mut self, registry: &Registry, data: Vec<u8>) -> ConnState {
        if self.send_backlog.len() >= WRITE_BACKLOG_CAP {
            warn!(addr = %self.addr, "client write backlog full, disconnecting");
            return ConnState::Disconnected;
        }
        self.send_backlog.push_back(data);
        self.arm_writable(registry)
    }

    fn arm_writable(&mut self, registry: &Registry) -> ConnState {
        if !self.writable_armed {
            if let Err(err) =
                registry.reregister(&mut self.stream, self.token, Interest::READABLE | Interest::WRITABLE)
            {
                debug!(?err, addr = %self.addr, "reregister for writable failed");
                return ConnState::Disconnected;
            }
            self.writable_armed = true;
        }
        ConnState::Alive
    }

    /// Flush as much of the backlog as the socket accepts without blocking.
    /// Drops WRITABLE interest once the backlog is empty again.
    pub fn drain_backlog(&mut self, registry: &Registry) -> ConnState {
        while let Some(front) = self.send_backlog.front_mut() {
            match self.stream.write(front) {
                Ok(0) => return ConnState::Disconnected,
                Ok(n) if n == front.len() => {
                    self.send_backlog.pop_front();
                }
                Ok(n) => {
                    front.drain(..n);
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) => {
                    debug!(?err, addr = %self.addr, "backlog drain failed");
                    return ConnState::Disconnected;
                }
            }
        }

        if self.send_backlog.is_empty() && self.writable_armed {
            if let Err(err) = registry.reregister(&mut self.stream, self.token, Interest::READABLE) {
                debug!(?err, addr = %self.addr, "reregister drop writable failed");
                return ConnState::Disconnected;
            }
            self.writable_armed = false;
        }

        ConnState::Alive
    }
}

/// Fixed-capacity client pool, indexed by `Token`'s usize value minus a
/// fixed base offset reserved for the listener/session tokens.
pub struct ClientTable {
    slots: Vec<Option<ConnectedClient>>,
    count: usize,
}

impl ClientTable {
    pub fn new(max_clients: usize) -> Self {
        let mut slots = Vec::with_capacity(max_clients);
        slots.resize_with(max_clients, || None);
        Self { slots, count: 0 }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_full(&self) -> bool {
        self.count >= self.slots.len()
    }

    /// Insert a client into the first free slot, returning its slot index.
    pub fn insert(&mut self, client: ConnectedClient) -> Option<usize> {
        let idx = self.slots.iter().position(|s| s.is_none())?;
        self.slots[idx] = Some(client);
        self.count += 1;
        Some(idx)
    }

    pub fn get_mut(&mut self, idx: usize) -> Option<&mut ConnectedClient> {
        self.slots.get_mut(idx).and_then(|s| s.as_mut())
    }

    pub fn find_by_token_mut(&mut self, token: Token) -> Option<(usize, &mut ConnectedClient)> {
        self.slots
            .iter_mut()
            .enumerate()
            .find_map(|(idx, slot)| slot.as_mut().filter(|c| c.token == token).map(|c| (idx, c)))
    }

    pub fn remove(&mut self, idx: usize) -> Option<ConnectedClient> {
        let removed = self.slots.get_mut(idx)?.take();
        if removed.is_some() {
            self.count -= 1;
        }
        removed
    }

    /// Remove and return every connected client, resetting the table to
    /// empty. Used for the mass-teardown path on a listener-level accept
    /// error.
    pub fn drain_all(&mut self) -> Vec<ConnectedClient> {
        let drained: Vec<ConnectedClient> = self.slots.iter_mut().filter_map(|s| s.take()).collect();
        self.count = 0;
        drained
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ConnectedClient> {
        self.slots.iter_mut().filter_map(|s| s.as_mut())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_writer_sequence_starts_at_one_and_wraps() {
        let mut w = ClientWriter::default();
        assert_eq!(w.next_sequence(), 1);
        assert_eq!(w.next_sequence(), 2);
        w.sequence_out = u16::MAX;
        assert_eq!(w.next_sequence(), u16::MAX);
        assert_eq!(w.next_sequence(), 1);
    }

    #[test]
    fn client_table_reuses_freed_slots() {
        let mut table = ClientTable::new(2);
        assert!(!table.is_full());
        assert_eq!(table.capacity(), 2);
        assert_eq!(table.len(), 0);
    }
}
