//! Service state and event loop (components G and H).
//!
//! Single-threaded, mio-driven reactor grounded on the teacher's
//! `ConnectionManager`/`TcpConnector`: one `Poll`, a fixed listener token, and
//! per-connection tokens handed out monotonically. Unlike the teacher's
//! connector (which also manages outbound/reconnecting peers), this service
//! only ever accepts inbound observer connections — there is nothing to
//! reconnect to.

use std::net::SocketAddr;
use std::time::Duration;

use mio::net::TcpListener;
use mio::{Events, Interest, Poll, Token};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::client::{ClientTable, ConnState, ConnectedClient};
use crate::collaborators::{ActivationGate, LogFacility, LogLevel, NetworkManager};
use crate::error::{MonitorError, Result};
use crate::fanout::{self, BizHead};
use crate::frame::{self, FrameStep};
use crate::inbound;
use crate::packet;
use crate::timer::Repeater;

const LISTENER_TOKEN: Token = Token(0);
const FIRST_CLIENT_TOKEN: usize = 1;
/// Matches the upstream heartbeat timer's fixed 2-second period for
/// checking activation/network readiness before opening the listener.
const LISTEN_RETRY_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub port: u16,
    pub max_clients: usize,
    pub recv_buf_size: usize,
    pub send_buf_size: usize,
    pub heartbeat_interval_secs: u64,
    pub heartbeat_timeout_secs: u64,
    pub enable_broadcast: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: packet::PORT_DEFAULT,
            max_clients: packet::MAX_CLIENTS_DEFAULT,
            recv_buf_size: packet::RECV_BUF_SIZE_DEFAULT,
            send_buf_size: packet::SEND_BUF_SIZE_DEFAULT,
            heartbeat_interval_secs: packet::HEARTBEAT_INTERVAL_DEFAULT_SECS,
            heartbeat_timeout_secs: packet::HEARTBEAT_TIMEOUT_DEFAULT_SECS,
            enable_broadcast: true,
        }
    }
}

impl Config {
    /// Reject configurations that can't be turned into a working service,
    /// rather than surfacing the failure later as a confusing bind/alloc
    /// error.
    pub fn validated(self) -> Result<Self> {
        if self.port == 0 {
            return Err(MonitorError::invalid("port must be nonzero"));
        }
        if self.max_clients == 0 {
            return Err(MonitorError::invalid("max_clients must be at least 1"));
        }
        if self.recv_buf_size == 0 || self.send_buf_size == 0 {
            return Err(MonitorError::invalid("recv/send buffer sizes must be nonzero"));
        }
        if self.heartbeat_timeout_secs < self.heartbeat_interval_secs {
            return Err(MonitorError::invalid("heartbeat_timeout_secs must be >= heartbeat_interval_secs"));
        }
        Ok(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Stopped,
    Running,
}

pub struct Service<N, A, L> {
    config: Config,
    poll: Poll,
    events: Events,
    listener: Option<TcpListener>,
    next_token: usize,
    table: ClientTable,
    listen_gate: Repeater,
    network: N,
    activation: A,
    log: L,
    /// Count of clients currently subscribed to CUSTOM_LOG. `log.add_sink`/
    /// `remove_sink` only fire on the 0-to-1/1-to-0 transitions.
    custom_log_subscribers: usize,
    state: ServiceState,
}

impl<N: NetworkManager, A: ActivationGate, L: LogFacility> Service<N, A, L> {
    pub fn new(config: Config, network: N, activation: A, log: L) -> Result<Self> {
        let config = config.validated()?;
        let table = ClientTable::new(config.max_clients);
        Ok(Self {
            config,
            poll: Poll::new().map_err(MonitorError::from)?,
            events: Events::with_capacity(128),
            listener: None,
            next_token: FIRST_CLIENT_TOKEN,
            table,
            listen_gate: Repeater::every(LISTEN_RETRY_INTERVAL),
            network,
            activation,
            log,
            custom_log_subscribers: 0,
            state: ServiceState::Stopped,
        })
    }

    pub fn state(&self) -> ServiceState {
        self.state
    }

    pub fn client_count(&self) -> usize {
        self.table.len()
    }

    pub fn is_listening(&self) -> bool {
        self.listener.is_some()
    }

    /// Drive one iteration: maybe open the listener, poll `mio` with a
    /// zero timeout, and dispatch whatever is ready. Safe to call in a tight
    /// loop — it never blocks.
    pub fn poll_once(&mut self) -> Result<()> {
        if self.listener.is_none() && self.listen_gate.fired() {
            self.maybe_create_listener();
        }

        if let Err(err) = self.poll.poll(&mut self.events, Some(Duration::ZERO)) {
            ai_monitor_utils::safe_panic!("got error polling {err}");
            return Ok(());
        }

        let ready: Vec<(Token, bool, bool)> =
            self.events.iter().map(|e| (e.token(), e.is_readable(), e.is_writable())).collect();

        for (token, readable, writable) in ready {
            if token == LISTENER_TOKEN {
                self.handle_accept();
                continue;
            }
            self.handle_client_event(token, readable, writable);
        }

        Ok(())
    }

    fn maybe_create_listener(&mut self) {
        if !self.network.is_network_ready() {
            debug!("network not ready, deferring listener creation");
            return;
        }
        if !self.activation.is_activated() {
            debug!("device not activated, deferring listener creation");
            return;
        }

        let addr: SocketAddr = format!("0.0.0.0:{}", self.config.port).parse().expect("valid bind address");
        match TcpListener::bind(addr) {
            Ok(mut listener) => {
                if let Err(err) = self.poll.registry().register(&mut listener, LISTENER_TOKEN, Interest::READABLE) {
                    error!(?err, "failed to register monitor listener");
                    return;
                }
                info!(port = self.config.port, "AI monitor listening");
                self.listener = Some(listener);
                self.state = ServiceState::Running;
            }
            Err(err) => {
                warn!(?err, port = self.config.port, "failed to bind monitor listener");
            }
        }
    }

    fn handle_accept(&mut self) {
        let Some(listener) = self.listener.as_mut() else { return };
        loop {
            match listener.accept() {
                Ok((stream, addr)) => self.accept_one(stream, addr),
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(err) => {
                    error!(?err, "accept failed, tearing down listener and all clients");
                    self.teardown_all();
                    break;
                }
            }
        }
    }

    fn accept_one(&mut self, stream: mio::net::TcpStream, addr: SocketAddr) {
        if self.table.is_full() {
            warn!(%addr, "max clients reached, rejecting connection");
            drop(stream);
            return;
        }

        let token = Token(self.next_token);
        self.next_token += 1;

        let mut client = ConnectedClient::new(token, addr, stream, self.config.recv_buf_size);
        if let Err(err) = client.register(self.poll.registry()) {
            error!(?err, %addr, "failed to register accepted client");
            return;
        }

        if self.table.insert(client).is_none() {
            ai_monitor_utils::safe_assert!(false, "no free client slot despite capacity check for {addr}");
            return;
        }
        info!(%addr, count = self.table.len(), "client connected");
    }

    fn handle_client_event(&mut self, token: Token, readable: bool, writable: bool) {
        // `poll` and `table` are disjoint fields of `self`; borrowing them
        // separately here (rather than through helpers taking `&mut self`)
        // lets both live at once, the same pattern the teacher's connector
        // relies on.
        let registry = self.poll.registry();
        let Some((idx, client)) = self.table.find_by_token_mut(token) else {
            ai_monitor_utils::safe_panic!("got event for unknown token: {token:?}");
            return;
        };

        if readable && client.read_into_buf() == ConnState::Disconnected {
            self.cleanup_client(idx);
            return;
        }

        if Self::process_buffered_frames(
            self.table.get_mut(idx),
            registry,
            &self.log,
            &mut self.custom_log_subscribers,
        )
        .is_err()
        {
            self.cleanup_client(idx);
            return;
        }

        let registry = self.poll.registry();
        let Some(client) = self.table.get_mut(idx) else { return };
        if writable && client.drain_backlog(registry) == ConnState::Disconnected {
            self.cleanup_client(idx);
        }
    }

    /// Drain every complete frame currently buffered for one client, routing
    /// control-plane packets to the Inbound Handler. Returns `Err` once the
    /// peer should be disconnected (caller is responsible for cleanup, since
    /// that needs `&mut self.table`).
    ///
    /// Also drives the CUSTOM_LOG add/remove-sink side effect: a
    /// `MONITOR_FILTER` event may flip the client's CUSTOM_LOG subscription
    /// bit, and `custom_log_subscribers` is the service-wide reference count
    /// that decides whether `log.add_sink`/`remove_sink` actually fires
    /// (only on the 0-to-1/1-to-0 transition, so one client unsubscribing
    /// doesn't silence the sink for another that's still subscribed).
    fn process_buffered_frames(
        client: Option<&mut ConnectedClient>,
        registry: &mio::Registry,
        log: &L,
        custom_log_subscribers: &mut usize,
    ) -> std::result::Result<(), ()> {
        let Some(client) = client else { return Err(()) };
        loop {
            let step_owned = match frame::decode(&client.rx_buf) {
                FrameStep::NeedMore => return Ok(()),
                FrameStep::Skip { consumed } => {
                    client.rx_buf.drain(..consumed);
                    if consumed == 0 {
                        return Ok(());
                    }
                    continue;
                }
                FrameStep::Frame { body, consumed, .. } => (body.to_vec(), consumed),
            };

            let (body, consumed) = step_owned;
            client.rx_buf.drain(..consumed);

            if body.len() < 2 {
                warn!("dropped frame with no payload head");
                continue;
            }
            let msg_type_code = body[0];
            let payload = &body[2..];

            let was_log_subscribed = client.is_subscribed(packet::msg_type::CUSTOM_LOG);
            let outcome = inbound::handle_inbound_packet(client, registry, msg_type_code, payload);
            let is_log_subscribed = client.is_subscribed(packet::msg_type::CUSTOM_LOG);
            if is_log_subscribed != was_log_subscribed {
                Self::update_custom_log_sink(log, custom_log_subscribers, is_log_subscribed);
            }

            match outcome {
                Ok(ConnState::Disconnected) => return Err(()),
                Ok(ConnState::Alive) => {}
                Err(err) => {
                    debug!(?err, msg_type_code, "inbound packet handling failed");
                }
            }
        }
    }

    /// Apply one client's CUSTOM_LOG subscribe/unsubscribe transition to the
    /// service-wide reference count, firing `add_sink`/`remove_sink` only
    /// when the count crosses 0.
    fn update_custom_log_sink(log: &L, custom_log_subscribers: &mut usize, now_subscribed: bool) {
        if now_subscribed {
            *custom_log_subscribers += 1;
            if *custom_log_subscribers == 1 {
                log.add_sink(packet::LOG_SINK_NAME);
            }
        } else {
            *custom_log_subscribers = custom_log_subscribers.saturating_sub(1);
            if *custom_log_subscribers == 0 {
                log.remove_sink(packet::LOG_SINK_NAME);
            }
        }
    }

    fn cleanup_client(&mut self, idx: usize) {
        if let Some(mut client) = self.table.remove(idx) {
            if client.is_subscribed(packet::msg_type::CUSTOM_LOG) {
                Self::update_custom_log_sink(&self.log, &mut self.custom_log_subscribers, false);
            }
            client.deregister(self.poll.registry());
            client.close();
            info!(addr = %client.addr, count = self.table.len(), "client disconnected");
        }
    }

    /// Mass teardown on a listener-level accept error: unregister and close
    /// the listener, release every connected client, and rearm the
    /// listen-creation gate so a fresh listener is attempted on the next
    /// heartbeat.
    fn teardown_all(&mut self) {
        if let Some(mut listener) = self.listener.take() {
            let _ = self.poll.registry().deregister(&mut listener);
        }
        for mut client in self.table.drain_all() {
            client.deregister(self.poll.registry());
            client.close();
        }
        if self.custom_log_subscribers > 0 {
            self.custom_log_subscribers = 0;
            self.log.remove_sink(packet::LOG_SINK_NAME);
        }
        self.state = ServiceState::Stopped;
        self.listen_gate.force_fire();
        self.log.emit(LogLevel::Error, "AI monitor listener failed; all sessions torn down");
    }

    pub fn broadcast_text(&mut self, data: &[u8]) -> Result<()> {
        if !self.config.enable_broadcast {
            return Ok(());
        }
        crate::broadcast::broadcast_text(&mut self.table, self.poll.registry(), data)
    }

    pub fn broadcast_log(&mut self, data: &[u8]) -> Result<()> {
        if !self.config.enable_broadcast {
            return Ok(());
        }
        crate::broadcast::broadcast_log(&mut self.table, self.poll.registry(), data)
    }

    pub fn broadcast_audio_mic(&mut self, stream_flag_bits: u8, data: &[u8]) -> Result<()> {
        crate::broadcast::broadcast_audio_mic(&mut self.table, self.poll.registry(), stream_flag_bits, data)
    }

    pub fn broadcast_audio_ref(&mut self, stream_flag_bits: u8, data: &[u8]) -> Result<()> {
        crate::broadcast::broadcast_audio_ref(&mut self.table, self.poll.registry(), stream_flag_bits, data)
    }

    pub fn broadcast_audio_aec(&mut self, stream_flag_bits: u8, data: &[u8]) -> Result<()> {
        crate::broadcast::broadcast_audio_aec(&mut self.table, self.poll.registry(), stream_flag_bits, data)
    }

    /// Relay a raw upstream/downstream business packet to subscribed
    /// observers (component E). Called directly by the host AI session
    /// pipeline, which this core doesn't own.
    pub fn dispatch_business_packet(&mut self, direction: u8, msg_type: u8, head: &BizHead, body: &[u8]) -> Result<()> {
        fanout::dispatch(&mut self.table, self.poll.registry(), direction, msg_type, head, body)
    }
}
