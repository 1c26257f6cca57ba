//! Core protocol and service logic for the on-device AI monitor TCP server.
//!
//! Multiplexes a running AI session's upstream/downstream packet traffic to
//! LAN-connected observer/control clients, using a resync-capable binary
//! framing protocol and a per-client subscription filter.

pub mod attr;
pub mod broadcast;
pub mod client;
pub mod collaborators;
pub mod error;
pub mod fanout;
pub mod frame;
pub mod inbound;
pub mod packet;
pub mod service;
pub mod timer;
pub mod writer;

pub use client::{ClientTable, ConnState, ConnectedClient};
pub use collaborators::{ActivationGate, LogFacility, NetworkManager};
pub use error::{MonitorError, Result};
pub use service::{Config, Service, ServiceState};
