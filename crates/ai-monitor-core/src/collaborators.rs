//! External collaborator traits.
//!
//! Everything else this service touches — the LAN TCP listener/socket plumbing
//! and the upstream AI session's packet stream — is owned directly by this
//! crate (components A-H). These three traits are the genuine seams: systems
//! that exist outside the monitor and that a host firmware build wires in.

/// Network readiness gate. The monitor only opens its listener once the
/// device has network connectivity, matching the original's dependency on
/// the platform network manager before binding.
pub trait NetworkManager: Send {
    fn is_network_ready(&self) -> bool;
}

/// IoT-activation gate (component G). The listener stays closed until the
/// device has completed activation, re-checked on a fixed interval by the
/// heartbeat `Repeater`.
pub trait ActivationGate: Send {
    fn is_activated(&self) -> bool;
}

/// Structured log sink for anything the monitor wants to surface outside of
/// `tracing` (the original's platform log hooks), plus the named
/// add/remove-sink seam the original drives off the CUSTOM_LOG subscription
/// bit (`tal_log_add_output_term`/`tal_log_del_output_term`). The service
/// reference-counts subscribers itself and calls `add_sink`/`remove_sink`
/// only on the 0-to-1 and 1-to-0 transitions; a firmware build wires these
/// into its platform log facility.
pub trait LogFacility: Send {
    fn emit(&self, level: LogLevel, message: &str);

    fn add_sink(&self, name: &str);
    fn remove_sink(&self, name: &str);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// No-op `LogFacility`, used where a firmware build has nothing further to
/// wire in beyond `tracing`.
pub struct NullLogFacility;

impl LogFacility for NullLogFacility {
    fn emit(&self, _level: LogLevel, _message: &str) {}
    fn add_sink(&self, _name: &str) {}
    fn remove_sink(&self, _name: &str) {}
}
