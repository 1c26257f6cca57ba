use std::path::Path;

use ai_monitor_core::Config;
use serde::Deserialize;

/// On-disk configuration layout. Every field is optional so a config file
/// only needs to override what differs from the built-in defaults.
#[derive(Debug, Default, Deserialize)]
pub struct ConfigFile {
    pub port: Option<u16>,
    pub max_clients: Option<usize>,
    pub recv_buf_size: Option<usize>,
    pub send_buf_size: Option<usize>,
    pub heartbeat_interval_secs: Option<u64>,
    pub heartbeat_timeout_secs: Option<u64>,
    pub enable_broadcast: Option<bool>,
}

impl ConfigFile {
    pub fn load(path: &Path) -> std::io::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        serde_json::from_str(&raw).map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))
    }

    pub fn merge_into(self, mut base: Config) -> Config {
        if let Some(port) = self.port {
            base.port = port;
        }
        if let Some(max_clients) = self.max_clients {
            base.max_clients = max_clients;
        }
        if let Some(recv_buf_size) = self.recv_buf_size {
            base.recv_buf_size = recv_buf_size;
        }
        if let Some(send_buf_size) = self.send_buf_size {
            base.send_buf_size = send_buf_size;
        }
        if let Some(heartbeat_interval_secs) = self.heartbeat_interval_secs {
            base.heartbeat_interval_secs = heartbeat_interval_secs;
        }
        if let Some(heartbeat_timeout_secs) = self.heartbeat_timeout_secs {
            base.heartbeat_timeout_secs = heartbeat_timeout_secs;
        }
        if let Some(enable_broadcast) = self.enable_broadcast {
            base.enable_broadcast = enable_broadcast;
        }
        base
    }
}
