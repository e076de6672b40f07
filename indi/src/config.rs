//! Client configuration and BLOB delivery policy

use std::time::Duration;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::protocol::{BlobMode, INDI_PROTOCOL_VERSION};
use crate::INDI_DEFAULT_PORT;

/// Connection settings for an INDI client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub host: String,
    /// INDI server port (default: 7624)
    pub port: u16,
    /// Timeout for establishing the transport (default: 30 seconds)
    pub connection_timeout_secs: u64,
    /// Capacity of the outbound command channel (default: 100)
    pub command_buffer: usize,
    /// Per-log message cap; `None` keeps every message
    pub message_log_capacity: Option<usize>,
    /// Version announced in `getProperties`
    pub protocol_version: String,
    /// Client-wide BLOB mode (default: Never)
    pub blob_mode: BlobMode,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: INDI_DEFAULT_PORT,
            connection_timeout_secs: 30,
            command_buffer: 100,
            message_log_capacity: None,
            protocol_version: INDI_PROTOCOL_VERSION.to_string(),
            blob_mode: BlobMode::Never,
        }
    }
}

impl ClientConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// Get the connection timeout as a Duration
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs)
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// BLOB modes scoped to the client, a device, or a single property.
/// The most specific entry wins.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlobPolicy {
    default: BlobMode,
    rules: IndexMap<(String, Option<String>), BlobMode>,
}

impl BlobPolicy {
    pub fn new(default: BlobMode) -> Self {
        Self {
            default,
            rules: IndexMap::new(),
        }
    }

    pub fn default_mode(&self) -> BlobMode {
        self.default
    }

    pub fn set_default(&mut self, mode: BlobMode) {
        self.default = mode;
    }

    /// Set the mode for a device, or for one of its properties. An empty
    /// device name sets the client-wide default.
    pub fn set(&mut self, device: &str, property: Option<&str>, mode: BlobMode) {
        if device.is_empty() {
            self.set_default(mode);
            return;
        }
        self.rules
            .insert((device.to_string(), property.map(str::to_string)), mode);
    }

    pub fn mode_for(&self, device: &str, property: Option<&str>) -> BlobMode {
        if let Some(property) = property {
            let key = (device.to_string(), Some(property.to_string()));
            if let Some(mode) = self.rules.get(&key) {
                return *mode;
            }
        }
        self.rules
            .get(&(device.to_string(), None))
            .copied()
            .unwrap_or(self.default)
    }

    /// Scoped rules in the order they were first set
    pub fn rules(&self) -> Vec<(String, Option<String>, BlobMode)> {
        self.rules
            .iter()
            .map(|((device, property), mode)| (device.clone(), property.clone(), *mode))
            .collect()
    }

    /// Rules that apply to `device`, device-wide first
    pub fn rules_for(&self, device: &str) -> Vec<(Option<String>, BlobMode)> {
        let mut rules: Vec<(Option<String>, BlobMode)> = self
            .rules
            .iter()
            .filter(|((d, _), _)| d == device)
            .map(|((_, property), mode)| (property.clone(), *mode))
            .collect();
        rules.sort_by_key(|(property, _)| property.is_some());
        rules
    }
}
