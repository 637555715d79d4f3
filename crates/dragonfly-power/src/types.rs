//! Common types for power control operations

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{PowerError, Result};

/// Power state of a machine as reported by a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerState {
    /// Machine is powered on
    On,
    /// Machine is powered off
    Off,
    /// Backend output was not a recognized state
    Unknown,
    /// The status probe itself failed
    Error,
}

impl std::fmt::Display for PowerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PowerState::On => write!(f, "on"),
            PowerState::Off => write!(f, "off"),
            PowerState::Unknown => write!(f, "unknown"),
            PowerState::Error => write!(f, "error"),
        }
    }
}

/// A power state a caller may request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DesiredState {
    On,
    Off,
}

impl DesiredState {
    /// Whether an observed state satisfies this request
    pub fn is_satisfied_by(self, observed: PowerState) -> bool {
        PowerState::from(self) == observed
    }
}

impl From<DesiredState> for PowerState {
    fn from(desired: DesiredState) -> Self {
        match desired {
            DesiredState::On => PowerState::On,
            DesiredState::Off => PowerState::Off,
        }
    }
}

impl std::fmt::Display for DesiredState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&PowerState::from(*self), f)
    }
}

/// Backend hardware family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Power-line modem relay (single device id)
    Relay,
    /// Power distribution unit driven by a management script
    Pdu,
}

impl BackendKind {
    /// Whether profiles for this backend must carry credentials
    pub fn requires_credentials(self) -> bool {
        matches!(self, BackendKind::Pdu)
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Relay => write!(f, "relay"),
            BackendKind::Pdu => write!(f, "pdu"),
        }
    }
}

/// Username/password pair for backends that need one
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Relay (power-line modem) tool configuration
///
/// Each command is an argument template appended to `program`; `{target}` is
/// replaced with the device id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Relay control binary (default /usr/sbin/plmpower)
    pub program: PathBuf,
    /// Arguments for power on
    pub on: String,
    /// Arguments for power off
    pub off: String,
    /// Arguments for status query
    pub status: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("/usr/sbin/plmpower"),
            on: "on {target}".to_string(),
            off: "off {target}".to_string(),
            status: "status {target}".to_string(),
        }
    }
}

impl RelayConfig {
    /// Use a different relay binary
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }
}

/// PDU management script configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PduConfig {
    /// PDU management script (default /tftpboot/pdu_mgr)
    pub manager: PathBuf,
    /// Address of the PDU itself, passed to the manager script
    pub pdu_address: String,
    /// Manager mode code for power on
    pub on_mode: u8,
    /// Manager mode code for power off
    pub off_mode: u8,
    /// Reachability probe; `{target}` is replaced with the node address
    pub probe: String,
}

impl Default for PduConfig {
    fn default() -> Self {
        Self {
            manager: PathBuf::from("/tftpboot/pdu_mgr"),
            pdu_address: "10.0.100.1".to_string(),
            on_mode: 1,
            off_mode: 2,
            probe: "ping -c1 {target}".to_string(),
        }
    }
}

impl PduConfig {
    /// Use a different management script
    pub fn with_manager(mut self, manager: impl Into<PathBuf>) -> Self {
        self.manager = manager.into();
        self
    }

    /// Set the PDU address
    pub fn with_pdu_address(mut self, address: impl Into<String>) -> Self {
        self.pdu_address = address.into();
        self
    }

    /// Set the reachability probe template
    pub fn with_probe(mut self, probe: impl Into<String>) -> Self {
        self.probe = probe.into();
        self
    }
}

/// Backend selection with its tool configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BackendConfig {
    Relay(RelayConfig),
    Pdu(PduConfig),
}

impl BackendConfig {
    pub fn kind(&self) -> BackendKind {
        match self {
            BackendConfig::Relay(_) => BackendKind::Relay,
            BackendConfig::Pdu(_) => BackendKind::Pdu,
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig::Relay(RelayConfig::default())
    }
}

/// Derive a relay device id from a port MAC address
///
/// Relay modules are addressed by the first two hex digits of the MAC of the
/// port they switch (e.g. "14:ab:..." -> "14").
pub fn relay_target_from_mac(mac: &str) -> Result<String> {
    let id: String = mac.trim().chars().take(2).collect();
    if id.len() != 2 || !id.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(PowerError::config(format!(
            "cannot derive relay id from MAC address: {:?}",
            mac
        )));
    }
    Ok(id)
}
