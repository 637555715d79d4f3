//! Dragonfly Out-of-Band Power Control
//!
//! This crate turns physical machines on and off and power cycles them
//! through external power hardware, for machines without a usable BMC.
//!
//! # Supported Backends
//!
//! - **Relay**: power-line modem relay modules switched by a host-side tool
//! - **PDU**: power distribution unit outlets switched by a management script,
//!   with status inferred from node reachability
//!
//! Every request is verified: after a command the device is probed, and the
//! command is re-issued (a bounded number of times) until the probe reports
//! the requested state.
//!
//! # Example
//!
//! ```no_run
//! use dragonfly_power::{BackendConfig, DesiredState, DeviceProfile, PowerDriver, RelayConfig};
//!
//! # async fn example() -> dragonfly_power::Result<()> {
//! let profile = DeviceProfile::builder("14", BackendConfig::Relay(RelayConfig::default()))
//!     .max_retries(2)
//!     .build()?;
//!
//! let driver = PowerDriver::default();
//! driver.validate(&profile)?;
//!
//! driver.set_power_state(&profile, DesiredState::On).await?;
//! driver.reboot(&profile).await?;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod controller;
pub mod driver;
pub mod error;
pub mod executor;
pub mod pdu;
pub mod profile;
pub mod relay;
pub mod template;
pub mod types;

#[cfg(test)]
mod testing;

pub use backend::{build_adapter, BackendAdapter};
pub use controller::PowerController;
pub use driver::PowerDriver;
pub use error::{ExecutionError, ExecutionErrorKind, PowerError, Result};
pub use executor::{CommandExecutor, CommandResult, ProcessExecutor};
pub use pdu::PduAdapter;
pub use profile::{DeviceProfile, DeviceProfileBuilder, ProfileSpec};
pub use relay::RelayAdapter;
pub use types::{
    relay_target_from_mac, BackendConfig, BackendKind, Credentials, DesiredState, PduConfig,
    PowerState, RelayConfig,
};
