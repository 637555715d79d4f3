//! Power-line modem relay backend
//!
//! Relay modules sit between the wall and a machine's power supply and are
//! switched by a host-side tool (by default `plmpower`) that talks to the
//! power-line modem. Each module is addressed by a short device id.
//!
//! The tool prints `ON` or `OFF` for a status query. Anything else is
//! reported as [`PowerState::Unknown`].

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::backend::BackendAdapter;
use crate::error::{ExecutionError, Result};
use crate::executor::{CommandExecutor, CommandResult};
use crate::profile::DeviceProfile;
use crate::template::{program_arg, CommandTemplate};
use crate::types::{BackendKind, DesiredState, PowerState, RelayConfig};

/// Relay controller using an external modem tool
pub struct RelayAdapter {
    program: String,
    on: CommandTemplate,
    off: CommandTemplate,
    status: CommandTemplate,
    executor: Arc<dyn CommandExecutor>,
}

impl RelayAdapter {
    /// Create a new relay adapter, checking every command template
    pub fn new(config: &RelayConfig, executor: Arc<dyn CommandExecutor>) -> Result<Self> {
        Ok(Self {
            program: program_arg(&config.program)?,
            on: CommandTemplate::parse(&config.on)?,
            off: CommandTemplate::parse(&config.off)?,
            status: CommandTemplate::parse(&config.status)?,
            executor,
        })
    }

    /// Build the full argv for a template
    fn argv(&self, template: &CommandTemplate, target: &str) -> Vec<String> {
        let mut argv = vec![self.program.clone()];
        argv.extend(template.render(target));
        argv
    }

    async fn execute(
        &self,
        template: &CommandTemplate,
        profile: &DeviceProfile,
    ) -> std::result::Result<CommandResult, ExecutionError> {
        let argv = self.argv(template, profile.target());
        let result = self.executor.run(&argv, profile.command_timeout()).await?;

        if !result.success() {
            return Err(ExecutionError::BackendRejected {
                program: self.program.clone(),
                exit_code: result.exit_code,
                stderr: result.stderr_text(),
            });
        }

        Ok(result)
    }
}

/// Decode relay tool output
pub fn decode_status(output: &str) -> PowerState {
    match output.trim_end() {
        "ON" => PowerState::On,
        "OFF" => PowerState::Off,
        _ => PowerState::Unknown,
    }
}

#[async_trait]
impl BackendAdapter for RelayAdapter {
    fn kind(&self) -> BackendKind {
        BackendKind::Relay
    }

    async fn query_status(&self, profile: &DeviceProfile) -> std::result::Result<PowerState, ExecutionError> {
        let result = self.execute(&self.status, profile).await?;
        let output = result.stdout_text();
        let state = decode_status(&output);

        debug!(target_id = %profile.target(), output = %output, state = %state, "Relay status");
        Ok(state)
    }

    async fn apply_power(
        &self,
        profile: &DeviceProfile,
        desired: DesiredState,
    ) -> std::result::Result<(), ExecutionError> {
        let template = match desired {
            DesiredState::On => &self.on,
            DesiredState::Off => &self.off,
        };
        self.execute(template, profile).await?;
        Ok(())
    }
}
