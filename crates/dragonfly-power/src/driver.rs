//! Caller-facing power driver
//!
//! [`PowerDriver`] is what an orchestrator holds: it builds the adapter for
//! each profile and hands it to the [`PowerController`].

use std::sync::Arc;
use tracing::instrument;

use crate::backend::{build_adapter, BackendAdapter};
use crate::controller::PowerController;
use crate::error::Result;
use crate::executor::{CommandExecutor, ProcessExecutor};
use crate::profile::DeviceProfile;
use crate::types::{DesiredState, PowerState};

/// Out-of-band power control entry point
#[derive(Clone)]
pub struct PowerDriver {
    executor: Arc<dyn CommandExecutor>,
    controller: PowerController,
}

impl Default for PowerDriver {
    fn default() -> Self {
        Self::new(Arc::new(ProcessExecutor::new()))
    }
}

impl PowerDriver {
    /// Create a driver that runs backend commands through `executor`
    pub fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self {
            executor,
            controller: PowerController::new(),
        }
    }

    fn adapter(&self, profile: &DeviceProfile) -> Result<Box<dyn BackendAdapter>> {
        build_adapter(profile, self.executor.clone())
    }

    /// Check a profile without touching the hardware
    pub fn validate(&self, profile: &DeviceProfile) -> Result<()> {
        profile.validate()?;
        self.adapter(profile)?;
        Ok(())
    }

    /// Current power state
    #[instrument(skip_all, fields(target_id = %profile.target(), backend = %profile.backend_kind()))]
    pub async fn get_power_state(&self, profile: &DeviceProfile) -> Result<PowerState> {
        let adapter = self.adapter(profile)?;
        self.controller.get_status(profile, adapter.as_ref()).await
    }

    /// Turn the device on or off and verify it
    #[instrument(skip_all, fields(target_id = %profile.target(), backend = %profile.backend_kind(), desired = %desired))]
    pub async fn set_power_state(
        &self,
        profile: &DeviceProfile,
        desired: DesiredState,
    ) -> Result<PowerState> {
        let adapter = self.adapter(profile)?;
        self.controller.set_power(profile, adapter.as_ref(), desired).await
    }

    /// Power cycle the device
    #[instrument(skip_all, fields(target_id = %profile.target(), backend = %profile.backend_kind()))]
    pub async fn reboot(&self, profile: &DeviceProfile) -> Result<PowerState> {
        let adapter = self.adapter(profile)?;
        self.controller.reboot(profile, adapter.as_ref()).await
    }
}

impl std::fmt::Debug for PowerDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PowerDriver").finish_non_exhaustive()
    }
}
