//! PDU backend
//!
//! Outlets on the power distribution unit are switched by a management
//! script invoked as `<manager> <pdu-address> <mode>`. The PDU cannot report
//! outlet state, so status is inferred from whether the node answers a
//! reachability probe (by default a single ping): reachable means on.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::backend::BackendAdapter;
use crate::error::{ExecutionError, Result};
use crate::executor::CommandExecutor;
use crate::profile::DeviceProfile;
use crate::template::{program_arg, CommandTemplate};
use crate::types::{BackendKind, DesiredState, PduConfig, PowerState};

/// PDU controller using an external management script
pub struct PduAdapter {
    manager: String,
    pdu_address: String,
    on_mode: u8,
    off_mode: u8,
    probe: CommandTemplate,
    executor: Arc<dyn CommandExecutor>,
}

impl PduAdapter {
    /// Create a new PDU adapter, checking the probe template
    pub fn new(config: &PduConfig, executor: Arc<dyn CommandExecutor>) -> Result<Self> {
        Ok(Self {
            manager: program_arg(&config.manager)?,
            pdu_address: config.pdu_address.clone(),
            on_mode: config.on_mode,
            off_mode: config.off_mode,
            probe: CommandTemplate::parse(&config.probe)?,
            executor,
        })
    }

    fn manager_args(&self, desired: DesiredState) -> Vec<String> {
        let mode = match desired {
            DesiredState::On => self.on_mode,
            DesiredState::Off => self.off_mode,
        };
        vec![self.manager.clone(), self.pdu_address.clone(), mode.to_string()]
    }
}

#[async_trait]
impl BackendAdapter for PduAdapter {
    fn kind(&self) -> BackendKind {
        BackendKind::Pdu
    }

    async fn query_status(&self, profile: &DeviceProfile) -> std::result::Result<PowerState, ExecutionError> {
        let argv = self.probe.render(profile.target());
        let result = self.executor.run(&argv, profile.command_timeout()).await?;

        let state = if result.success() {
            PowerState::On
        } else {
            PowerState::Off
        };
        debug!(target_id = %profile.target(), exit_code = result.exit_code, state = %state, "PDU probe");
        Ok(state)
    }

    async fn apply_power(
        &self,
        profile: &DeviceProfile,
        desired: DesiredState,
    ) -> std::result::Result<(), ExecutionError> {
        let argv = self.manager_args(desired);
        let result = self.executor.run(&argv, profile.command_timeout()).await?;

        if !result.success() {
            warn!(
                target_id = %profile.target(),
                pdu = %self.pdu_address,
                exit_code = result.exit_code,
                "PDU manager failed"
            );
            return Err(ExecutionError::BackendRejected {
                program: self.manager.clone(),
                exit_code: result.exit_code,
                stderr: result.stderr_text(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ExecutionErrorKind, PowerError};
    use crate::testing::{output, timeout, ScriptedExecutor};
    use crate::types::BackendConfig;

    fn profile() -> DeviceProfile {
        DeviceProfile::builder("10.0.100.20", BackendConfig::Pdu(PduConfig::default()))
            .credentials("admin", "secret")
            .build()
            .unwrap()
    }

    fn adapter(executor: Arc<ScriptedExecutor>) -> PduAdapter {
        PduAdapter::new(&PduConfig::default(), executor).unwrap()
    }

    #[tokio::test]
    async fn test_reachable_node_is_on() {
        let executor = Arc::new(ScriptedExecutor::new(|_| Ok(output(0, "64 bytes from 10.0.100.20"))));
        let adapter = adapter(executor.clone());

        assert_eq!(adapter.query_status(&profile()).await.unwrap(), PowerState::On);
        assert_eq!(
            executor.calls(),
            vec![vec!["ping".to_string(), "-c1".to_string(), "10.0.100.20".to_string()]]
        );
    }

    #[tokio::test]
    async fn test_unreachable_node_is_off() {
        let executor = Arc::new(ScriptedExecutor::new(|_| Ok(output(1, ""))));
        let state = adapter(executor).query_status(&profile()).await.unwrap();
        assert_eq!(state, PowerState::Off);
    }

    #[tokio::test]
    async fn test_reachability_timeout_propagates() {
        let executor = Arc::new(ScriptedExecutor::new(|_| Err(timeout("ping"))));
        let err = adapter(executor).query_status(&profile()).await.unwrap_err();
        assert_eq!(err.kind(), ExecutionErrorKind::Timeout);
    }

    #[tokio::test]
    async fn test_manager_mode_codes() {
        let executor = Arc::new(ScriptedExecutor::new(|_| Ok(output(0, ""))));
        let adapter = adapter(executor.clone());

        adapter.apply_power(&profile(), DesiredState::On).await.unwrap();
        adapter.apply_power(&profile(), DesiredState::Off).await.unwrap();

        let calls = executor.calls();
        assert_eq!(calls[0], vec!["/tftpboot/pdu_mgr", "10.0.100.1", "1"]);
        assert_eq!(calls[1], vec!["/tftpboot/pdu_mgr", "10.0.100.1", "2"]);
    }

    #[tokio::test]
    async fn test_manager_failure_is_backend_rejected() {
        let executor = Arc::new(ScriptedExecutor::new(|_| Ok(output(5, ""))));
        let err = adapter(executor)
            .apply_power(&profile(), DesiredState::On)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ExecutionErrorKind::BackendRejected);
        assert_eq!(err.exit_code(), Some(5));
    }

    #[test]
    fn test_custom_reachability_template() {
        let config = PduConfig::default().with_probe("fping -t 500 {target}");
        let executor = Arc::new(ScriptedExecutor::new(|_| Ok(output(0, ""))));
        let adapter = PduAdapter::new(&config, executor).unwrap();
        assert_eq!(adapter.probe.render("node7"), vec!["fping", "-t", "500", "node7"]);

        let config = PduConfig::default().with_probe("ping -c1");
        let executor = Arc::new(ScriptedExecutor::new(|_| Ok(output(0, ""))));
        assert!(PduAdapter::new(&config, executor).is_err());
    }

    #[test]
    fn test_non_utf8_manager_rejected() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let config = PduConfig::default().with_manager(OsStr::from_bytes(b"/tftpboot/\xfe_mgr"));
        let executor = Arc::new(ScriptedExecutor::new(|_| Ok(output(0, ""))));
        let err = PduAdapter::new(&config, executor).err().unwrap();
        assert!(matches!(err, PowerError::Config(_)));
    }
}
