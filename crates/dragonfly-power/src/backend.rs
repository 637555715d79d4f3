//! Backend adapter trait and construction

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::{ExecutionError, Result};
use crate::executor::CommandExecutor;
use crate::pdu::PduAdapter;
use crate::profile::DeviceProfile;
use crate::relay::RelayAdapter;
use crate::types::{BackendConfig, BackendKind, DesiredState, PowerState};

/// Translates power intents into backend commands
///
/// Adapters issue exactly one command per call and never retry or verify;
/// that is the job of [`PowerController`](crate::controller::PowerController).
#[async_trait]
pub trait BackendAdapter: Send + Sync {
    /// Backend family this adapter drives
    fn kind(&self) -> BackendKind;

    /// Probe the current power state with a single command
    ///
    /// Unrecognized output decodes to [`PowerState::Unknown`].
    async fn query_status(&self, profile: &DeviceProfile) -> std::result::Result<PowerState, ExecutionError>;

    /// Issue the single mutating command for `desired`
    async fn apply_power(
        &self,
        profile: &DeviceProfile,
        desired: DesiredState,
    ) -> std::result::Result<(), ExecutionError>;
}

/// Build the adapter selected by the profile's backend configuration
///
/// Command templates are checked here, so a malformed template fails before
/// any command runs.
pub fn build_adapter(
    profile: &DeviceProfile,
    executor: Arc<dyn CommandExecutor>,
) -> Result<Box<dyn BackendAdapter>> {
    let adapter: Box<dyn BackendAdapter> = match profile.backend() {
        BackendConfig::Relay(config) => Box::new(RelayAdapter::new(config, executor)?),
        BackendConfig::Pdu(config) => Box::new(PduAdapter::new(config, executor)?),
    };
    Ok(adapter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PowerError;
    use crate::testing::ScriptedExecutor;
    use crate::types::{PduConfig, RelayConfig};

    fn executor() -> Arc<dyn CommandExecutor> {
        Arc::new(ScriptedExecutor::new(|_| unreachable!("no command expected")))
    }

    #[test]
    fn test_build_relay_adapter() {
        let profile = DeviceProfile::builder("14", BackendConfig::Relay(RelayConfig::default()))
            .build()
            .unwrap();
        let adapter = build_adapter(&profile, executor()).unwrap();
        assert_eq!(adapter.kind(), BackendKind::Relay);
    }

    #[test]
    fn test_build_pdu_adapter() {
        let profile = DeviceProfile::builder("10.0.100.20", BackendConfig::Pdu(PduConfig::default()))
            .credentials("admin", "secret")
            .build()
            .unwrap();
        let adapter = build_adapter(&profile, executor()).unwrap();
        assert_eq!(adapter.kind(), BackendKind::Pdu);
    }

    #[test]
    fn test_malformed_template_fails_at_construction() {
        let config = RelayConfig {
            status: "status".to_string(),
            ..RelayConfig::default()
        };
        let profile = DeviceProfile::builder("14", BackendConfig::Relay(config))
            .build()
            .unwrap();

        let err = build_adapter(&profile, executor()).err().unwrap();
        assert!(matches!(err, PowerError::Config(_)));
    }
}
