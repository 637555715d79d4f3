//! Power control state machine
//!
//! [`PowerController`] owns every retry decision. For a requested state it
//! walks `Idle -> Commanding -> Verifying -> {Settled, Failed}`:
//!
//! - `Idle`: probe once; if the device already reports the requested state,
//!   settle without issuing any command.
//! - `Commanding`: issue the mutating command through the adapter.
//! - `Verifying`: wait the settle delay, probe, and settle on a match. On a
//!   mismatch go back to `Commanding` while attempts remain.
//! - `Failed`: surface [`PowerError::PowerStateFailure`].
//!
//! With `max_retries = N` at most `N + 1` commands are issued. Execution
//! errors from either the command or the probe consume an attempt and are
//! observed as [`PowerState::Error`].

use std::time::Duration;
use tracing::{debug, info, warn};

use crate::backend::BackendAdapter;
use crate::error::{ExecutionErrorKind, PowerError, Result};
use crate::profile::DeviceProfile;
use crate::types::{DesiredState, PowerState};

/// Upper bound for the backoff between commanding attempts
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Phase of a single `set_power` run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Commanding { attempt: u32 },
    Verifying { attempt: u32 },
    Settled,
    Failed { attempts: u32 },
}

/// Drives adapters to a requested power state with verification and retry
///
/// Holds no state between calls.
#[derive(Debug, Clone, Copy, Default)]
pub struct PowerController;

impl PowerController {
    pub fn new() -> Self {
        Self
    }

    /// Single status probe; never mutates and never retries
    ///
    /// A probe that timed out or was rejected by the backend reads as
    /// [`PowerState::Unknown`]. A probe that could not be launched at all is
    /// returned as an error.
    pub async fn get_status(
        &self,
        profile: &DeviceProfile,
        adapter: &dyn BackendAdapter,
    ) -> Result<PowerState> {
        match adapter.query_status(profile).await {
            Ok(state) => Ok(state),
            Err(e) if e.kind() == ExecutionErrorKind::LaunchFailure => Err(e.into()),
            Err(e) => {
                warn!(target_id = %profile.target(), error = %e, "Status probe failed");
                Ok(PowerState::Unknown)
            }
        }
    }

    /// Bring the device to `desired` and verify it
    pub async fn set_power(
        &self,
        profile: &DeviceProfile,
        adapter: &dyn BackendAdapter,
        desired: DesiredState,
    ) -> Result<PowerState> {
        let current = self.probe(profile, adapter).await;
        self.drive(profile, adapter, desired, current).await
    }

    /// Power cycle the device
    ///
    /// A device that is on is first driven off, which must settle, and then
    /// on. A device in any other state is only powered on. The operation
    /// succeeds only if the device ends up on.
    pub async fn reboot(
        &self,
        profile: &DeviceProfile,
        adapter: &dyn BackendAdapter,
    ) -> Result<PowerState> {
        let current = self.probe(profile, adapter).await;
        info!(target_id = %profile.target(), current = %current, "Rebooting");

        let current = if current == PowerState::On {
            self.drive(profile, adapter, DesiredState::Off, current).await?
        } else {
            current
        };

        // An OFF device here is the expected input of the ON phase, never
        // the result of the reboot.
        self.drive(profile, adapter, DesiredState::On, current).await
    }

    /// Probe for the state machine; failures are observations, not errors
    async fn probe(&self, profile: &DeviceProfile, adapter: &dyn BackendAdapter) -> PowerState {
        match adapter.query_status(profile).await {
            Ok(state) => state,
            Err(e) => {
                warn!(target_id = %profile.target(), exit_code = ?e.exit_code(), error = %e, "Status probe failed");
                PowerState::Error
            }
        }
    }

    async fn drive(
        &self,
        profile: &DeviceProfile,
        adapter: &dyn BackendAdapter,
        desired: DesiredState,
        current: PowerState,
    ) -> Result<PowerState> {
        let max_attempts = profile.max_retries().saturating_add(1);
        let mut observed = current;
        let mut phase = Phase::Idle;

        loop {
            debug!(target_id = %profile.target(), desired = %desired, phase = ?phase, observed = %observed, "Power transition");

            phase = match phase {
                Phase::Idle if desired.is_satisfied_by(observed) => {
                    debug!(target_id = %profile.target(), state = %observed, "Already in requested state");
                    Phase::Settled
                }
                Phase::Idle => Phase::Commanding { attempt: 1 },

                Phase::Commanding { attempt } => {
                    if attempt > 1 {
                        let backoff = backoff_for(profile.retry_backoff(), attempt - 1);
                        if !backoff.is_zero() {
                            tokio::time::sleep(backoff).await;
                        }
                    }

                    info!(
                        target_id = %profile.target(),
                        backend = %adapter.kind(),
                        desired = %desired,
                        attempt = attempt,
                        max = max_attempts,
                        "Issuing power command"
                    );

                    match adapter.apply_power(profile, desired).await {
                        Ok(()) => Phase::Verifying { attempt },
                        Err(e) => {
                            warn!(
                                target_id = %profile.target(),
                                attempt = attempt,
                                exit_code = ?e.exit_code(),
                                error = %e,
                                "Power command failed"
                            );
                            observed = PowerState::Error;
                            next_attempt(attempt, max_attempts)
                        }
                    }
                }

                Phase::Verifying { attempt } => {
                    if !profile.settle_delay().is_zero() {
                        tokio::time::sleep(profile.settle_delay()).await;
                    }
                    observed = self.probe(profile, adapter).await;

                    if desired.is_satisfied_by(observed) {
                        Phase::Settled
                    } else {
                        warn!(
                            target_id = %profile.target(),
                            desired = %desired,
                            observed = %observed,
                            attempt = attempt,
                            "Power state not reached"
                        );
                        next_attempt(attempt, max_attempts)
                    }
                }

                Phase::Settled => {
                    info!(target_id = %profile.target(), state = %observed, "Power state settled");
                    return Ok(observed);
                }

                Phase::Failed { attempts } => {
                    warn!(
                        target_id = %profile.target(),
                        desired = %desired,
                        observed = %observed,
                        attempts = attempts,
                        "Giving up on power state"
                    );
                    return Err(PowerError::PowerStateFailure {
                        requested: desired,
                        observed,
                        attempts,
                    });
                }
            };
        }
    }
}

fn next_attempt(attempt: u32, max_attempts: u32) -> Phase {
    if attempt < max_attempts {
        Phase::Commanding { attempt: attempt + 1 }
    } else {
        Phase::Failed { attempts: attempt }
    }
}

/// Exponential backoff before retry `retry` (1-based): base, 2*base, 4*base, ...
fn backoff_for(base: Duration, retry: u32) -> Duration {
    let factor = 2u32.saturating_pow(retry.saturating_sub(1).min(16));
    base.saturating_mul(factor).min(MAX_BACKOFF)
}
