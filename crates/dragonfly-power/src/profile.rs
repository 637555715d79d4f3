//! Per-device power control profile
//!
//! A [`DeviceProfile`] is validated once when it is built and cannot be
//! changed afterwards. Orchestrators that receive device settings as data can
//! deserialize a [`ProfileSpec`] and convert it with `TryFrom`.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{PowerError, Result};
use crate::types::{BackendConfig, BackendKind, Credentials};

/// Default per-command timeout
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Default wait between a mutating command and the verification probe
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(9);

/// Default number of re-commanding attempts after the first
pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// Default base delay before a re-commanding attempt
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// Immutable, validated configuration for one controllable device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceProfile {
    target: String,
    credentials: Option<Credentials>,
    backend: BackendConfig,
    command_timeout: Duration,
    settle_delay: Duration,
    max_retries: u32,
    retry_backoff: Duration,
}

impl DeviceProfile {
    /// Start building a profile for `target` on the given backend
    pub fn builder(target: impl Into<String>, backend: BackendConfig) -> DeviceProfileBuilder {
        DeviceProfileBuilder {
            target: target.into(),
            credentials: None,
            backend,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            settle_delay: DEFAULT_SETTLE_DELAY,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    pub fn backend(&self) -> &BackendConfig {
        &self.backend
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    pub fn command_timeout(&self) -> Duration {
        self.command_timeout
    }

    pub fn settle_delay(&self) -> Duration {
        self.settle_delay
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn retry_backoff(&self) -> Duration {
        self.retry_backoff
    }

    /// Re-check the profile invariants
    ///
    /// Always succeeds for a profile produced by the builder; exposed so
    /// callers can validate before issuing any control operation.
    pub fn validate(&self) -> Result<()> {
        check(
            &self.target,
            self.credentials.as_ref(),
            self.backend.kind(),
            self.command_timeout,
        )
    }
}

fn check(
    target: &str,
    credentials: Option<&Credentials>,
    kind: BackendKind,
    command_timeout: Duration,
) -> Result<()> {
    if target.trim().is_empty() {
        return Err(PowerError::config("target must not be empty"));
    }

    if kind.requires_credentials() {
        match credentials {
            Some(c) if !c.username.is_empty() && !c.password.is_empty() => {}
            Some(c) if c.username.is_empty() => {
                return Err(PowerError::config(format!(
                    "{} backend requires a username",
                    kind
                )))
            }
            Some(_) => {
                return Err(PowerError::config(format!(
                    "{} backend requires a password",
                    kind
                )))
            }
            None => {
                return Err(PowerError::config(format!(
                    "{} backend requires credentials",
                    kind
                )))
            }
        }
    }

    if command_timeout.is_zero() {
        return Err(PowerError::config("command timeout must be greater than zero"));
    }

    Ok(())
}

/// Builder for [`DeviceProfile`]
#[derive(Debug, Clone)]
pub struct DeviceProfileBuilder {
    target: String,
    credentials: Option<Credentials>,
    backend: BackendConfig,
    command_timeout: Duration,
    settle_delay: Duration,
    max_retries: u32,
    retry_backoff: Duration,
}

impl DeviceProfileBuilder {
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some(Credentials::new(username, password));
        self
    }

    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub fn settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Validate and freeze the profile
    pub fn build(self) -> Result<DeviceProfile> {
        check(
            &self.target,
            self.credentials.as_ref(),
            self.backend.kind(),
            self.command_timeout,
        )?;

        Ok(DeviceProfile {
            target: self.target.trim().to_string(),
            credentials: self.credentials,
            backend: self.backend,
            command_timeout: self.command_timeout,
            settle_delay: self.settle_delay,
            max_retries: self.max_retries,
            retry_backoff: self.retry_backoff,
        })
    }
}

/// Unvalidated profile as received from an orchestrator
///
/// Durations are in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileSpec {
    pub target: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub backend: BackendConfig,
    pub command_timeout_ms: u64,
    pub settle_delay_ms: u64,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
}

impl Default for ProfileSpec {
    fn default() -> Self {
        Self {
            target: String::new(),
            username: None,
            password: None,
            backend: BackendConfig::default(),
            command_timeout_ms: DEFAULT_COMMAND_TIMEOUT.as_millis() as u64,
            settle_delay_ms: DEFAULT_SETTLE_DELAY.as_millis() as u64,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_backoff_ms: DEFAULT_RETRY_BACKOFF.as_millis() as u64,
        }
    }
}

impl TryFrom<ProfileSpec> for DeviceProfile {
    type Error = PowerError;

    fn try_from(spec: ProfileSpec) -> Result<Self> {
        let mut builder = DeviceProfile::builder(spec.target, spec.backend)
            .command_timeout(Duration::from_millis(spec.command_timeout_ms))
            .settle_delay(Duration::from_millis(spec.settle_delay_ms))
            .max_retries(spec.max_retries)
            .retry_backoff(Duration::from_millis(spec.retry_backoff_ms));

        match (spec.username, spec.password) {
            (None, None) => {}
            (username, password) => {
                builder = builder.credentials(
                    username.unwrap_or_default(),
                    password.unwrap_or_default(),
                );
            }
        }

        builder.build()
    }
}
