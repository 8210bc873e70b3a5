//! Lock configuration
//!
//! A [`LockConfig`] is fixed once a controller is built. It can be written
//! by hand or loaded from a TOML file:
//!
//! ```toml
//! passcode_length = 6
//! maximum_incorrect_attempts = 5   # -1 for unlimited
//! biometric_allowed = true
//! biometric_reason = "Unlock your vault"
//!
//! [backoff]
//! base = 2
//! max_duration_secs = 3600
//! ```

use std::fs;
use std::num::NonZeroU32;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{LockError, Result};
use crate::passcode::DEFAULT_PASSCODE_LENGTH;

/// Default backoff base
pub const DEFAULT_BACKOFF_BASE: u32 = 2;
/// Default cap on a single backoff window (one hour)
pub const DEFAULT_BACKOFF_MAX_SECS: u64 = 60 * 60;

/// How many consecutive incorrect passcodes are tolerated
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum AttemptLimit {
    /// Never reach the threshold
    #[default]
    Unlimited,
    /// Threshold reached on this many consecutive failures
    Limited(NonZeroU32),
}

impl AttemptLimit {
    /// Interpret the conventional integer form, where any negative value
    /// means unlimited
    pub fn from_raw(raw: i64) -> Result<Self> {
        if raw < 0 {
            return Ok(AttemptLimit::Unlimited);
        }
        u32::try_from(raw)
            .ok()
            .and_then(NonZeroU32::new)
            .map(AttemptLimit::Limited)
            .ok_or_else(|| {
                LockError::InvalidConfig(format!(
                    "maximum incorrect attempts must be -1 or between 1 and {}, got {}",
                    u32::MAX,
                    raw
                ))
            })
    }

    /// Create a finite limit
    pub fn limited(max: u32) -> Result<Self> {
        Self::from_raw(i64::from(max))
    }

    /// The finite threshold, if any
    pub fn threshold(&self) -> Option<u32> {
        match self {
            AttemptLimit::Unlimited => None,
            AttemptLimit::Limited(n) => Some(n.get()),
        }
    }

    /// Check whether `attempts` consecutive failures reach the threshold
    pub fn is_reached(&self, attempts: u32) -> bool {
        self.threshold().is_some_and(|max| attempts >= max)
    }
}

impl TryFrom<i64> for AttemptLimit {
    type Error = LockError;

    fn try_from(raw: i64) -> Result<Self> {
        Self::from_raw(raw)
    }
}

impl From<AttemptLimit> for i64 {
    fn from(limit: AttemptLimit) -> Self {
        limit.threshold().map(i64::from).unwrap_or(-1)
    }
}

/// Exponential backoff applied after every incorrect passcode
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    /// Base of the exponent; the n-th window lasts `base^n` seconds
    pub base: u32,
    /// Cap on a single window, in seconds
    pub max_duration_secs: u64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: DEFAULT_BACKOFF_BASE,
            max_duration_secs: DEFAULT_BACKOFF_MAX_SECS,
        }
    }
}

impl BackoffPolicy {
    /// Window length for the given retry count, capped at the maximum
    pub fn window(&self, retry_count: u32) -> Duration {
        let secs = u64::from(self.base).saturating_pow(retry_count);
        Duration::from_secs(secs.min(self.max_duration_secs))
    }

    /// Cap on a single window
    pub fn max_duration(&self) -> Duration {
        Duration::from_secs(self.max_duration_secs)
    }
}

/// Lock configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// Number of digits in a passcode (must be > 0)
    pub passcode_length: usize,
    /// Consecutive incorrect passcodes before the lockout notification
    pub maximum_incorrect_attempts: AttemptLimit,
    /// Whether biometric bypass may be offered at all
    pub biometric_allowed: bool,
    /// Prompt shown by the biometric challenge; a default is chosen per
    /// sensor kind when unset
    pub biometric_reason: Option<String>,
    /// Whether the host should start a biometric challenge as soon as the
    /// lock is presented
    pub request_biometric_immediately: bool,
    /// Optional exponential backoff between attempts
    pub backoff: Option<BackoffPolicy>,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            passcode_length: DEFAULT_PASSCODE_LENGTH,
            maximum_incorrect_attempts: AttemptLimit::Unlimited,
            biometric_allowed: true,
            biometric_reason: None,
            request_biometric_immediately: false,
            backoff: None,
        }
    }
}

impl LockConfig {
    /// Create a config with the given passcode length and attempt limit
    pub fn new(passcode_length: usize, maximum_incorrect_attempts: AttemptLimit) -> Result<Self> {
        let config = Self {
            passcode_length,
            maximum_incorrect_attempts,
            ..Default::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Set the biometric options
    pub fn with_biometrics(mut self, allowed: bool, reason: Option<String>) -> Self {
        self.biometric_allowed = allowed;
        self.biometric_reason = reason;
        self
    }

    /// Enable exponential backoff
    pub fn with_backoff(mut self, policy: BackoffPolicy) -> Self {
        self.backoff = Some(policy);
        self
    }

    /// Load and validate a TOML configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: LockConfig = toml::from_str(&contents)?;
        config.validate()?;
        tracing::debug!("Loaded lock config from {:?}", path);
        Ok(config)
    }

    /// Check the construction invariants
    pub fn validate(&self) -> Result<()> {
        if self.passcode_length == 0 {
            return Err(LockError::InvalidConfig(
                "passcode length must be greater than zero".to_string(),
            ));
        }

        if let Some(backoff) = &self.backoff {
            if backoff.base == 0 {
                return Err(LockError::InvalidConfig(
                    "backoff base must be at least 1".to_string(),
                ));
            }
        }

        Ok(())
    }
}
