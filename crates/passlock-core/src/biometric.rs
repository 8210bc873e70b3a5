//! Biometric gate abstraction
//!
//! Platform bindings (Touch ID, Face ID, fingerprint readers, Windows Hello)
//! live outside this crate and implement [`BiometricGate`]. The controller
//! only consumes the three-way result of a single challenge.

use async_trait::async_trait;

/// Reason shown for fingerprint sensors when none is configured
pub const TOUCH_REASON: &str = "Unlock with your fingerprint";
/// Reason shown for face recognition when none is configured
pub const FACE_REASON: &str = "Unlock with face recognition";
/// Reason shown for any other sensor when none is configured
pub const GENERIC_REASON: &str = "Authentication required to proceed";

/// Sensor family reported by the device
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BiometricKind {
    /// Fingerprint reader
    Touch,
    /// Face recognition
    Face,
    /// Unknown or mixed hardware
    #[default]
    Other,
}

impl BiometricKind {
    /// Default prompt for this sensor family
    pub fn default_reason(&self) -> &'static str {
        match self {
            BiometricKind::Touch => TOUCH_REASON,
            BiometricKind::Face => FACE_REASON,
            BiometricKind::Other => GENERIC_REASON,
        }
    }
}

/// Outcome of one biometric challenge
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BiometricOutcome {
    /// The user was recognized
    Success,
    /// The user was not recognized
    Failure,
    /// The challenge was dismissed or interrupted (e.g. app backgrounded)
    UserCancelled,
}

/// Device biometric facility
///
/// `authenticate` issues exactly one challenge; implementations must not
/// retry on their own, and must report an interrupted challenge as
/// [`BiometricOutcome::UserCancelled`].
#[async_trait]
pub trait BiometricGate: Send + Sync {
    /// Whether the device can run a biometric challenge right now
    fn is_available(&self) -> bool;

    /// Sensor family, used to pick a default prompt
    fn kind(&self) -> BiometricKind {
        BiometricKind::Other
    }

    /// Run one challenge with the given prompt
    async fn authenticate(&self, reason: &str) -> BiometricOutcome;
}

/// Gate for devices without biometric hardware
#[derive(Clone, Copy, Debug, Default)]
pub struct NoBiometrics;

#[async_trait]
impl BiometricGate for NoBiometrics {
    fn is_available(&self) -> bool {
        false
    }

    async fn authenticate(&self, _reason: &str) -> BiometricOutcome {
        BiometricOutcome::Failure
    }
}
