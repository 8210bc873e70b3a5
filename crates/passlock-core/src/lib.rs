//! Passlock Core - passcode lock state machine
//!
//! This crate decides, for a stream of key presses and a stored reference
//! passcode, whether the user is authenticated, and drives the set, change
//! and remove flows around it:
//! - [`LockController`] owns the digit buffer and the active state
//! - [`PasscodeState`] holds the accept/reject rules of each flow
//! - [`LockoutTracker`] counts consecutive failures and computes backoff
//! - [`BiometricGate`] lets a platform sensor stand in for the passcode
//!
//! Rendering, localization and platform biometric bindings are left to the
//! host, which plugs in through [`PasscodeRepository`], [`LockoutStore`],
//! [`BiometricGate`] and [`LockObserver`].
//!
//! # Example
//!
//! ```
//! use passlock_core::{
//!     AttemptLimit, LockConfig, LockController, MemoryLockoutStore,
//!     MemoryPasscodeRepository, Passcode, PasscodeState,
//! };
//!
//! let repository = MemoryPasscodeRepository::with_passcode(Passcode::from("1234"));
//! let config = LockConfig::new(4, AttemptLimit::limited(5).unwrap()).unwrap();
//! let mut lock = LockController::new(
//!     PasscodeState::enter(),
//!     config,
//!     repository,
//!     MemoryLockoutStore::new(),
//! )
//! .unwrap();
//!
//! for digit in "1234".chars() {
//!     lock.add_digit(digit);
//! }
//! assert_eq!(lock.incorrect_attempts(), 0);
//! ```

pub mod biometric;
pub mod config;
pub mod controller;
pub mod error;
pub mod lockout;
pub mod notification;
pub mod observer;
pub mod passcode;
pub mod repository;
pub mod state;
pub mod store;

pub use biometric::{BiometricGate, BiometricKind, BiometricOutcome, NoBiometrics};
pub use config::{AttemptLimit, BackoffPolicy, LockConfig};
pub use controller::LockController;
pub use error::{LockError, Result};
pub use lockout::{FailureRecord, LockoutTracker};
pub use notification::{
    LockNotification, LockNotifier, NotificationLatch, INCORRECT_PASSCODE_NOTIFICATION,
};
pub use observer::{LockEvent, LockObserver, NullObserver};
pub use passcode::{Passcode, DEFAULT_PASSCODE_LENGTH};
pub use repository::{FilePasscodeRepository, MemoryPasscodeRepository, PasscodeRepository};
pub use state::{Outcome, PasscodeState, Prompt, StateKind};
pub use store::{BackoffWindow, FileLockoutStore, LockoutRecord, LockoutStore, MemoryLockoutStore};
