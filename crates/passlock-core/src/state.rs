//! Passcode states
//!
//! Each variant owns the accept/reject logic for one full-length entry.
//! States never reach into global storage: the controller lends them its
//! repository, tracker and notifier through a [`StateContext`] and turns the
//! returned [`Outcome`] into observer callbacks.
//!
//! | State                 | Biometric bypass |
//! |-----------------------|------------------|
//! | EnterPasscode         | yes              |
//! | SetPasscode           | no               |
//! | ChangePasscode        | no               |
//! | RemovePasscode        | yes              |
//! | EnterOptionalPasscode | yes              |

use subtle::ConstantTimeEq;

use crate::config::LockConfig;
use crate::lockout::{FailureRecord, LockoutTracker};
use crate::notification::{LockNotification, LockNotifier, NotificationLatch};
use crate::passcode::Passcode;
use crate::repository::PasscodeRepository;

/// Tag of a [`PasscodeState`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StateKind {
    EnterPasscode,
    SetPasscode,
    ChangePasscode,
    RemovePasscode,
    EnterOptionalPasscode,
}

/// What the user is currently being asked to type
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Prompt {
    /// Unlock with the stored passcode
    EnterPasscode,
    /// Prove knowledge of the stored passcode before changing it
    EnterCurrentPasscode,
    /// Choose a new passcode
    EnterNewPasscode,
    /// Repeat the new passcode
    ConfirmNewPasscode,
    /// Enter the stored passcode to remove it
    RemovePasscode,
}

/// Progress through choosing a new passcode
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum SetStage {
    /// Waiting for the first entry
    #[default]
    AwaitingFirst,
    /// First entry held as candidate, waiting for it to be repeated
    AwaitingConfirmation(Passcode),
}

/// Progress through changing the stored passcode
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum ChangeStage {
    /// Current passcode not verified yet
    #[default]
    VerifyCurrent,
    /// Current passcode verified; choosing the replacement
    ChooseNew(SetStage),
}

/// Result of one evaluation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Authenticated, or the requested change was applied
    Succeeded,
    /// Wrong passcode, counted against the attempt limit
    Failed(FailureRecord),
    /// Entry refused without counting it (confirmation mismatch, write error)
    Rejected,
    /// Entry accepted; more input is needed
    Pending,
}

/// Collaborators lent to a state for one evaluation
pub struct StateContext<'a> {
    pub repository: &'a mut dyn PasscodeRepository,
    pub tracker: &'a mut LockoutTracker,
    pub notifier: &'a LockNotifier,
    pub config: &'a LockConfig,
}

/// The active passcode state of a lock
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PasscodeState {
    EnterPasscode { latch: NotificationLatch },
    SetPasscode { stage: SetStage },
    ChangePasscode { stage: ChangeStage, latch: NotificationLatch },
    RemovePasscode { latch: NotificationLatch },
    EnterOptionalPasscode { latch: NotificationLatch },
}

impl PasscodeState {
    /// Unlock with the stored passcode
    pub fn enter() -> Self {
        PasscodeState::EnterPasscode {
            latch: NotificationLatch::default(),
        }
    }

    /// Choose a passcode
    pub fn set() -> Self {
        PasscodeState::SetPasscode {
            stage: SetStage::AwaitingFirst,
        }
    }

    /// Replace the stored passcode
    pub fn change() -> Self {
        PasscodeState::ChangePasscode {
            stage: ChangeStage::VerifyCurrent,
            latch: NotificationLatch::default(),
        }
    }

    /// Remove the stored passcode
    pub fn remove() -> Self {
        PasscodeState::RemovePasscode {
            latch: NotificationLatch::default(),
        }
    }

    /// Unlock if a passcode is stored, succeed otherwise
    pub fn enter_optional() -> Self {
        PasscodeState::EnterOptionalPasscode {
            latch: NotificationLatch::default(),
        }
    }

    /// Create the initial state for `kind`
    pub fn from_kind(kind: StateKind) -> Self {
        match kind {
            StateKind::EnterPasscode => Self::enter(),
            StateKind::SetPasscode => Self::set(),
            StateKind::ChangePasscode => Self::change(),
            StateKind::RemovePasscode => Self::remove(),
            StateKind::EnterOptionalPasscode => Self::enter_optional(),
        }
    }

    /// Tag of this state
    pub fn kind(&self) -> StateKind {
        match self {
            PasscodeState::EnterPasscode { .. } => StateKind::EnterPasscode,
            PasscodeState::SetPasscode { .. } => StateKind::SetPasscode,
            PasscodeState::ChangePasscode { .. } => StateKind::ChangePasscode,
            PasscodeState::RemovePasscode { .. } => StateKind::RemovePasscode,
            PasscodeState::EnterOptionalPasscode { .. } => StateKind::EnterOptionalPasscode,
        }
    }

    /// What the user is being asked for
    pub fn prompt(&self) -> Prompt {
        match self {
            PasscodeState::EnterPasscode { .. } | PasscodeState::EnterOptionalPasscode { .. } => {
                Prompt::EnterPasscode
            }
            PasscodeState::SetPasscode { stage } => stage.prompt(),
            PasscodeState::ChangePasscode { stage, .. } => match stage {
                ChangeStage::VerifyCurrent => Prompt::EnterCurrentPasscode,
                ChangeStage::ChooseNew(set) => set.prompt(),
            },
            PasscodeState::RemovePasscode { .. } => Prompt::RemovePasscode,
        }
    }

    /// Whether this state lets biometrics stand in for the passcode
    pub fn allows_biometrics(&self) -> bool {
        match self {
            PasscodeState::EnterPasscode { .. }
            | PasscodeState::RemovePasscode { .. }
            | PasscodeState::EnterOptionalPasscode { .. } => true,
            PasscodeState::SetPasscode { .. } | PasscodeState::ChangePasscode { .. } => false,
        }
    }

    /// Let the next threshold crossing notify again
    pub(crate) fn rearm_notification(&mut self) {
        match self {
            PasscodeState::EnterPasscode { latch }
            | PasscodeState::ChangePasscode { latch, .. }
            | PasscodeState::RemovePasscode { latch }
            | PasscodeState::EnterOptionalPasscode { latch } => latch.rearm(),
            PasscodeState::SetPasscode { .. } => {}
        }
    }

    /// Evaluate one full-length entry
    pub fn accept_passcode(&mut self, passcode: &Passcode, ctx: &mut StateContext<'_>) -> Outcome {
        match self {
            PasscodeState::EnterPasscode { latch } => verify_stored(passcode, ctx, latch),

            PasscodeState::EnterOptionalPasscode { latch } => {
                if !ctx.repository.has_passcode() {
                    tracing::debug!("No passcode stored, optional entry succeeds");
                    ctx.tracker.record_success();
                    latch.rearm();
                    return Outcome::Succeeded;
                }
                verify_stored(passcode, ctx, latch)
            }

            PasscodeState::SetPasscode { stage } => stage.accept(passcode, ctx),

            PasscodeState::ChangePasscode { stage, latch } => {
                let verifying = matches!(stage, ChangeStage::VerifyCurrent);
                let outcome = match stage {
                    ChangeStage::VerifyCurrent => verify_stored(passcode, ctx, latch),
                    ChangeStage::ChooseNew(set) => set.accept(passcode, ctx),
                };

                match outcome {
                    Outcome::Succeeded if verifying => {
                        *stage = ChangeStage::ChooseNew(SetStage::AwaitingFirst);
                        Outcome::Pending
                    }
                    Outcome::Succeeded => {
                        *stage = ChangeStage::VerifyCurrent;
                        Outcome::Succeeded
                    }
                    other => other,
                }
            }

            PasscodeState::RemovePasscode { latch } => match verify_stored(passcode, ctx, latch) {
                Outcome::Succeeded => match ctx.repository.delete_passcode() {
                    Ok(()) => {
                        tracing::info!("Passcode removed");
                        Outcome::Succeeded
                    }
                    Err(e) => {
                        tracing::warn!("Failed to remove passcode: {}", e);
                        Outcome::Rejected
                    }
                },
                other => other,
            },
        }
    }
}

impl SetStage {
    fn prompt(&self) -> Prompt {
        match self {
            SetStage::AwaitingFirst => Prompt::EnterNewPasscode,
            SetStage::AwaitingConfirmation(_) => Prompt::ConfirmNewPasscode,
        }
    }

    fn accept(&mut self, passcode: &Passcode, ctx: &mut StateContext<'_>) -> Outcome {
        match std::mem::take(self) {
            SetStage::AwaitingFirst => {
                *self = SetStage::AwaitingConfirmation(passcode.clone());
                Outcome::Pending
            }
            SetStage::AwaitingConfirmation(candidate) => {
                if !bool::from(candidate.ct_eq(passcode)) {
                    tracing::debug!("Confirmation does not match candidate passcode");
                    return Outcome::Rejected;
                }
                match ctx.repository.set_passcode(&candidate) {
                    Ok(()) => {
                        tracing::info!("Passcode set");
                        Outcome::Succeeded
                    }
                    Err(e) => {
                        tracing::warn!("Failed to store passcode: {}", e);
                        Outcome::Rejected
                    }
                }
            }
        }
    }
}

/// Compare against the stored passcode, failing closed when none is stored
fn verify_stored(
    passcode: &Passcode,
    ctx: &mut StateContext<'_>,
    latch: &mut NotificationLatch,
) -> Outcome {
    let matches = match ctx.repository.passcode() {
        Some(stored) => bool::from(stored.ct_eq(passcode)),
        None => {
            tracing::debug!("No passcode stored, treating entry as incorrect");
            false
        }
    };

    if matches {
        ctx.tracker.record_success();
        latch.rearm();
        return Outcome::Succeeded;
    }

    let failure = ctx
        .tracker
        .record_failure(ctx.config.maximum_incorrect_attempts);
    if failure.attempt == 1 {
        // First failure of a new run: the counter was reset since the last crossing
        latch.rearm();
    }
    if failure.threshold_reached {
        latch.fire(ctx.notifier, LockNotification::IncorrectAttemptsExceeded);
    }
    Outcome::Failed(failure)
}
