//! Lock controller
//!
//! The controller owns the digit buffer and the active [`PasscodeState`],
//! lends its collaborators to the state on every full-length entry, and
//! reports results to a single [`LockObserver`].
//!
//! All mutation goes through `&mut self`, so a controller lives on one
//! serial context (the UI thread or a single task). The biometric challenge
//! is the only await point; it keeps the exclusive borrow across the await,
//! so its result is applied on the same context that started it.

use std::time::Duration;

use chrono::Utc;

use crate::biometric::{BiometricGate, BiometricOutcome, NoBiometrics};
use crate::config::LockConfig;
use crate::error::Result;
use crate::lockout::LockoutTracker;
use crate::notification::LockNotifier;
use crate::observer::{LockObserver, NullObserver};
use crate::passcode::Passcode;
use crate::repository::PasscodeRepository;
use crate::state::{Outcome, PasscodeState, Prompt, StateContext};
use crate::store::LockoutStore;

/// Drives a passcode state from individual key presses
pub struct LockController {
    config: LockConfig,
    state: PasscodeState,
    buffer: Passcode,
    repository: Box<dyn PasscodeRepository>,
    tracker: LockoutTracker,
    biometrics: Box<dyn BiometricGate>,
    observer: Box<dyn LockObserver>,
    notifier: LockNotifier,
}

impl LockController {
    /// Create a controller in `state`
    ///
    /// Fails if `config` does not validate. Biometrics default to
    /// [`NoBiometrics`], the observer to [`NullObserver`], and the notifier
    /// to a fresh one with no subscribers.
    pub fn new(
        state: PasscodeState,
        config: LockConfig,
        repository: impl PasscodeRepository + 'static,
        store: impl LockoutStore + 'static,
    ) -> Result<Self> {
        config.validate()?;
        let tracker = LockoutTracker::new(store).with_backoff(config.backoff.clone());

        Ok(Self {
            buffer: Passcode::with_capacity(config.passcode_length),
            config,
            state,
            repository: Box::new(repository),
            tracker,
            biometrics: Box::new(NoBiometrics),
            observer: Box::new(NullObserver),
            notifier: LockNotifier::new(),
        })
    }

    /// Use `gate` for biometric challenges
    pub fn with_biometrics(mut self, gate: impl BiometricGate + 'static) -> Self {
        self.biometrics = Box::new(gate);
        self
    }

    /// Report to `observer`
    pub fn with_observer(mut self, observer: impl LockObserver + 'static) -> Self {
        self.observer = Box::new(observer);
        self
    }

    /// Publish lockout notifications through a shared `notifier`
    pub fn with_notifier(mut self, notifier: LockNotifier) -> Self {
        self.notifier = notifier;
        self
    }

    /// Append a digit; evaluates the buffer once it is full
    ///
    /// While a backoff window is open the digit is dropped and the observer
    /// is told how long entry stays blocked.
    pub fn add_digit(&mut self, token: char) {
        if let Some(remaining) = self.lockout_remaining() {
            tracing::debug!("Digit ignored, entry blocked for {:?}", remaining);
            self.observer.on_entry_blocked(remaining);
            return;
        }

        self.buffer.push(token);
        self.observer.on_digit_added(self.buffer.len() - 1);

        if self.buffer.len() >= self.config.passcode_length {
            self.evaluate();
        }
    }

    /// Remove the last digit, if any
    pub fn remove_digit(&mut self) {
        if self.buffer.pop().is_some() {
            self.observer.on_digit_removed(self.buffer.len());
        }
    }

    /// Discard the digits entered so far
    pub fn cancel(&mut self) {
        self.buffer.clear();
        self.observer.on_cancelled();
    }

    /// Replace the active state
    ///
    /// The attempt counter and any backoff window are left untouched.
    pub fn change_state(&mut self, state: PasscodeState) {
        tracing::debug!("Lock state {:?} -> {:?}", self.state.kind(), state.kind());
        self.state = state;
        self.observer.on_state_changed(self.state.kind());
    }

    /// Run one biometric challenge if biometrics are allowed
    ///
    /// A successful challenge resets the attempt counter and reports
    /// success. Failure and cancellation are silent so the user can fall
    /// back to digits. Returns `None` when no challenge was issued.
    pub async fn authenticate_with_biometrics(&mut self) -> Option<BiometricOutcome> {
        if !self.is_biometric_allowed() {
            tracing::debug!("Biometric authentication not allowed in {:?}", self.state.kind());
            return None;
        }

        let reason = self.biometric_reason();
        let outcome = self.biometrics.authenticate(&reason).await;

        match outcome {
            BiometricOutcome::Success => {
                tracing::info!("Biometric authentication succeeded");
                self.tracker.record_success();
                self.state.rearm_notification();
                self.observer.on_success();
            }
            BiometricOutcome::Failure | BiometricOutcome::UserCancelled => {
                tracing::debug!("Biometric authentication ended with {:?}", outcome);
            }
        }

        Some(outcome)
    }

    fn evaluate(&mut self) {
        let prompt_before = self.state.prompt();

        let mut ctx = StateContext {
            repository: &mut *self.repository,
            tracker: &mut self.tracker,
            notifier: &self.notifier,
            config: &self.config,
        };
        let outcome = self.state.accept_passcode(&self.buffer, &mut ctx);
        self.buffer.clear();

        match outcome {
            Outcome::Succeeded => self.observer.on_success(),
            Outcome::Failed(failure) => {
                self.observer.on_failure(failure.attempt);
                if failure.threshold_reached {
                    self.observer.on_lockout_threshold_reached(failure.attempt);
                }
                self.tracker.begin_backoff(Utc::now());
            }
            Outcome::Rejected => self.observer.on_failure(0),
            Outcome::Pending => {}
        }

        let prompt = self.state.prompt();
        if prompt != prompt_before {
            self.observer.on_prompt_changed(prompt);
        }
    }

    fn biometric_reason(&self) -> String {
        self.config
            .biometric_reason
            .clone()
            .unwrap_or_else(|| self.biometrics.kind().default_reason().to_string())
    }

    /// Whether a biometric challenge would be issued now
    pub fn is_biometric_allowed(&self) -> bool {
        self.config.biometric_allowed
            && self.state.allows_biometrics()
            && self.biometrics.is_available()
    }

    /// Whether the host should start a challenge as soon as the lock shows
    pub fn should_request_biometric_immediately(&self) -> bool {
        self.config.request_biometric_immediately && self.is_biometric_allowed()
    }

    /// Active state
    pub fn state(&self) -> &PasscodeState {
        &self.state
    }

    /// Current prompt of the active state
    pub fn prompt(&self) -> Prompt {
        self.state.prompt()
    }

    /// Number of digits entered so far
    pub fn entered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Configuration
    pub fn config(&self) -> &LockConfig {
        &self.config
    }

    /// Passcode repository
    pub fn repository(&self) -> &dyn PasscodeRepository {
        &*self.repository
    }

    /// Lockout tracker
    pub fn tracker(&self) -> &LockoutTracker {
        &self.tracker
    }

    /// Notifier lockout notifications are posted to
    pub fn notifier(&self) -> &LockNotifier {
        &self.notifier
    }

    /// Consecutive incorrect passcodes so far
    pub fn incorrect_attempts(&self) -> u32 {
        self.tracker.current_count()
    }

    /// Time left before digits are accepted again
    pub fn lockout_remaining(&self) -> Option<Duration> {
        self.tracker.backoff_policy()?;
        self.tracker.lockout_remaining(Utc::now())
    }

    /// Whether the attempt limit was reached and not yet acknowledged
    pub fn lockout_threshold_reached(&self) -> bool {
        self.tracker.threshold_reached()
    }

    /// Clear the persisted threshold-reached flag
    pub fn acknowledge_lockout_threshold(&mut self) {
        self.tracker.acknowledge_threshold();
    }
}
