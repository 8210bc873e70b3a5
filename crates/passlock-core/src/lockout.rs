//! Consecutive-failure tracking with optional exponential backoff
//!
//! Lockout here is a deterrent, not a security boundary. Every store error
//! is logged and then ignored: an unreadable record counts as zero prior
//! failures and a failed write leaves the legitimate user able to retry.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::config::{AttemptLimit, BackoffPolicy};
use crate::store::{BackoffWindow, LockoutRecord, LockoutStore};

/// Result of recording one incorrect passcode
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FailureRecord {
    /// Position of this failure in the current run (1-based)
    pub attempt: u32,
    /// This failure reached the attempt limit; the counter was reset
    pub threshold_reached: bool,
}

/// Tracks consecutive incorrect passcodes across process restarts
pub struct LockoutTracker {
    store: Box<dyn LockoutStore>,
    backoff: Option<BackoffPolicy>,
}

impl LockoutTracker {
    /// Create a tracker over `store` without backoff
    pub fn new(store: impl LockoutStore + 'static) -> Self {
        Self {
            store: Box::new(store),
            backoff: None,
        }
    }

    /// Enable or disable exponential backoff
    pub fn with_backoff(mut self, backoff: Option<BackoffPolicy>) -> Self {
        self.backoff = backoff;
        self
    }

    /// The active backoff policy
    pub fn backoff_policy(&self) -> Option<&BackoffPolicy> {
        self.backoff.as_ref()
    }

    fn load(&self) -> LockoutRecord {
        self.store.load().unwrap_or_else(|e| {
            tracing::warn!("Failed to read lockout state, assuming no failures: {}", e);
            LockoutRecord::default()
        })
    }

    fn save(&mut self, record: &LockoutRecord) {
        if let Err(e) = self.store.save(record) {
            tracing::warn!("Failed to persist lockout state: {}", e);
        }
    }

    /// Number of consecutive incorrect passcodes so far
    pub fn current_count(&self) -> u32 {
        self.load().incorrect_attempts
    }

    /// Count one incorrect passcode against `limit`
    ///
    /// When the new count reaches the limit the counter goes back to zero
    /// and the threshold-reached flag is persisted.
    pub fn record_failure(&mut self, limit: AttemptLimit) -> FailureRecord {
        let mut record = self.load();
        let attempt = record.incorrect_attempts.saturating_add(1);
        let threshold_reached = limit.is_reached(attempt);

        if threshold_reached {
            tracing::warn!("Incorrect passcode limit reached after {} attempts", attempt);
            record.incorrect_attempts = 0;
            record.threshold_reached = true;
        } else {
            record.incorrect_attempts = attempt;
        }
        self.save(&record);

        FailureRecord {
            attempt,
            threshold_reached,
        }
    }

    /// Reset the counter and the backoff after a successful authentication
    pub fn record_success(&mut self) {
        let mut record = self.load();
        if record.incorrect_attempts == 0 && record.backoff.is_none() {
            return;
        }
        record.incorrect_attempts = 0;
        record.backoff = None;
        self.save(&record);
    }

    /// Window length for `retry_count`, or `None` without a backoff policy
    pub fn compute_backoff_window(&self, retry_count: u32) -> Option<Duration> {
        self.backoff.as_ref().map(|policy| policy.window(retry_count))
    }

    /// Number of windows computed since the last success
    pub fn retry_count(&self) -> u32 {
        self.load().backoff.map(|w| w.retry_count).unwrap_or(0)
    }

    /// Start the backoff window that follows a failure at `now`
    ///
    /// The window lasts `base^retry_count` seconds (capped), after which
    /// the retry count is incremented. Returns `None` without a policy.
    pub fn begin_backoff(&mut self, now: DateTime<Utc>) -> Option<BackoffWindow> {
        let policy = self.backoff.as_ref()?;
        let mut record = self.load();

        let retry_count = record.backoff.map(|w| w.retry_count).unwrap_or(0);
        let length = policy.window(retry_count);
        let until = chrono::Duration::from_std(length)
            .ok()
            .and_then(|d| now.checked_add_signed(d))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        let window = BackoffWindow {
            until,
            retry_count: retry_count.saturating_add(1),
        };
        tracing::debug!("Passcode entry blocked for {:?}", length);

        record.backoff = Some(window);
        self.save(&record);
        Some(window)
    }

    /// Check whether a backoff window is still open at `now`
    pub fn is_locked_out(&self, now: DateTime<Utc>) -> bool {
        self.lockout_remaining(now).is_some()
    }

    /// Time left in the current backoff window
    pub fn lockout_remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        let window = self.load().backoff?;
        if window.until <= now {
            return None;
        }
        (window.until - now).to_std().ok()
    }

    /// Whether the attempt limit was reached and not yet acknowledged
    pub fn threshold_reached(&self) -> bool {
        self.load().threshold_reached
    }

    /// Clear the threshold-reached flag
    pub fn acknowledge_threshold(&mut self) {
        let mut record = self.load();
        if record.threshold_reached {
            record.threshold_reached = false;
            self.save(&record);
        }
    }

    /// Forget all lockout state
    pub fn reset(&mut self) {
        self.save(&LockoutRecord::default());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{LockError, Result};
    use crate::store::MemoryLockoutStore;

    struct BrokenStore;

    impl LockoutStore for BrokenStore {
        fn load(&self) -> Result<LockoutRecord> {
            Err(LockError::Storage("disk on fire".to_string()))
        }

        fn save(&mut self, _record: &LockoutRecord) -> Result<()> {
            Err(LockError::Storage("disk on fire".to_string()))
        }
    }

    fn limit(max: u32) -> AttemptLimit {
        AttemptLimit::limited(max).unwrap()
    }

    #[test]
    fn test_failures_accumulate_and_reset_on_success() {
        let mut tracker = LockoutTracker::new(MemoryLockoutStore::new());

        assert_eq!(tracker.record_failure(limit(5)).attempt, 1);
        assert_eq!(tracker.record_failure(limit(5)).attempt, 2);
        assert_eq!(tracker.current_count(), 2);

        tracker.record_success();
        assert_eq!(tracker.current_count(), 0);
    }

    #[test]
    fn test_threshold_resets_counter_and_sets_flag() {
        let mut tracker = LockoutTracker::new(MemoryLockoutStore::new());

        assert!(!tracker.record_failure(limit(2)).threshold_reached);
        let second = tracker.record_failure(limit(2));
        assert_eq!(second.attempt, 2);
        assert!(second.threshold_reached);
        assert_eq!(tracker.current_count(), 0);
        assert!(tracker.threshold_reached());

        tracker.acknowledge_threshold();
        assert!(!tracker.threshold_reached());
    }

    #[test]
    fn test_unlimited_never_reaches_threshold() {
        let mut tracker = LockoutTracker::new(MemoryLockoutStore::new());
        for _ in 0..50 {
            assert!(!tracker.record_failure(AttemptLimit::Unlimited).threshold_reached);
        }
        assert_eq!(tracker.current_count(), 50);
    }

    #[test]
    fn test_store_errors_fail_open() {
        let mut tracker = LockoutTracker::new(BrokenStore).with_backoff(Some(BackoffPolicy::default()));
        assert_eq!(tracker.current_count(), 0);
        assert_eq!(tracker.record_failure(limit(3)).attempt, 1);
        assert_eq!(tracker.current_count(), 0);
        assert!(!tracker.is_locked_out(Utc::now()));
        tracker.record_success();
    }

    #[test]
    fn test_backoff_grows_per_failure() {
        let store = MemoryLockoutStore::new();
        let mut tracker = LockoutTracker::new(store.clone()).with_backoff(Some(BackoffPolicy {
            base: 2,
            max_duration_secs: 3600,
        }));
        let now = Utc::now();

        let first = tracker.begin_backoff(now).unwrap();
        assert_eq!(first.until - now, chrono::Duration::seconds(1));
        let second = tracker.begin_backoff(now).unwrap();
        assert_eq!(second.until - now, chrono::Duration::seconds(2));
        let third = tracker.begin_backoff(now).unwrap();
        assert_eq!(third.until - now, chrono::Duration::seconds(4));

        assert_eq!(tracker.retry_count(), 3);
        assert_eq!(
            tracker.compute_backoff_window(tracker.retry_count()),
            Some(Duration::from_secs(8))
        );
        assert_eq!(store.snapshot().backoff, Some(third));
    }

    #[test]
    fn test_success_resets_backoff() {
        let mut tracker =
            LockoutTracker::new(MemoryLockoutStore::new()).with_backoff(Some(BackoffPolicy::default()));
        let now = Utc::now();
        tracker.begin_backoff(now);
        tracker.begin_backoff(now);
        tracker.record_success();

        assert_eq!(tracker.retry_count(), 0);
        let next = tracker.begin_backoff(now).unwrap();
        assert_eq!(next.until - now, chrono::Duration::seconds(1));
    }

    #[test]
    fn test_lockout_window_expiry() {
        let mut tracker =
            LockoutTracker::new(MemoryLockoutStore::new()).with_backoff(Some(BackoffPolicy::default()));
        let now = Utc::now();
        tracker.begin_backoff(now);

        assert!(tracker.is_locked_out(now));
        assert_eq!(tracker.lockout_remaining(now), Some(Duration::from_secs(1)));
        assert!(!tracker.is_locked_out(now + chrono::Duration::seconds(1)));
    }

    #[test]
    fn test_no_policy_no_backoff() {
        let mut tracker = LockoutTracker::new(MemoryLockoutStore::new());
        assert!(tracker.begin_backoff(Utc::now()).is_none());
        assert!(tracker.compute_backoff_window(3).is_none());
        assert!(!tracker.is_locked_out(Utc::now()));
    }
}
