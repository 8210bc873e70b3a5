//! Process-wide lock notifications
//!
//! The notifier is a broadcast channel handed to every controller that
//! should publish to it. Subscribers receive each notification sent after
//! they subscribed.

use tokio::sync::broadcast;

/// Name of the notification sent when the incorrect-attempt limit is hit
pub const INCORRECT_PASSCODE_NOTIFICATION: &str = "passcode.lock.incorrect.passcode.notification";

const CHANNEL_CAPACITY: usize = 16;

/// Notifications published by lock controllers
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LockNotification {
    /// The configured maximum of incorrect passcodes was reached
    IncorrectAttemptsExceeded,
}

impl LockNotification {
    /// Stable name of the notification
    pub fn name(&self) -> &'static str {
        match self {
            LockNotification::IncorrectAttemptsExceeded => INCORRECT_PASSCODE_NOTIFICATION,
        }
    }
}

/// Cloneable publishing handle
#[derive(Clone, Debug)]
pub struct LockNotifier {
    sender: broadcast::Sender<LockNotification>,
}

impl Default for LockNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl LockNotifier {
    /// Create a notifier with no subscribers
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Subscribe to notifications posted from now on
    pub fn subscribe(&self) -> broadcast::Receiver<LockNotification> {
        self.sender.subscribe()
    }

    /// Post a notification; returns the number of subscribers reached
    pub fn post(&self, notification: LockNotification) -> usize {
        tracing::info!("Posting {}", notification.name());
        // No subscribers is not an error
        self.sender.send(notification).unwrap_or(0)
    }
}

/// Once-per-crossing guard for the lockout notification
///
/// Fires at most once while armed; the owner re-arms it when the attempt
/// counter is reset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NotificationLatch {
    armed: bool,
}

impl Default for NotificationLatch {
    fn default() -> Self {
        Self { armed: true }
    }
}

impl NotificationLatch {
    /// Post through `notifier` unless already fired; returns whether it fired
    pub fn fire(&mut self, notifier: &LockNotifier, notification: LockNotification) -> bool {
        if !self.armed {
            return false;
        }
        notifier.post(notification);
        self.armed = false;
        true
    }

    /// Allow the next crossing to fire
    pub fn rearm(&mut self) {
        self.armed = true;
    }

    /// Whether the next crossing will fire
    pub fn is_armed(&self) -> bool {
        self.armed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_subscribers_receive() {
        let notifier = LockNotifier::new();
        let mut first = notifier.subscribe();
        let mut second = notifier.clone().subscribe();

        assert_eq!(notifier.post(LockNotification::IncorrectAttemptsExceeded), 2);
        assert_eq!(first.try_recv().unwrap(), LockNotification::IncorrectAttemptsExceeded);
        assert_eq!(second.try_recv().unwrap(), LockNotification::IncorrectAttemptsExceeded);
    }

    #[test]
    fn test_post_without_subscribers() {
        let notifier = LockNotifier::new();
        assert_eq!(notifier.post(LockNotification::IncorrectAttemptsExceeded), 0);
    }

    #[test]
    fn test_latch_fires_once_until_rearmed() {
        let notifier = LockNotifier::new();
        let mut rx = notifier.subscribe();
        let mut latch = NotificationLatch::default();

        assert!(latch.fire(&notifier, LockNotification::IncorrectAttemptsExceeded));
        assert!(!latch.fire(&notifier, LockNotification::IncorrectAttemptsExceeded));
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());

        latch.rearm();
        assert!(latch.fire(&notifier, LockNotification::IncorrectAttemptsExceeded));
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn test_notification_name() {
        assert_eq!(
            LockNotification::IncorrectAttemptsExceeded.name(),
            "passcode.lock.incorrect.passcode.notification"
        );
    }
}
