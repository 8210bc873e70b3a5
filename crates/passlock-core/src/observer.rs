//! Observer interface consumed by the UI layer

use std::time::Duration;

use tokio::sync::mpsc;

use crate::state::{Prompt, StateKind};

/// Callbacks emitted by a [`crate::LockController`]
///
/// Every method defaults to a no-op so hosts implement only what they draw.
pub trait LockObserver: Send {
    /// A digit was appended at `index`
    fn on_digit_added(&mut self, _index: usize) {}

    /// The digit at `index` was removed
    fn on_digit_removed(&mut self, _index: usize) {}

    /// The active state was replaced
    fn on_state_changed(&mut self, _state: StateKind) {}

    /// The active state moved to a new prompt without being replaced
    fn on_prompt_changed(&mut self, _prompt: Prompt) {}

    /// Authentication or the requested change succeeded
    fn on_success(&mut self) {}

    /// An entry was rejected; `attempt` is the consecutive-failure count,
    /// or 0 for rejections that are not counted (confirmation mismatch)
    fn on_failure(&mut self, _attempt: u32) {}

    /// The incorrect-attempt limit was reached on failure number `attempt`
    fn on_lockout_threshold_reached(&mut self, _attempt: u32) {}

    /// A digit was dropped because a backoff window is open
    fn on_entry_blocked(&mut self, _remaining: Duration) {}

    /// The digit buffer was discarded
    fn on_cancelled(&mut self) {}
}

/// Observer that ignores everything
#[derive(Clone, Copy, Debug, Default)]
pub struct NullObserver;

impl LockObserver for NullObserver {}

/// Observer callbacks as values
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LockEvent {
    DigitAdded(usize),
    DigitRemoved(usize),
    StateChanged(StateKind),
    PromptChanged(Prompt),
    Succeeded,
    Failed { attempt: u32 },
    LockoutThresholdReached { attempt: u32 },
    EntryBlocked { remaining: Duration },
    Cancelled,
}

/// Forward callbacks into a channel, for hosts that run their own event loop
impl LockObserver for mpsc::UnboundedSender<LockEvent> {
    fn on_digit_added(&mut self, index: usize) {
        let _ = self.send(LockEvent::DigitAdded(index));
    }

    fn on_digit_removed(&mut self, index: usize) {
        let _ = self.send(LockEvent::DigitRemoved(index));
    }

    fn on_state_changed(&mut self, state: StateKind) {
        let _ = self.send(LockEvent::StateChanged(state));
    }

    fn on_prompt_changed(&mut self, prompt: Prompt) {
        let _ = self.send(LockEvent::PromptChanged(prompt));
    }

    fn on_success(&mut self) {
        let _ = self.send(LockEvent::Succeeded);
    }

    fn on_failure(&mut self, attempt: u32) {
        let _ = self.send(LockEvent::Failed { attempt });
    }

    fn on_lockout_threshold_reached(&mut self, attempt: u32) {
        let _ = self.send(LockEvent::LockoutThresholdReached { attempt });
    }

    fn on_entry_blocked(&mut self, remaining: Duration) {
        let _ = self.send(LockEvent::EntryBlocked { remaining });
    }

    fn on_cancelled(&mut self) {
        let _ = self.send(LockEvent::Cancelled);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_observer_forwards() {
        let (mut tx, mut rx) = mpsc::unbounded_channel();
        tx.on_digit_added(0);
        tx.on_failure(2);
        tx.on_success();

        assert_eq!(rx.try_recv().unwrap(), LockEvent::DigitAdded(0));
        assert_eq!(rx.try_recv().unwrap(), LockEvent::Failed { attempt: 2 });
        assert_eq!(rx.try_recv().unwrap(), LockEvent::Succeeded);
    }

    #[test]
    fn test_closed_channel_is_ignored() {
        let (mut tx, rx) = mpsc::unbounded_channel::<LockEvent>();
        drop(rx);
        tx.on_cancelled();
    }
}
