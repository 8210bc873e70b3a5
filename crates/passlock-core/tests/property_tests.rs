//! Property-based tests for passlock-core using proptest
//!
//! These tests verify invariants that should hold for all passcode lengths
//! and digit sequences.

use proptest::prelude::*;
use tokio::sync::mpsc;

use passlock_core::{
    AttemptLimit, LockConfig, LockController, LockEvent, LockoutRecord, MemoryLockoutStore,
    MemoryPasscodeRepository, Passcode, PasscodeRepository, PasscodeState,
};

// ============================================
// Strategies
// ============================================

fn arb_digit() -> impl Strategy<Value = char> {
    prop::char::range('0', '9')
}

/// A passcode length and a passcode of that length
fn arb_passcode() -> impl Strategy<Value = (usize, Vec<char>)> {
    (1usize..=8).prop_flat_map(|n| (Just(n), prop::collection::vec(arb_digit(), n)))
}

fn arb_state() -> impl Strategy<Value = PasscodeState> {
    prop_oneof![
        Just(PasscodeState::enter()),
        Just(PasscodeState::set()),
        Just(PasscodeState::change()),
        Just(PasscodeState::remove()),
        Just(PasscodeState::enter_optional()),
    ]
}

fn lock_with(
    state: PasscodeState,
    length: usize,
    stored: Option<&[char]>,
    starting_count: u32,
) -> (
    LockController,
    mpsc::UnboundedReceiver<LockEvent>,
    MemoryPasscodeRepository,
    MemoryLockoutStore,
) {
    let repository = match stored {
        Some(tokens) => MemoryPasscodeRepository::with_passcode(Passcode::new(tokens.to_vec())),
        None => MemoryPasscodeRepository::new(),
    };
    let store = MemoryLockoutStore::with_record(LockoutRecord {
        incorrect_attempts: starting_count,
        ..Default::default()
    });
    let config = LockConfig::new(length, AttemptLimit::Unlimited).unwrap();
    let (tx, rx) = mpsc::unbounded_channel();
    let lock = LockController::new(state, config, repository.clone(), store.clone())
        .unwrap()
        .with_observer(tx);
    (lock, rx, repository, store)
}

fn drain(rx: &mut mpsc::UnboundedReceiver<LockEvent>) -> Vec<LockEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn is_evaluation(event: &LockEvent) -> bool {
    matches!(
        event,
        LockEvent::Succeeded | LockEvent::Failed { .. } | LockEvent::PromptChanged(_)
    )
}

// ============================================
// Properties
// ============================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn prop_short_buffer_never_evaluated(
        (length, stored) in arb_passcode(),
        state in arb_state(),
        partial in prop::collection::vec(arb_digit(), 0..8),
    ) {
        let partial = &partial[..partial.len().min(length - 1)];
        let (mut lock, mut rx, repository, store) =
            lock_with(state, length, Some(&stored), 0);

        for &c in partial {
            lock.add_digit(c);
        }

        prop_assert_eq!(lock.entered_len(), partial.len());
        prop_assert!(!drain(&mut rx).iter().any(is_evaluation));
        prop_assert_eq!(store.snapshot().incorrect_attempts, 0);
        prop_assert_eq!(repository.passcode(), Some(Passcode::new(stored.clone())));
    }

    #[test]
    fn prop_buffer_never_exceeds_length(
        length in 1usize..=8,
        ops in prop::collection::vec(prop::option::of(arb_digit()), 0..64),
    ) {
        let (mut lock, _rx, _repository, _store) =
            lock_with(PasscodeState::enter(), length, Some(&['1'; 8][..length]), 0);

        for op in ops {
            match op {
                Some(c) => lock.add_digit(c),
                None => lock.remove_digit(),
            }
            prop_assert!(lock.entered_len() < length);
        }
    }

    #[test]
    fn prop_exact_passcode_always_succeeds(
        (length, stored) in arb_passcode(),
        starting_count in 0u32..10_000,
    ) {
        let (mut lock, mut rx, _repository, store) =
            lock_with(PasscodeState::enter(), length, Some(&stored), starting_count);

        for &c in &stored {
            lock.add_digit(c);
        }

        let events = drain(&mut rx);
        prop_assert_eq!(events.last(), Some(&LockEvent::Succeeded));
        prop_assert_eq!(store.snapshot().incorrect_attempts, 0);
    }

    #[test]
    fn prop_differing_passcode_fails_and_counts_once(
        (length, stored) in arb_passcode(),
        position in any::<prop::sample::Index>(),
        shift in 1u32..10,
        starting_count in 0u32..10_000,
    ) {
        let mut entered = stored.clone();
        let i = position.index(length);
        let digit = entered[i].to_digit(10).unwrap();
        entered[i] = char::from_digit((digit + shift) % 10, 10).unwrap();

        let (mut lock, mut rx, _repository, store) =
            lock_with(PasscodeState::enter(), length, Some(&stored), starting_count);

        for &c in &entered {
            lock.add_digit(c);
        }

        let events = drain(&mut rx);
        prop_assert_eq!(
            events.last(),
            Some(&LockEvent::Failed { attempt: starting_count + 1 })
        );
        prop_assert_eq!(store.snapshot().incorrect_attempts, starting_count + 1);
    }

    #[test]
    fn prop_optional_entry_without_passcode_succeeds(
        (length, entered) in arb_passcode(),
    ) {
        let (mut lock, mut rx, _repository, _store) =
            lock_with(PasscodeState::enter_optional(), length, None, 0);

        for &c in &entered {
            lock.add_digit(c);
        }

        let events = drain(&mut rx);
        prop_assert_eq!(events.last(), Some(&LockEvent::Succeeded));
    }

    #[test]
    fn prop_set_round_trip(
        (length, candidate) in arb_passcode(),
    ) {
        let (mut lock, _rx, repository, _store) =
            lock_with(PasscodeState::set(), length, None, 0);

        for &c in candidate.iter().chain(candidate.iter()) {
            lock.add_digit(c);
        }
        prop_assert_eq!(repository.passcode(), Some(Passcode::new(candidate.clone())));

        lock.change_state(PasscodeState::enter());
        for &c in &candidate {
            lock.add_digit(c);
        }
        prop_assert_eq!(lock.incorrect_attempts(), 0);
    }
}
