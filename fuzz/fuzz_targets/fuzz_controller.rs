#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use passlock_core::{
    AttemptLimit, LockConfig, LockController, MemoryLockoutStore, MemoryPasscodeRepository,
    Passcode, PasscodeRepository, PasscodeState, StateKind,
};

#[derive(Arbitrary, Debug)]
enum Op {
    Digit(u8),
    Remove,
    Cancel,
    ChangeState(u8),
}

#[derive(Arbitrary, Debug)]
struct Input {
    length: u8,
    max_attempts: u8,
    stored: Option<[u8; 8]>,
    ops: Vec<Op>,
}

fn digit(byte: u8) -> char {
    char::from(b'0' + byte % 10)
}

fn kind(byte: u8) -> StateKind {
    match byte % 5 {
        0 => StateKind::EnterPasscode,
        1 => StateKind::SetPasscode,
        2 => StateKind::ChangePasscode,
        3 => StateKind::RemovePasscode,
        _ => StateKind::EnterOptionalPasscode,
    }
}

fuzz_target!(|input: Input| {
    let length = usize::from(input.length % 8) + 1;
    let limit = match input.max_attempts % 6 {
        0 => AttemptLimit::Unlimited,
        n => AttemptLimit::limited(u32::from(n)).unwrap(),
    };

    let repository = match input.stored {
        Some(bytes) => MemoryPasscodeRepository::with_passcode(Passcode::new(
            bytes[..length].iter().copied().map(digit).collect(),
        )),
        None => MemoryPasscodeRepository::new(),
    };
    let store = MemoryLockoutStore::new();
    let config = LockConfig::new(length, limit).unwrap();
    let mut lock =
        LockController::new(PasscodeState::enter(), config, repository.clone(), store).unwrap();

    for op in input.ops {
        match op {
            Op::Digit(b) => lock.add_digit(digit(b)),
            Op::Remove => lock.remove_digit(),
            Op::Cancel => lock.cancel(),
            Op::ChangeState(b) => lock.change_state(PasscodeState::from_kind(kind(b))),
        }

        // A full buffer is always evaluated and cleared
        assert!(lock.entered_len() < length);

        // The counter never reaches a finite limit
        if let Some(max) = limit.threshold() {
            assert!(lock.incorrect_attempts() < max);
        }

        // Stored passcodes always have the configured length
        if let Some(passcode) = repository.passcode() {
            assert_eq!(passcode.len(), length);
        }
    }
});
