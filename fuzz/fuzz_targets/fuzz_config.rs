#![no_main]

use libfuzzer_sys::fuzz_target;
use passlock_core::LockConfig;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    // Parsing arbitrary TOML should not panic
    let Ok(config) = toml::from_str::<LockConfig>(text) else {
        return;
    };

    if config.validate().is_ok() {
        assert!(config.passcode_length > 0);

        // Backoff windows saturate instead of overflowing
        if let Some(policy) = &config.backoff {
            for retry in [0, 1, 31, 32, 63, 64, u32::MAX] {
                assert!(policy.window(retry) <= policy.max_duration());
            }
        }
    }
});
