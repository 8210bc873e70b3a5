//! Passcode value type
//!
//! A passcode is an ordered run of single-character digit tokens. The
//! tokens are not validated here: the keypad that produces them is trusted
//! to emit digits only.

use std::fmt;

use subtle::{Choice, ConstantTimeEq};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Default passcode length
pub const DEFAULT_PASSCODE_LENGTH: usize = 4;

/// A passcode, wiped from memory on drop
#[derive(Clone, PartialEq, Eq, Default, Zeroize, ZeroizeOnDrop)]
pub struct Passcode(Vec<char>);

impl Passcode {
    /// Create a passcode from its tokens
    pub fn new(tokens: Vec<char>) -> Self {
        Self(tokens)
    }

    /// Create an empty passcode with room for `capacity` tokens
    pub fn with_capacity(capacity: usize) -> Self {
        Self(Vec::with_capacity(capacity))
    }

    /// Tokens in entry order
    pub fn tokens(&self) -> &[char] {
        &self.0
    }

    /// Number of tokens
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub(crate) fn push(&mut self, token: char) {
        self.0.push(token);
    }

    pub(crate) fn pop(&mut self) -> Option<char> {
        self.0.pop()
    }

    /// Wipe the tokens and leave the passcode empty, keeping its allocation
    pub(crate) fn clear(&mut self) {
        self.0.zeroize();
    }
}

impl From<&str> for Passcode {
    fn from(s: &str) -> Self {
        Self(s.chars().collect())
    }
}

/// Token comparison that does not stop at the first mismatch
///
/// Only the length is compared in variable time.
impl ConstantTimeEq for Passcode {
    fn ct_eq(&self, other: &Self) -> Choice {
        if self.0.len() != other.0.len() {
            return Choice::from(0);
        }
        self.0
            .iter()
            .zip(&other.0)
            .fold(Choice::from(1), |acc, (a, b)| acc & u32::from(*a).ct_eq(&u32::from(*b)))
    }
}

impl fmt::Debug for Passcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Passcode(<{} redacted>)", self.0.len())
    }
}

/// Serde adapter storing a passcode as a plain string of its tokens
pub(crate) mod as_string {
    use serde::{Deserialize, Deserializer, Serializer};
    use zeroize::Zeroizing;

    use super::Passcode;

    pub fn serialize<S>(passcode: &Passcode, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = Zeroizing::new(passcode.tokens().iter().collect::<String>());
        serializer.serialize_str(&s)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Passcode, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = Zeroizing::new(String::deserialize(deserializer)?);
        if s.is_empty() {
            return Err(serde::de::Error::custom("empty passcode"));
        }
        Ok(Passcode::from(s.as_str()))
    }
}
