//! NF-e access key type and validation.
//!
//! An access key is the 44-digit identifier printed on every NF-e document.
//! [`NfeKey`] can only be built through [`NfeKey::parse`], so every key held
//! by the registry, the caches and the download engine is known to be valid.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Number of digits in an access key.
pub const KEY_LENGTH: usize = 44;

/// Maximal runs of ASCII digits; a run is a key candidate only if it is exactly 44 long.
#[allow(clippy::expect_used)]
static DIGIT_RUN_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[0-9]+").expect("digit run regex is valid") // Static pattern, safe to panic
});

/// Errors produced when validating a key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    /// The input does not have the 44-digit shape.
    #[error(
        "invalid key '{input}': expected exactly {KEY_LENGTH} digits, got {length} characters\n  Suggestion: Copy the access key without spaces or punctuation"
    )]
    InvalidFormat {
        /// The rejected input.
        input: String,
        /// Character count of the input.
        length: usize,
    },
}

/// A validated 44-digit NF-e access key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NfeKey(String);

impl NfeKey {
    /// Validates `input` and wraps it as a key.
    ///
    /// The input must be exactly 44 ASCII digits; whitespace is not stripped.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::InvalidFormat`] for any other input.
    pub fn parse(input: &str) -> Result<Self, KeyError> {
        if is_valid_key(input) {
            Ok(Self(input.to_string()))
        } else {
            Err(KeyError::InvalidFormat {
                input: input.to_string(),
                length: input.chars().count(),
            })
        }
    }

    /// Returns the key digits.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File stem used for downloaded documents (`NFE_<key>`).
    #[must_use]
    pub fn file_stem(&self) -> String {
        format!("NFE_{}", self.0)
    }
}

/// Returns true when `candidate` is exactly 44 ASCII digits.
#[must_use]
pub fn is_valid_key(candidate: &str) -> bool {
    candidate.len() == KEY_LENGTH && candidate.bytes().all(|b| b.is_ascii_digit())
}

/// Extracts every standalone 44-digit run from free text, in order of appearance.
///
/// Runs longer than 44 digits are not split; they are ignored. Duplicates are
/// kept so the caller can report them.
#[must_use]
pub fn extract_keys(text: &str) -> Vec<String> {
    DIGIT_RUN_PATTERN
        .find_iter(text)
        .map(|m| m.as_str())
        .filter(|run| run.len() == KEY_LENGTH)
        .map(ToString::to_string)
        .collect()
}

impl fmt::Display for NfeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for NfeKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for NfeKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Serialize for NfeKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for NfeKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}
