//! Secret Masking
//!
//! Helpers that keep the preshared credential and session tokens out of
//! every log sink. Everything here is pure: no state, no I/O.
//!
//! - [`mask_secret`] renders a secret as a short, non-reversible hint
//! - [`redact`] scrubs known secrets out of arbitrary text (e.g. backend error bodies)
//! - [`Secret`] wraps a secret string so that `Debug`/`Display` never print it

use serde::{Deserialize, Deserializer};
use std::fmt;

/// Placeholder used for secrets too short to reveal any prefix of.
pub const MASK: &str = "****";

/// Secrets shorter than this are masked completely.
const MIN_REVEAL_LEN: usize = 12;

/// Number of leading characters revealed for long secrets.
const REVEAL_PREFIX: usize = 4;

/// Mask a secret for logging.
///
/// Long secrets keep their first four characters so operators can tell
/// keys apart; short ones are replaced entirely.
///
/// # Example
///
/// ```
/// use mcp_relay::mask::mask_secret;
///
/// assert_eq!(mask_secret("pk_live_0123456789abcdef"), "pk_l****");
/// assert_eq!(mask_secret("short"), "****");
/// ```
pub fn mask_secret(secret: &str) -> String {
    if secret.chars().count() < MIN_REVEAL_LEN {
        return MASK.to_string();
    }
    let prefix: String = secret.chars().take(REVEAL_PREFIX).collect();
    format!("{}{}", prefix, MASK)
}

/// Replace every occurrence of each non-empty secret in `text` with its masked form.
pub fn redact<S: AsRef<str>>(text: &str, secrets: &[S]) -> String {
    let mut redacted = text.to_string();
    for secret in secrets {
        let secret = secret.as_ref();
        if secret.is_empty() {
            continue;
        }
        if redacted.contains(secret) {
            redacted = redacted.replace(secret, &mask_secret(secret));
        }
    }
    redacted
}

/// A secret string held only in memory.
///
/// `Debug` and `Display` print the masked form; the raw value is only
/// reachable through [`Secret::expose`].
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The raw secret. Never pass the result to a log macro.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Masked rendering, safe for logs.
    pub fn masked(&self) -> String {
        mask_secret(&self.0)
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret({})", self.masked())
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.masked())
    }
}

impl From<String> for Secret {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for Secret {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl<'de> Deserialize<'de> for Secret {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        String::deserialize(deserializer).map(Secret)
    }
}
