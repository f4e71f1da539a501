//! SMTP password holder.

use serde::Deserialize;

/// SMTP password read from the configuration file.
///
/// `Debug` prints `[REDACTED]`, so the password stays out of the
/// `Debug` output of [`Config`](super::Config) and of any log line built from it.
#[derive(Clone, Deserialize)]
#[serde(transparent)]
pub struct SecretString(String);

impl SecretString {
    pub fn new(password: impl Into<String>) -> Self {
        Self(password.into())
    }

    /// The password itself, for handing to the SMTP transport.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SecretString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[REDACTED]")
    }
}
