//! Redacting wrapper for credential material
//!
//! The client secret and any token strings that pass through configuration
//! must never appear in Debug output or logs. `Secret` wraps them, redacts
//! both formatting traits, and zeroizes the inner value on drop.

use std::fmt;
use std::path::Path;

use zeroize::Zeroize;

use crate::error::{Error, Result};

/// Sensitive value, redacted in Debug/Display and zeroized on drop.
pub struct Secret<T: Zeroize>(T);

impl<T: Zeroize> Secret<T> {
    pub fn new(value: T) -> Self {
        Self(value)
    }

    /// Expose the inner value. Callers should borrow at the last possible
    /// moment (header construction, form encoding) and not store the result.
    pub fn expose(&self) -> &T {
        &self.0
    }
}

impl Secret<String> {
    /// Resolve a secret from an environment variable, falling back to a file.
    ///
    /// Resolution order:
    /// 1. the named env var, if set and non-empty
    /// 2. the trimmed contents of `file`, if given
    pub fn resolve(env_var: &str, file: Option<&Path>) -> Result<Self> {
        if let Ok(value) = std::env::var(env_var) {
            if !value.is_empty() {
                return Ok(Self::new(value));
            }
        }

        if let Some(path) = file {
            let value = std::fs::read_to_string(path).map_err(|e| {
                Error::Config(format!("failed to read secret file {}: {e}", path.display()))
            })?;
            let value = value.trim().to_owned();
            if !value.is_empty() {
                return Ok(Self::new(value));
            }
        }

        Err(Error::Config(format!(
            "secret not found: set {env_var} or provide a secret file"
        )))
    }
}

impl<T: Zeroize> fmt::Debug for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl<T: Zeroize> fmt::Display for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl<T: Zeroize> Drop for Secret<T> {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl<T: Zeroize + Clone> Clone for Secret<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}
