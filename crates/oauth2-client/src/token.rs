//! Token entity and freshness predicates
//!
//! A `Token` is a snapshot of access credentials received from the token
//! endpoint. Every field the endpoint may omit is optional. `expires_in`
//! arrives as either a JSON number or a numeric JSON string depending on
//! the API; it is parsed exactly once, at ingestion, into the absolute UTC
//! `expiry`. All later freshness decisions read `expiry` only.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Raw `expires_in` value from the token endpoint.
///
/// Some providers send `"expires_in": 3600`, others `"expires_in": "3600"`.
/// The untagged decode accepts both; `as_seconds` normalizes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExpiresIn {
    Seconds(i64),
    Text(String),
}

impl ExpiresIn {
    /// Number of seconds until expiry, or `InvalidExpiry` if the raw value
    /// is a string that does not hold an integer.
    pub fn as_seconds(&self) -> Result<i64> {
        match self {
            ExpiresIn::Seconds(n) => Ok(*n),
            ExpiresIn::Text(s) => s
                .trim()
                .parse::<i64>()
                .map_err(|_| Error::InvalidExpiry(s.clone())),
        }
    }
}

/// Access credentials plus metadata, replaced wholesale on every refresh
/// or mint. A token with no access token is never usable for authorization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Token {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub token_type: Option<String>,
    pub scope: Option<String>,
    /// Raw endpoint value; consulted only by `normalize_expiry`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<ExpiresIn>,
    /// Absolute UTC expiry derived from `expires_in`. `None` means the
    /// token never expires.
    #[serde(skip)]
    pub expiry: Option<DateTime<Utc>>,
}

impl Token {
    /// Token holding only an access token (fixed-token sources).
    pub fn from_access_token(access_token: impl Into<String>) -> Self {
        Self {
            access_token: Some(access_token.into()),
            ..Self::default()
        }
    }

    pub fn has_access_token(&self) -> bool {
        matches!(&self.access_token, Some(t) if !t.is_empty())
    }

    pub fn has_refresh_token(&self) -> bool {
        matches!(&self.refresh_token, Some(t) if !t.is_empty())
    }

    /// Whether the access token is usable at `at`.
    ///
    /// `at` is the manager's deadline (now + refresh margin), not wall-clock
    /// now. A token without an expiry is valid at any time, provided it has
    /// an access token at all.
    pub fn has_valid_access_token(&self, at: DateTime<Utc>) -> bool {
        if !self.has_access_token() {
            return false;
        }
        match self.expiry {
            None => true,
            Some(expiry) => expiry >= at,
        }
    }

    /// Convert the raw `expires_in` into an absolute UTC `expiry`.
    ///
    /// Runs once when the token is received. A missing `expires_in` clears
    /// the expiry (the token never expires). Fails with `InvalidExpiry`
    /// when the raw value is unparsable.
    pub fn normalize_expiry(&mut self) -> Result<()> {
        self.expiry = match &self.expires_in {
            Some(raw) => {
                let seconds = raw.as_seconds()?;
                Some(Utc::now() + Duration::seconds(seconds))
            }
            None => None,
        };
        Ok(())
    }
}
