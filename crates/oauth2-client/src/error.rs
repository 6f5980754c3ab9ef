//! Error types for token lifecycle operations
//!
//! Every failure that can surface from `TokenManager::validate_token` and
//! the layers beneath it maps to exactly one variant here. Nothing is
//! retried or recovered inside this crate; errors propagate to the caller
//! unmodified.

/// Errors from token acquisition, refresh, and authenticated calls.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The cached token (and the persisted one, after re-retrieval) carries
    /// no access token at all.
    #[error("token has no access token")]
    NoAccessToken,

    /// The token endpoint sent an `expires_in` that is neither a number nor
    /// a numeric string.
    #[error("cannot parse expires_in value {0:?}")]
    InvalidExpiry(String),

    /// Non-2xx, non-401 response from the token endpoint.
    #[error("token endpoint returned status {status}, url: {url}")]
    TokenEndpoint { status: u16, url: String },

    /// Terminal: no valid access token and no refresh or mint path left.
    /// The caller must re-run the interactive authorization flow.
    #[error("no valid access or refresh token found, reauthorization required")]
    ReauthorizationRequired,

    /// Interactive authorization flow problem: missing flow configuration,
    /// or a malformed redirect callback (no code, missing/bad state).
    #[error("authorization flow error: {0}")]
    Flow(String),

    /// Network or protocol failure from the underlying transport.
    #[error("transport error: {0}")]
    Transport(String),

    /// TokenSource storage failure (load or write-through).
    #[error("persistence error: {0}")]
    Persistence(String),
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Transport(e.to_string())
    }
}

/// Result alias for token operations.
pub type Result<T> = std::result::Result<T, Error>;
