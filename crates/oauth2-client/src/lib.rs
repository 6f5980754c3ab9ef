//! OAuth2 client-credential manager
//!
//! Acquires, caches, refreshes, and attaches bearer tokens for outbound
//! API calls. The center of the crate is `TokenManager::validate_token`:
//! on every call it decides whether the cached token is usable, must be
//! refreshed, or must be freshly minted, and it serializes those decisions
//! per manager so concurrent callers share a single grant exchange.
//!
//! Typical wiring:
//! 1. Pick a `TokenSource` (fixed, key-value backed, or callback backed)
//! 2. Build a `TokenManager` from a `ManagerConfig` and the source
//! 3. Wrap it in an `AuthClient` for authenticated API calls
//! 4. For first-time consent, drive `AuthorizationFlow` from a redirect
//!    listener (see the `authorizer` service)

pub mod client;
pub mod error;
pub mod exchange;
pub mod flow;
pub mod manager;
pub mod source;
pub mod store;
pub mod token;

pub use client::{ApiRequest, ApiResponse, AuthClient};
pub use error::{Error, Result};
pub use exchange::TokenHttpMethod;
pub use flow::{AuthorizationFlow, AuthorizeUrlOptions, RedirectParams, StateChecker};
pub use manager::{DEFAULT_REFRESH_MARGIN, ManagerConfig, TokenManager};
pub use source::{CallbackTokenSource, FixedTokenSource, KeyValueTokenSource, TokenSource};
pub use store::{JsonFileStore, KeyValueStore, MemoryStore};
pub use token::{ExpiresIn, Token};
