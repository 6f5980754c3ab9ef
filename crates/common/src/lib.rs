//! Shared types for the OAuth2 client workspace

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
