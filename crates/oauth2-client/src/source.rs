//! TokenSource: pluggable token storage and minting
//!
//! A source owns the current token value and its persistence. All
//! refresh/mint orchestration lives in `TokenManager`; the variants here
//! only answer "what token do we have", "load it", "mint one if you can",
//! and "store this one".
//!
//! Variants:
//! - `FixedTokenSource` — static access token, never refreshes or mints
//! - `KeyValueTokenSource` — token persisted in a `KeyValueStore`
//! - `CallbackTokenSource` — caller-supplied retrieve/mint/save closures

use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::store::KeyValueStore;
use crate::token::Token;

/// Keys of the persisted token layout.
const KEY_ACCESS_TOKEN: &str = "access_token";
const KEY_REFRESH_TOKEN: &str = "refresh_token";
const KEY_TOKEN_TYPE: &str = "token_type";
const KEY_SCOPE: &str = "scope";
const KEY_EXPIRY: &str = "expiry";

/// Boxed async closure used by `CallbackTokenSource`.
pub type TokenFuture = Pin<Box<dyn Future<Output = Result<Option<Token>>> + Send>>;
pub type SaveFuture = Pin<Box<dyn Future<Output = Result<()>> + Send>>;

/// Storage + minting strategy behind the token manager.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Currently held token, if any.
    fn token(&self) -> Option<&Token>;

    /// Load a previously persisted token into memory.
    async fn retrieve_token(&mut self) -> Result<()>;

    /// Mint a wholly new token, or `None` if this source has no mint
    /// capability (the manager turns that into `ReauthorizationRequired`).
    async fn new_token(&mut self) -> Result<Option<Token>>;

    /// Replace the held token; write through to storage when `persist`.
    async fn set_token(&mut self, token: Token, persist: bool) -> Result<()>;

    /// Persist the held token.
    async fn save_token(&mut self) -> Result<()>;
}

/// Static token source: always returns the same access token.
///
/// `set_token` and `save_token` are deliberate no-ops; a fixed token cannot
/// be refreshed, minted, or persisted.
pub struct FixedTokenSource {
    token: Token,
}

impl FixedTokenSource {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            token: Token::from_access_token(access_token),
        }
    }
}

#[async_trait]
impl TokenSource for FixedTokenSource {
    fn token(&self) -> Option<&Token> {
        Some(&self.token)
    }

    async fn retrieve_token(&mut self) -> Result<()> {
        Ok(())
    }

    async fn new_token(&mut self) -> Result<Option<Token>> {
        Ok(None)
    }

    async fn set_token(&mut self, _token: Token, _persist: bool) -> Result<()> {
        Ok(())
    }

    async fn save_token(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Token source persisted in a key/value store.
pub struct KeyValueTokenSource {
    token: Option<Token>,
    store: Box<dyn KeyValueStore>,
}

impl KeyValueTokenSource {
    pub fn new(store: Box<dyn KeyValueStore>) -> Self {
        Self { token: None, store }
    }
}

#[async_trait]
impl TokenSource for KeyValueTokenSource {
    fn token(&self) -> Option<&Token> {
        self.token.as_ref()
    }

    async fn retrieve_token(&mut self) -> Result<()> {
        let token = Token {
            access_token: self.store.get(KEY_ACCESS_TOKEN).await?,
            refresh_token: self.store.get(KEY_REFRESH_TOKEN).await?,
            token_type: self.store.get(KEY_TOKEN_TYPE).await?,
            scope: self.store.get(KEY_SCOPE).await?,
            expires_in: None,
            expiry: self.store.get_timestamp(KEY_EXPIRY).await?,
        };
        self.token = Some(token);
        Ok(())
    }

    async fn new_token(&mut self) -> Result<Option<Token>> {
        Ok(None)
    }

    async fn set_token(&mut self, mut token: Token, persist: bool) -> Result<()> {
        if token.access_token.is_none() {
            return Err(Error::NoAccessToken);
        }

        // Refresh responses often omit the refresh token; keep the old one
        // so the refresh-grant path survives rotation-free providers.
        if token.refresh_token.is_none() {
            token.refresh_token = self.token.as_ref().and_then(|t| t.refresh_token.clone());
        }

        self.token = Some(token);

        if persist {
            self.save_token().await?;
        }
        Ok(())
    }

    async fn save_token(&mut self) -> Result<()> {
        let token = self
            .token
            .as_ref()
            .ok_or_else(|| Error::Persistence("no token to save".into()))?
            .clone();

        if let Some(access_token) = &token.access_token {
            self.store.set(KEY_ACCESS_TOKEN, access_token.clone()).await?;
        }
        if let Some(refresh_token) = &token.refresh_token {
            self.store.set(KEY_REFRESH_TOKEN, refresh_token.clone()).await?;
        }
        if let Some(token_type) = &token.token_type {
            self.store.set(KEY_TOKEN_TYPE, token_type.clone()).await?;
        }
        if let Some(scope) = &token.scope {
            self.store.set(KEY_SCOPE, scope.clone()).await?;
        }
        if let Some(expiry) = token.expiry {
            self.store.set_timestamp(KEY_EXPIRY, expiry).await?;
        }

        self.store.save().await
    }
}

/// Token source driven by caller-supplied closures.
///
/// All three hooks are optional: without `retrieve` the source starts
/// empty, without `mint` the manager reports `ReauthorizationRequired`
/// once refresh is exhausted, without `save` tokens live in memory only.
#[derive(Default)]
pub struct CallbackTokenSource {
    token: Option<Token>,
    retrieve: Option<Box<dyn Fn() -> TokenFuture + Send + Sync>>,
    mint: Option<Box<dyn Fn() -> TokenFuture + Send + Sync>>,
    save: Option<Box<dyn Fn(Token) -> SaveFuture + Send + Sync>>,
}

impl CallbackTokenSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retrieve(
        mut self,
        retrieve: impl Fn() -> TokenFuture + Send + Sync + 'static,
    ) -> Self {
        self.retrieve = Some(Box::new(retrieve));
        self
    }

    pub fn with_mint(mut self, mint: impl Fn() -> TokenFuture + Send + Sync + 'static) -> Self {
        self.mint = Some(Box::new(mint));
        self
    }

    pub fn with_save(
        mut self,
        save: impl Fn(Token) -> SaveFuture + Send + Sync + 'static,
    ) -> Self {
        self.save = Some(Box::new(save));
        self
    }
}

#[async_trait]
impl TokenSource for CallbackTokenSource {
    fn token(&self) -> Option<&Token> {
        self.token.as_ref()
    }

    async fn retrieve_token(&mut self) -> Result<()> {
        if let Some(retrieve) = &self.retrieve {
            if let Some(token) = retrieve().await? {
                self.token = Some(token);
            }
        }
        Ok(())
    }

    async fn new_token(&mut self) -> Result<Option<Token>> {
        match &self.mint {
            Some(mint) => mint().await,
            None => Ok(None),
        }
    }

    async fn set_token(&mut self, token: Token, persist: bool) -> Result<()> {
        self.token = Some(token);
        if persist {
            self.save_token().await?;
        }
        Ok(())
    }

    async fn save_token(&mut self) -> Result<()> {
        if let (Some(save), Some(token)) = (&self.save, &self.token) {
            save(token.clone()).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::Utc;

    #[tokio::test]
    async fn fixed_source_always_serves_the_same_token() {
        let mut source = FixedTokenSource::new("at_fixed");
        assert_eq!(
            source.token().unwrap().access_token.as_deref(),
            Some("at_fixed")
        );

        // Mutations are no-ops
        source
            .set_token(Token::from_access_token("at_other"), true)
            .await
            .unwrap();
        assert_eq!(
            source.token().unwrap().access_token.as_deref(),
            Some("at_fixed")
        );

        // No mint capability
        assert!(source.new_token().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn key_value_source_round_trips_all_fields() {
        let mut source = KeyValueTokenSource::new(Box::new(MemoryStore::new()));
        let expiry = "2030-06-01T12:00:00Z".parse().unwrap();
        let token = Token {
            access_token: Some("at".into()),
            refresh_token: Some("rt".into()),
            token_type: Some("Bearer".into()),
            scope: Some("read".into()),
            expires_in: None,
            expiry: Some(expiry),
        };

        source.set_token(token, true).await.unwrap();

        // Drop the in-memory copy and reload from the store
        source.token = None;
        source.retrieve_token().await.unwrap();

        let loaded = source.token().unwrap();
        assert_eq!(loaded.access_token.as_deref(), Some("at"));
        assert_eq!(loaded.refresh_token.as_deref(), Some("rt"));
        assert_eq!(loaded.token_type.as_deref(), Some("Bearer"));
        assert_eq!(loaded.scope.as_deref(), Some("read"));
        assert_eq!(loaded.expiry, Some(expiry));
    }

    #[tokio::test]
    async fn key_value_source_preserves_none_fields() {
        let mut source = KeyValueTokenSource::new(Box::new(MemoryStore::new()));
        let token = Token::from_access_token("at_only");

        source.set_token(token, true).await.unwrap();
        source.token = None;
        source.retrieve_token().await.unwrap();

        let loaded = source.token().unwrap();
        assert_eq!(loaded.access_token.as_deref(), Some("at_only"));
        assert!(loaded.refresh_token.is_none());
        assert!(loaded.token_type.is_none());
        assert!(loaded.scope.is_none());
        assert!(loaded.expiry.is_none());
    }

    #[tokio::test]
    async fn key_value_source_rejects_token_without_access_token() {
        let mut source = KeyValueTokenSource::new(Box::new(MemoryStore::new()));
        let err = source.set_token(Token::default(), false).await.unwrap_err();
        assert!(matches!(err, Error::NoAccessToken));
    }

    #[tokio::test]
    async fn key_value_source_carries_refresh_token_forward() {
        let mut source = KeyValueTokenSource::new(Box::new(MemoryStore::new()));
        let first = Token {
            access_token: Some("at_1".into()),
            refresh_token: Some("rt_keep".into()),
            ..Token::default()
        };
        source.set_token(first, false).await.unwrap();

        // Refresh response without a refresh_token of its own
        let refreshed = Token::from_access_token("at_2");
        source.set_token(refreshed, false).await.unwrap();

        let held = source.token().unwrap();
        assert_eq!(held.access_token.as_deref(), Some("at_2"));
        assert_eq!(held.refresh_token.as_deref(), Some("rt_keep"));
    }

    #[tokio::test]
    async fn key_value_source_save_without_token_errors() {
        let mut source = KeyValueTokenSource::new(Box::new(MemoryStore::new()));
        let err = source.save_token().await.unwrap_err();
        assert!(matches!(err, Error::Persistence(_)));
    }

    #[tokio::test]
    async fn callback_source_retrieves_and_mints_via_closures() {
        let mut source = CallbackTokenSource::new()
            .with_retrieve(|| {
                Box::pin(async { Ok(Some(Token::from_access_token("at_retrieved"))) })
            })
            .with_mint(|| Box::pin(async { Ok(Some(Token::from_access_token("at_minted"))) }));

        assert!(source.token().is_none());
        source.retrieve_token().await.unwrap();
        assert_eq!(
            source.token().unwrap().access_token.as_deref(),
            Some("at_retrieved")
        );

        let minted = source.new_token().await.unwrap().unwrap();
        assert_eq!(minted.access_token.as_deref(), Some("at_minted"));
    }

    #[tokio::test]
    async fn callback_source_without_mint_returns_none() {
        let mut source = CallbackTokenSource::new();
        assert!(source.new_token().await.unwrap().is_none());
        // retrieve without a closure is a no-op, not an error
        source.retrieve_token().await.unwrap();
        assert!(source.token().is_none());
    }

    #[tokio::test]
    async fn callback_source_persists_through_save_closure() {
        use std::sync::{Arc, Mutex};

        let saved: Arc<Mutex<Option<Token>>> = Arc::new(Mutex::new(None));
        let sink = saved.clone();

        let mut source = CallbackTokenSource::new().with_save(move |token| {
            let sink = sink.clone();
            Box::pin(async move {
                *sink.lock().unwrap() = Some(token);
                Ok(())
            })
        });

        let mut token = Token::from_access_token("at_saved");
        token.expiry = Some(Utc::now());
        source.set_token(token, true).await.unwrap();

        let stored = saved.lock().unwrap();
        assert_eq!(
            stored.as_ref().unwrap().access_token.as_deref(),
            Some("at_saved")
        );
    }
}
