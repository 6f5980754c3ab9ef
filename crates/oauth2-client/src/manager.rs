//! Token lifecycle manager — the refresh/mint state machine
//!
//! `TokenManager` owns one `TokenSource` and decides, on every call to
//! `validate_token`, whether the cached token is usable, must be refreshed,
//! or must be freshly minted. The whole decision sequence runs under one
//! per-manager `tokio::sync::Mutex` held across the token-endpoint round
//! trip: at most one refresh or mint is ever in flight per manager, so
//! concurrent callers collapse into a single grant exchange (refresh tokens
//! rotate once, authorization codes are consumed once).
//!
//! The lock is owned by the manager instance, not shared process-wide.
//! Two managers with different credential sets never serialize against
//! each other.

use std::time::Duration;

use chrono::Utc;
use common::Secret;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::exchange::{TokenHttpMethod, execute_grant};
use crate::source::TokenSource;
use crate::token::Token;

/// Default safety window: a token is treated as stale this long before its
/// literal expiry, so it cannot expire while a request is in flight.
pub const DEFAULT_REFRESH_MARGIN: Duration = Duration::from_secs(60);

const DEFAULT_CLIENT_ID_PARAM: &str = "client_id";

/// Static configuration for a `TokenManager`.
#[derive(Debug)]
pub struct ManagerConfig {
    pub client_id: String,
    pub client_secret: Secret<String>,
    /// Token endpoint for code exchange (and refresh, unless overridden)
    pub token_url: String,
    /// Separate refresh endpoint, for the few providers that have one
    pub refresh_token_url: Option<String>,
    /// Authorize endpoint, only needed for the interactive flow
    pub auth_url: Option<String>,
    /// Redirect URI registered with the provider
    pub redirect_url: Option<String>,
    pub token_http_method: TokenHttpMethod,
    pub refresh_margin: Duration,
    /// Form parameter name for the client id. Almost always `client_id`;
    /// a handful of providers use a vendor-specific name.
    pub client_id_param: String,
}

impl ManagerConfig {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: Secret<String>,
        token_url: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret,
            token_url: token_url.into(),
            refresh_token_url: None,
            auth_url: None,
            redirect_url: None,
            token_http_method: TokenHttpMethod::default(),
            refresh_margin: DEFAULT_REFRESH_MARGIN,
            client_id_param: DEFAULT_CLIENT_ID_PARAM.into(),
        }
    }

    pub fn with_refresh_token_url(mut self, url: impl Into<String>) -> Self {
        self.refresh_token_url = Some(url.into());
        self
    }

    pub fn with_auth_url(mut self, url: impl Into<String>) -> Self {
        self.auth_url = Some(url.into());
        self
    }

    pub fn with_redirect_url(mut self, url: impl Into<String>) -> Self {
        self.redirect_url = Some(url.into());
        self
    }

    pub fn with_token_http_method(mut self, method: TokenHttpMethod) -> Self {
        self.token_http_method = method;
        self
    }

    pub fn with_refresh_margin(mut self, margin: Duration) -> Self {
        self.refresh_margin = margin;
        self
    }

    pub fn with_client_id_param(mut self, name: impl Into<String>) -> Self {
        self.client_id_param = name.into();
        self
    }

    fn refresh_url(&self) -> &str {
        self.refresh_token_url.as_deref().unwrap_or(&self.token_url)
    }
}

/// Owns the refresh policy, the concurrency guard, and the expiry-margin
/// decision for one credential set.
pub struct TokenManager {
    config: ManagerConfig,
    http: reqwest::Client,
    source: Mutex<Box<dyn TokenSource>>,
}

impl TokenManager {
    pub fn new(config: ManagerConfig, source: Box<dyn TokenSource>) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
            source: Mutex::new(source),
        }
    }

    /// Use a caller-provided HTTP client (shared connection pool, custom
    /// timeouts) for token-endpoint calls.
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Clone of the manager's HTTP client, for layers that share it.
    pub fn http_client(&self) -> reqwest::Client {
        self.http.clone()
    }

    /// Return a token valid at least `refresh_margin` from now, refreshing
    /// or minting as needed.
    ///
    /// Sequence (all under the manager's lock):
    /// 1. no cached token → retrieve from the source, mint if still absent
    /// 2. cached token without access token → re-retrieve once, then fail
    /// 3. token valid at `now + margin` → return it (the common fast path)
    /// 4. refresh token present → refresh grant, return if now valid
    /// 5. otherwise mint via the source, return if now valid
    /// 6. nothing worked → `ReauthorizationRequired`
    pub async fn validate_token(&self) -> Result<Token> {
        let mut source = self.source.lock().await;

        if source.token().is_none() {
            source.retrieve_token().await?;
        }
        if source.token().is_none() {
            debug!("no persisted token, minting");
            if !self.mint(&mut **source).await? {
                return Err(Error::ReauthorizationRequired);
            }
        }

        if !source.token().is_some_and(Token::has_access_token) {
            // The persisted copy may have been replaced out-of-band; one
            // re-retrieval before giving up.
            source.retrieve_token().await?;
            if !source.token().is_some_and(Token::has_access_token) {
                return Err(Error::NoAccessToken);
            }
        }

        // A token expiring within the margin counts as stale so it cannot
        // expire mid-flight on the call it authorizes.
        let margin = chrono::Duration::from_std(self.config.refresh_margin)
            .unwrap_or_else(|_| chrono::Duration::seconds(60));
        let deadline = Utc::now() + margin;

        if let Some(token) = source.token() {
            if token.has_valid_access_token(deadline) {
                return Ok(token.clone());
            }
        }

        let refresh_token = source
            .token()
            .filter(|t| t.has_refresh_token())
            .and_then(|t| t.refresh_token.clone());

        if let Some(refresh_token) = refresh_token {
            debug!(url = self.config.refresh_url(), "access token stale, refreshing");
            let params = [
                (self.config.client_id_param.as_str(), self.config.client_id.clone()),
                ("client_secret", self.config.client_secret.expose().clone()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token".to_string()),
            ];
            let token = execute_grant(
                &self.http,
                self.config.token_http_method,
                self.config.refresh_url(),
                &params,
            )
            .await?;
            source.set_token(token, true).await?;
            metrics::counter!("oauth2_token_refreshes_total").increment(1);
            info!("token refreshed");

            if let Some(token) = source.token() {
                if token.has_valid_access_token(deadline) {
                    return Ok(token.clone());
                }
            }
            warn!("refreshed token is not valid at the deadline, attempting mint");
        }

        if self.mint(&mut **source).await? {
            if let Some(token) = source.token() {
                if token.has_valid_access_token(deadline) {
                    return Ok(token.clone());
                }
            }
        }

        Err(Error::ReauthorizationRequired)
    }

    /// Exchange an authorization code for the first token and persist it.
    ///
    /// `include_redirect_uri` matters to providers that require the exact
    /// redirect URI to be echoed in the exchange; `extra_params` carries
    /// provider-specific additions.
    pub async fn token_from_code(
        &self,
        code: &str,
        include_redirect_uri: bool,
        extra_params: &[(&str, String)],
    ) -> Result<Token> {
        let mut source = self.source.lock().await;

        let mut params: Vec<(&str, String)> = extra_params.to_vec();
        params.push((self.config.client_id_param.as_str(), self.config.client_id.clone()));
        params.push(("client_secret", self.config.client_secret.expose().clone()));
        params.push(("code", code.to_string()));
        params.push(("grant_type", "authorization_code".to_string()));
        if include_redirect_uri {
            if let Some(redirect_url) = &self.config.redirect_url {
                params.push(("redirect_uri", redirect_url.clone()));
            }
        }

        let token = execute_grant(
            &self.http,
            self.config.token_http_method,
            &self.config.token_url,
            &params,
        )
        .await?;
        source.set_token(token, true).await?;
        metrics::counter!("oauth2_token_mints_total", "grant" => "authorization_code")
            .increment(1);
        info!("authorization code exchanged for token");

        source
            .token()
            .cloned()
            .ok_or(Error::ReauthorizationRequired)
    }

    /// Mint a new token through the source. Returns false when the source
    /// has no mint capability.
    async fn mint(&self, source: &mut dyn TokenSource) -> Result<bool> {
        match source.new_token().await? {
            Some(mut token) => {
                token.normalize_expiry()?;
                source.set_token(token, true).await?;
                metrics::counter!("oauth2_token_mints_total", "grant" => "source").increment(1);
                info!("minted new token via source");
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
