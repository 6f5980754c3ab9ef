//! Interactive authorization-code flow
//!
//! Used once per end-user consent, never on the steady-state request path.
//! Builds the authorize URL the user visits, and turns the redirect
//! callback (`code` + optional CSRF `state`) into the first persisted
//! token through the manager's grant exchange.

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::manager::TokenManager;
use crate::token::Token;

/// Optional authorize-URL parameters beyond the mandatory
/// `client_id`/`redirect_uri`/`response_type=code` triple.
#[derive(Debug, Default, Clone)]
pub struct AuthorizeUrlOptions {
    pub scope: Option<String>,
    /// `offline` asks providers for a refresh token
    pub access_type: Option<String>,
    pub prompt: Option<String>,
    /// Opaque CSRF value, echoed back in the redirect callback
    pub state: Option<String>,
}

/// Query parameters of the redirect callback. Both fields are optional at
/// the type level so a malformed callback deserializes and fails with a
/// precise error instead of a generic decode failure.
#[derive(Debug, Clone, Deserialize)]
pub struct RedirectParams {
    pub code: Option<String>,
    pub state: Option<String>,
}

/// Caller-supplied CSRF state validator.
pub type StateChecker = dyn Fn(&str) -> Result<()> + Send + Sync;

/// Builds authorize URLs and exchanges redirect callbacks for tokens.
pub struct AuthorizationFlow {
    manager: std::sync::Arc<TokenManager>,
}

impl AuthorizationFlow {
    pub fn new(manager: std::sync::Arc<TokenManager>) -> Self {
        Self { manager }
    }

    /// The URL the end user visits to grant consent.
    ///
    /// Requires `auth_url` and `redirect_url` in the manager config.
    pub fn authorize_url(&self, options: &AuthorizeUrlOptions) -> Result<String> {
        let config = self.manager.config();
        let auth_url = config
            .auth_url
            .as_deref()
            .ok_or_else(|| Error::Flow("auth_url is not configured".into()))?;
        let redirect_url = config
            .redirect_url
            .as_deref()
            .ok_or_else(|| Error::Flow("redirect_url is not configured".into()))?;

        let mut url = reqwest::Url::parse(auth_url)
            .map_err(|e| Error::Flow(format!("invalid auth_url: {e}")))?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("redirect_uri", redirect_url);
            pairs.append_pair(&config.client_id_param, &config.client_id);
            pairs.append_pair("response_type", "code");
            if let Some(scope) = &options.scope {
                pairs.append_pair("scope", scope);
            }
            if let Some(access_type) = &options.access_type {
                pairs.append_pair("access_type", access_type);
            }
            if let Some(prompt) = &options.prompt {
                pairs.append_pair("prompt", prompt);
            }
            if let Some(state) = &options.state {
                pairs.append_pair("state", state);
            }
        }
        Ok(url.to_string())
    }

    /// Exchange a redirect callback for the first token, echoing the
    /// registered `redirect_uri` in the exchange.
    pub async fn token_from_redirect(
        &self,
        params: &RedirectParams,
        check_state: Option<&StateChecker>,
    ) -> Result<Token> {
        self.exchange(params, check_state, true, &[]).await
    }

    /// Like `token_from_redirect`, for providers that reject an echoed
    /// `redirect_uri` in the exchange request.
    pub async fn token_from_redirect_without_redirect_uri(
        &self,
        params: &RedirectParams,
        check_state: Option<&StateChecker>,
    ) -> Result<Token> {
        self.exchange(params, check_state, false, &[]).await
    }

    /// Like `token_from_redirect`, with provider-specific extra form data.
    pub async fn token_from_redirect_with_data(
        &self,
        params: &RedirectParams,
        extra_params: &[(&str, String)],
        check_state: Option<&StateChecker>,
    ) -> Result<Token> {
        self.exchange(params, check_state, true, extra_params).await
    }

    async fn exchange(
        &self,
        params: &RedirectParams,
        check_state: Option<&StateChecker>,
        include_redirect_uri: bool,
        extra_params: &[(&str, String)],
    ) -> Result<Token> {
        let code = params
            .code
            .as_deref()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| Error::Flow("redirect callback has no code parameter".into()))?;

        if let Some(check) = check_state {
            let state = params
                .state
                .as_deref()
                .filter(|s| !s.is_empty())
                .ok_or_else(|| Error::Flow("no state returned in redirect callback".into()))?;
            check(state)?;
        }

        self.manager
            .token_from_code(code, include_redirect_uri, extra_params)
            .await
    }
}
