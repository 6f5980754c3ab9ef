//! Authenticated HTTP calls
//!
//! `AuthClient` is the thin layer between API callers and the transport:
//! it validates the token before every call, injects the bearer header,
//! and hands everything else to `reqwest` untouched. Response and error
//! bodies deserialize into caller-supplied models; this crate knows no
//! API-specific payload shapes.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use reqwest::Method;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::manager::TokenManager;

/// One outbound API request.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<serde_json::Value>,
    /// Skip token validation and bearer injection (health probes,
    /// unauthenticated discovery endpoints).
    pub skip_authentication: bool,
}

impl ApiRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: None,
            skip_authentication: false,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_header(mut self, name: reqwest::header::HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn skip_authentication(mut self) -> Self {
        self.skip_authentication = true;
        self
    }
}

/// Outcome of a typed API call: the response model on 2xx, or the status
/// plus the caller's error model (when it decodes) on anything else.
#[derive(Debug)]
pub enum ApiResponse<T, E> {
    Success(T),
    Failure { status: u16, error: Option<E> },
}

/// HTTP client that authenticates every request through a `TokenManager`.
pub struct AuthClient {
    manager: Arc<TokenManager>,
    http: reqwest::Client,
    /// Extra attempts after a transport failure. HTTP error statuses are
    /// never retried here; they carry meaning for the caller.
    max_retries: u32,
    call_count: AtomicU64,
}

impl AuthClient {
    pub fn new(manager: Arc<TokenManager>) -> Self {
        let http = manager.http_client();
        Self {
            manager,
            http,
            max_retries: 0,
            call_count: AtomicU64::new(0),
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Outbound calls dispatched since construction or the last reset.
    pub fn api_call_count(&self) -> u64 {
        self.call_count.load(Ordering::Relaxed)
    }

    pub fn reset_api_call_count(&self) {
        self.call_count.store(0, Ordering::Relaxed);
    }

    /// Send a request and return the raw response.
    ///
    /// Token validation errors propagate verbatim; there is no recovery at
    /// this layer. Only transport failures consume the retry budget.
    pub async fn send(&self, request: ApiRequest) -> Result<reqwest::Response> {
        let mut headers = request.headers.clone();

        if !request.skip_authentication {
            let token = self.manager.validate_token().await?;
            let access_token = token.access_token.ok_or(Error::NoAccessToken)?;
            let mut bearer = HeaderValue::from_str(&format!("Bearer {access_token}"))
                .map_err(|e| Error::Transport(format!("access token not header-safe: {e}")))?;
            bearer.set_sensitive(true);
            headers.insert(AUTHORIZATION, bearer);
        }

        let mut last_error: Option<Error> = None;
        for attempt in 0..=self.max_retries {
            let mut builder = self
                .http
                .request(request.method.clone(), &request.url)
                .headers(headers.clone());
            if let Some(body) = &request.body {
                builder = builder.json(body);
            }

            self.call_count.fetch_add(1, Ordering::Relaxed);
            match builder.send().await {
                Ok(response) => {
                    debug!(
                        url = %request.url,
                        status = response.status().as_u16(),
                        "api call completed"
                    );
                    return Ok(response);
                }
                Err(e) => {
                    warn!(url = %request.url, attempt, error = %e, "api call transport failure");
                    last_error = Some(Error::Transport(e.to_string()));
                }
            }
        }

        Err(last_error.unwrap_or_else(|| Error::Transport("request never dispatched".into())))
    }

    /// Send a request and deserialize the outcome into caller-supplied
    /// models: `T` for 2xx bodies, `E` for everything else.
    ///
    /// A non-2xx body that does not decode as `E` still yields `Failure`
    /// with the status; the decode problem is logged, never surfaced in
    /// place of the real failure.
    pub async fn send_json<T, E>(&self, request: ApiRequest) -> Result<ApiResponse<T, E>>
    where
        T: DeserializeOwned,
        E: DeserializeOwned,
    {
        let url = request.url.clone();
        let response = self.send(request).await?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Transport(format!("reading response body: {e}")))?;

        if status.is_success() {
            let model = serde_json::from_str::<T>(&body)
                .map_err(|e| Error::Transport(format!("decoding response body: {e}")))?;
            return Ok(ApiResponse::Success(model));
        }

        let error = match serde_json::from_str::<E>(&body) {
            Ok(model) => Some(model),
            Err(e) => {
                warn!(url = %url, status = status.as_u16(), decode_error = %e, "error body did not match caller's error model");
                None
            }
        };
        Ok(ApiResponse::Failure {
            status: status.as_u16(),
            error,
        })
    }
}
