//! Grant exchange against the token endpoint
//!
//! One procedure serves all three grant shapes (refresh_token,
//! authorization_code, source-defined): it differs only in the form
//! parameters the caller passes in. POST encodes them as
//! `application/x-www-form-urlencoded`; GET appends them as a query string.
//! Both send `Accept: application/json`.
//!
//! This layer makes exactly one attempt. Retries, if any, belong to the
//! transport configuration, never here: authorization codes are single-use
//! and a blind retry would burn them.

use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::token::Token;

/// HTTP method used against the token endpoint. Most providers take POST;
/// a few legacy ones only accept GET with query parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TokenHttpMethod {
    Get,
    #[default]
    Post,
}

/// Structured error body some providers return alongside non-2xx statuses.
#[derive(Debug, Deserialize)]
struct EndpointErrorBody {
    error: Option<String>,
    error_description: Option<String>,
}

/// Execute one grant exchange and return the parsed token with its expiry
/// already normalized to UTC.
///
/// Status handling:
/// - 401 is terminal: `ReauthorizationRequired`, body never parsed as a token
/// - other non-2xx: best-effort decode of `{error, error_description}` for
///   the log, then `TokenEndpoint{status, url}`; a decode failure is logged
///   and never masks the endpoint error
/// - 2xx: decode the token payload and normalize `expires_in`
pub(crate) async fn execute_grant(
    http: &reqwest::Client,
    method: TokenHttpMethod,
    url: &str,
    params: &[(&str, String)],
) -> Result<Token> {
    let request = match method {
        TokenHttpMethod::Get => http
            .get(url)
            .query(params)
            .header(CONTENT_TYPE, "application/json"),
        TokenHttpMethod::Post => http.post(url).form(params),
    };

    let response = request
        .header(ACCEPT, "application/json")
        .send()
        .await
        .map_err(|e| {
            metrics::counter!("oauth2_grant_exchanges_total", "result" => "transport_error")
                .increment(1);
            Error::Transport(format!("token endpoint request failed: {e}"))
        })?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));

        if status.as_u16() == 401 {
            warn!(url, "token endpoint rejected credentials");
            metrics::counter!("oauth2_grant_exchanges_total", "result" => "unauthorized")
                .increment(1);
            return Err(Error::ReauthorizationRequired);
        }

        match serde_json::from_str::<EndpointErrorBody>(&body) {
            Ok(decoded) => warn!(
                url,
                status = status.as_u16(),
                error = decoded.error.as_deref().unwrap_or(""),
                description = decoded.error_description.as_deref().unwrap_or(""),
                "token endpoint returned error"
            ),
            // Decode failure is logging-only; the endpoint error below is
            // the one the caller needs to see.
            Err(e) => warn!(
                url,
                status = status.as_u16(),
                body_len = body.len(),
                decode_error = %e,
                "token endpoint error body is not structured"
            ),
        }

        metrics::counter!("oauth2_grant_exchanges_total", "result" => "endpoint_error")
            .increment(1);
        return Err(Error::TokenEndpoint {
            status: status.as_u16(),
            url: url.to_owned(),
        });
    }

    let mut token = response
        .json::<Token>()
        .await
        .map_err(|e| Error::Transport(format!("invalid token endpoint response: {e}")))?;
    token.normalize_expiry()?;

    debug!(url, has_refresh = token.has_refresh_token(), "grant exchange succeeded");
    metrics::counter!("oauth2_grant_exchanges_total", "result" => "ok").increment(1);
    Ok(token)
}
