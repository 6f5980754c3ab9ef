//! Redirect callback handler
//!
//! The provider sends the browser to `GET /oauth/redirect?code&state`
//! after consent. The handler checks the CSRF state against the value
//! minted at startup, exchanges the code through the flow, and answers
//! 302 on success or 400 when the callback is malformed. A successful
//! exchange also signals the listener to shut down — the authorizer's
//! job is done after one token.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use oauth2_client::{AuthorizationFlow, Error as OauthError, RedirectParams, StateChecker};
use tokio::sync::{Mutex, oneshot};
use tracing::{info, warn};

/// Shared listener state.
#[derive(Clone)]
pub struct AppState {
    pub flow: Arc<AuthorizationFlow>,
    /// CSRF state minted at startup; the callback must echo it
    pub expected_state: String,
    /// Where the browser lands after a successful exchange
    pub success_redirect: String,
    pub shutdown: Arc<Mutex<Option<oneshot::Sender<()>>>>,
}

pub async fn redirect_handler(
    State(app): State<AppState>,
    Query(params): Query<RedirectParams>,
) -> Response {
    let expected = app.expected_state.clone();
    let checker = move |state: &str| -> oauth2_client::Result<()> {
        if state == expected {
            Ok(())
        } else {
            Err(OauthError::Flow(
                "state does not match this authorization attempt".into(),
            ))
        }
    };

    match app
        .flow
        .token_from_redirect(&params, Some(&checker as &StateChecker))
        .await
    {
        Ok(_) => {
            info!("authorization code exchanged, token persisted");
            if let Some(tx) = app.shutdown.lock().await.take() {
                let _ = tx.send(());
            }
            found(&app.success_redirect)
        }
        Err(e @ OauthError::Flow(_)) => {
            warn!(error = %e, "rejected redirect callback");
            (StatusCode::BAD_REQUEST, e.to_string()).into_response()
        }
        Err(e) => {
            warn!(error = %e, "code exchange failed");
            (StatusCode::BAD_GATEWAY, e.to_string()).into_response()
        }
    }
}

/// Plain 302 with a Location header.
fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_owned())]).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Secret;
    use oauth2_client::{KeyValueTokenSource, ManagerConfig, MemoryStore, TokenManager};
    use wiremock::matchers::{body_string_contains, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn app_state(token_url: &str) -> (AppState, oneshot::Receiver<()>) {
        let config = ManagerConfig::new("client-1", Secret::new("shh".to_string()), token_url)
            .with_auth_url("https://id.example.com/authorize")
            .with_redirect_url("http://127.0.0.1:8456/oauth/redirect");
        let manager = Arc::new(TokenManager::new(
            config,
            Box::new(KeyValueTokenSource::new(Box::new(MemoryStore::new()))),
        ));
        let (tx, rx) = oneshot::channel();
        let state = AppState {
            flow: Arc::new(AuthorizationFlow::new(manager)),
            expected_state: "state-123".into(),
            success_redirect: "https://app.example.com/connected".into(),
            shutdown: Arc::new(Mutex::new(Some(tx))),
        };
        (state, rx)
    }

    #[tokio::test]
    async fn valid_callback_exchanges_and_redirects() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("code=the-code"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "at", "refresh_token": "rt", "expires_in": 3600
            })))
            .expect(1)
            .mount(&server)
            .await;

        let (state, shutdown_rx) = app_state(&server.uri());
        let params = RedirectParams {
            code: Some("the-code".into()),
            state: Some("state-123".into()),
        };

        let response = redirect_handler(State(state), Query(params)).await;
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(
            response.headers().get(header::LOCATION).unwrap(),
            "https://app.example.com/connected"
        );
        shutdown_rx.await.expect("success must trigger shutdown");
    }

    #[tokio::test]
    async fn state_mismatch_is_rejected_with_400() {
        let (state, _rx) = app_state("http://127.0.0.1:9/token");
        let params = RedirectParams {
            code: Some("the-code".into()),
            state: Some("tampered".into()),
        };

        let response = redirect_handler(State(state), Query(params)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn missing_code_is_rejected_with_400() {
        let (state, _rx) = app_state("http://127.0.0.1:9/token");
        let params = RedirectParams {
            code: None,
            state: Some("state-123".into()),
        };

        let response = redirect_handler(State(state), Query(params)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn endpoint_failure_maps_to_502() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let (state, _rx) = app_state(&server.uri());
        let params = RedirectParams {
            code: Some("the-code".into()),
            state: Some("state-123".into()),
        };

        let response = redirect_handler(State(state), Query(params)).await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
}
