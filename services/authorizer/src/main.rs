//! OAuth2 authorizer — one-time interactive consent helper
//!
//! Short-lived local listener for the authorization-code flow:
//! 1. Builds the authorize URL with a fresh CSRF state and prints it
//! 2. Waits on `GET /oauth/redirect` for the provider's callback
//! 3. Exchanges the code and persists the token to the configured file
//! 4. Shuts down
//!
//! Steady-state services then load that file through a
//! `KeyValueTokenSource` and never need this binary again, unless the
//! refresh token is revoked.

mod config;
mod redirect;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use axum::routing::get;
use oauth2_client::{
    AuthorizationFlow, AuthorizeUrlOptions, JsonFileStore, KeyValueTokenSource, ManagerConfig,
    TokenManager,
};
use tokio::net::TcpListener;
use tokio::sync::{Mutex, oneshot};
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::redirect::{AppState, redirect_handler};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting oauth2-authorizer");

    // CLI: simple --config flag parsing
    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    info!(path = %config_path.display(), "loading configuration");
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    let client_secret = config
        .oauth
        .client_secret
        .context("client secret was not resolved")?;

    let store = JsonFileStore::load(config.oauth.token_file.clone())
        .await
        .context("opening token file")?;

    let mut manager_config = ManagerConfig::new(
        config.oauth.client_id.clone(),
        client_secret,
        config.oauth.token_url.clone(),
    )
    .with_auth_url(config.oauth.auth_url.clone())
    .with_redirect_url(config.oauth.redirect_url.clone());
    if let Some(refresh_url) = &config.oauth.refresh_token_url {
        manager_config = manager_config.with_refresh_token_url(refresh_url.clone());
    }

    let manager = Arc::new(TokenManager::new(
        manager_config,
        Box::new(KeyValueTokenSource::new(Box::new(store))),
    ));
    let flow = Arc::new(AuthorizationFlow::new(manager));

    // Fresh CSRF state per run; the callback must echo it
    let state = uuid::Uuid::new_v4().to_string();

    let authorize_url = flow.authorize_url(&AuthorizeUrlOptions {
        scope: config.oauth.scope.clone(),
        access_type: Some("offline".into()),
        prompt: None,
        state: Some(state.clone()),
    })?;

    info!(url = %authorize_url, "open this URL in a browser to authorize");
    println!("\nOpen this URL in a browser to authorize:\n\n  {authorize_url}\n");

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let app_state = AppState {
        flow,
        expected_state: state,
        success_redirect: config
            .listener
            .success_redirect
            .unwrap_or_else(|| "about:blank".into()),
        shutdown: Arc::new(Mutex::new(Some(shutdown_tx))),
    };

    let router = Router::new()
        .route("/oauth/redirect", get(redirect_handler))
        .with_state(app_state);

    let listener = TcpListener::bind(config.listener.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.listener.listen_addr))?;
    info!(addr = %config.listener.listen_addr, "waiting for redirect callback");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = shutdown_rx => info!("token acquired, shutting down"),
                _ = tokio::signal::ctrl_c() => info!("interrupted, shutting down"),
            }
        })
        .await
        .context("serving redirect listener")?;

    info!(path = %config.oauth.token_file.display(), "done");
    Ok(())
}
