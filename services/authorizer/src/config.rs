//! Configuration loading for the authorizer
//!
//! The client secret never lives in the TOML: it resolves from the
//! OAUTH_CLIENT_SECRET env var or from `client_secret_file`, wrapped in
//! `common::Secret` so it cannot leak through Debug output.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use common::Secret;
use serde::Deserialize;

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub oauth: OauthConfig,
    pub listener: ListenerConfig,
}

/// Provider endpoints and client identity
#[derive(Debug, Deserialize)]
pub struct OauthConfig {
    pub client_id: String,
    #[serde(skip)]
    pub client_secret: Option<Secret<String>>,
    /// Path to a file holding the client secret (alternative to the
    /// OAUTH_CLIENT_SECRET env var)
    #[serde(default)]
    pub client_secret_file: Option<PathBuf>,
    pub auth_url: String,
    pub token_url: String,
    #[serde(default)]
    pub refresh_token_url: Option<String>,
    pub redirect_url: String,
    #[serde(default)]
    pub scope: Option<String>,
    /// Where the exchanged token persists
    pub token_file: PathBuf,
}

/// Local callback listener settings
#[derive(Debug, Deserialize)]
pub struct ListenerConfig {
    pub listen_addr: SocketAddr,
    /// Where the browser lands after a successful exchange
    #[serde(default)]
    pub success_redirect: Option<String>,
}

impl Config {
    /// Load configuration from a TOML file and resolve the client secret.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        for (name, url) in [
            ("auth_url", &config.oauth.auth_url),
            ("token_url", &config.oauth.token_url),
            ("redirect_url", &config.oauth.redirect_url),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(common::Error::Config(format!(
                    "{name} must start with http:// or https://, got: {url}"
                )));
            }
        }

        config.oauth.client_secret = Some(Secret::resolve(
            "OAUTH_CLIENT_SECRET",
            config.oauth.client_secret_file.as_deref(),
        )?);

        Ok(config)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("authorizer.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn write_config(dir: &tempfile::TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("authorizer.toml");
        std::fs::write(&path, body).unwrap();
        path
    }

    const VALID: &str = r#"
[oauth]
client_id = "client-1"
auth_url = "https://id.example.com/authorize"
token_url = "https://id.example.com/token"
redirect_url = "http://127.0.0.1:8456/oauth/redirect"
scope = "read write"
token_file = "/tmp/token.json"

[listener]
listen_addr = "127.0.0.1:8456"
"#;

    #[test]
    #[serial]
    fn loads_valid_config_with_env_secret() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, VALID);

        unsafe { std::env::set_var("OAUTH_CLIENT_SECRET", "shh") };
        let config = Config::load(&path).unwrap();
        unsafe { std::env::remove_var("OAUTH_CLIENT_SECRET") };

        assert_eq!(config.oauth.client_id, "client-1");
        assert_eq!(config.oauth.scope.as_deref(), Some("read write"));
        assert_eq!(config.oauth.client_secret.unwrap().expose(), "shh");
        assert!(config.listener.success_redirect.is_none());
    }

    #[test]
    #[serial]
    fn secret_file_is_the_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let secret_path = dir.path().join("secret");
        std::fs::write(&secret_path, "from-file\n").unwrap();

        let body = VALID.replace(
            "token_file =",
            &format!(
                "client_secret_file = \"{}\"\ntoken_file =",
                secret_path.display()
            ),
        );
        let path = write_config(&dir, &body);

        let config = Config::load(&path).unwrap();
        assert_eq!(config.oauth.client_secret.unwrap().expose(), "from-file");
    }

    #[test]
    #[serial]
    fn rejects_non_http_urls() {
        let dir = tempfile::tempdir().unwrap();
        let body = VALID.replace(
            "https://id.example.com/token",
            "ftp://id.example.com/token",
        );
        let path = write_config(&dir, &body);

        unsafe { std::env::set_var("OAUTH_CLIENT_SECRET", "shh") };
        let err = Config::load(&path).unwrap_err();
        unsafe { std::env::remove_var("OAUTH_CLIENT_SECRET") };

        assert!(matches!(err, common::Error::Config(_)));
        assert!(err.to_string().contains("token_url"));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = Config::load(Path::new("/nonexistent/authorizer.toml")).unwrap_err();
        assert!(matches!(err, common::Error::Io(_)));
    }

    #[test]
    fn resolve_path_prefers_cli_argument() {
        let path = Config::resolve_path(Some("/etc/authorizer.toml"));
        assert_eq!(path, PathBuf::from("/etc/authorizer.toml"));
    }
}
