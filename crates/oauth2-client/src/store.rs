//! Key-value persistence for tokens
//!
//! Tokens persist as a flat key/value layout: `access_token`,
//! `refresh_token`, `token_type` and `scope` as strings, `expiry` as an
//! RFC 3339 UTC timestamp. `set`/`set_timestamp` update memory only; `save`
//! flushes, so a token write-through is one disk operation.
//!
//! `JsonFileStore` writes atomically (temp file + rename, 0600 permissions)
//! because the file holds live credentials and a crash mid-write must not
//! corrupt it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Persistence backend consumed by `KeyValueTokenSource`.
///
/// Implementations only move strings and timestamps; they know nothing
/// about tokens or the OAuth flow.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn get_timestamp(&self, key: &str) -> Result<Option<DateTime<Utc>>>;
    async fn set(&mut self, key: &str, value: String) -> Result<()>;
    async fn set_timestamp(&mut self, key: &str, value: DateTime<Utc>) -> Result<()>;
    /// Flush pending writes to the backing medium.
    async fn save(&mut self) -> Result<()>;
}

/// In-memory store. Nothing survives the process; useful for tests and for
/// callers that only want the refresh discipline, not durability.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    async fn get_timestamp(&self, key: &str) -> Result<Option<DateTime<Utc>>> {
        parse_timestamp(key, self.entries.get(key))
    }

    async fn set(&mut self, key: &str, value: String) -> Result<()> {
        self.entries.insert(key.to_owned(), value);
        Ok(())
    }

    async fn set_timestamp(&mut self, key: &str, value: DateTime<Utc>) -> Result<()> {
        self.entries.insert(key.to_owned(), value.to_rfc3339());
        Ok(())
    }

    async fn save(&mut self) -> Result<()> {
        Ok(())
    }
}

/// File-backed store: one JSON object per file, atomic writes.
pub struct JsonFileStore {
    path: PathBuf,
    entries: HashMap<String, String>,
}

impl JsonFileStore {
    /// Load the store from `path`. A missing file is a cold start: the
    /// store begins empty and the file is created on first `save`.
    pub async fn load(path: PathBuf) -> Result<Self> {
        let entries = if path.exists() {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::Persistence(format!("reading token file: {e}")))?;
            let entries: HashMap<String, String> = serde_json::from_str(&contents)
                .map_err(|e| Error::Persistence(format!("parsing token file: {e}")))?;
            info!(path = %path.display(), keys = entries.len(), "loaded token store");
            entries
        } else {
            info!(path = %path.display(), "token file not found, starting empty");
            HashMap::new()
        };

        Ok(Self { path, entries })
    }
}

#[async_trait]
impl KeyValueStore for JsonFileStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    async fn get_timestamp(&self, key: &str) -> Result<Option<DateTime<Utc>>> {
        parse_timestamp(key, self.entries.get(key))
    }

    async fn set(&mut self, key: &str, value: String) -> Result<()> {
        self.entries.insert(key.to_owned(), value);
        Ok(())
    }

    async fn set_timestamp(&mut self, key: &str, value: DateTime<Utc>) -> Result<()> {
        self.entries.insert(key.to_owned(), value.to_rfc3339());
        Ok(())
    }

    async fn save(&mut self) -> Result<()> {
        write_atomic(&self.path, &self.entries).await
    }
}

fn parse_timestamp(key: &str, raw: Option<&String>) -> Result<Option<DateTime<Utc>>> {
    match raw {
        None => Ok(None),
        Some(s) => DateTime::parse_from_rfc3339(s)
            .map(|t| Some(t.with_timezone(&Utc)))
            .map_err(|e| Error::Persistence(format!("stored timestamp {key} is invalid: {e}"))),
    }
}

/// Write the store to a file atomically.
///
/// Writes to a temp file in the same directory, then renames it over the
/// target. Permissions are 0600 since the file holds OAuth tokens.
async fn write_atomic(path: &Path, entries: &HashMap<String, String>) -> Result<()> {
    let json = serde_json::to_string_pretty(entries)
        .map_err(|e| Error::Persistence(format!("serializing token store: {e}")))?;

    let dir = path
        .parent()
        .ok_or_else(|| Error::Persistence("token file path has no parent directory".into()))?;

    let tmp_path = dir.join(format!(".token.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Persistence(format!("writing temp token file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Persistence(format!("setting token file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Persistence(format!("renaming temp token file: {e}")))?;

    debug!(path = %path.display(), "persisted token store");
    Ok(())
}
