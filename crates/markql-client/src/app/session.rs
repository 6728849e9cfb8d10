//! Settings and session persistence.
//!
//! Two stores back the workbench: a durable key-value file holding the agent
//! token and the last query, and a non-durable session cache holding the most
//! recent snapshot. The session cache is advisory; callers treat write
//! failures as warnings.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use parking_lot::Mutex;

pub const KEY_TOKEN: &str = "markqlAgentToken";
pub const KEY_QUERY: &str = "markqlLastQuery";
pub const KEY_SNAPSHOT_HTML: &str = "markqlSnapshotHtml";
pub const KEY_SNAPSHOT_SCOPE: &str = "markqlSnapshotScope";
pub const LEGACY_KEY_TOKEN: &str = "xsqlAgentToken";
pub const LEGACY_KEY_QUERY: &str = "xsqlLastQuery";
pub const LEGACY_KEY_SNAPSHOT_HTML: &str = "xsqlSnapshotHtml";

const SETTINGS_DIR: &str = "markql";
const SETTINGS_FILE: &str = "settings.json";

/// Durable key-value settings that survive restarts.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// Session-scoped key-value cache, cleared when the process exits.
#[async_trait]
pub trait SessionCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    /// Write several entries at once; either all are stored or none.
    async fn set_many(&self, entries: &[(&str, &str)]) -> Result<()>;
}

/// Persists settings as a JSON object in a single file.
#[derive(Debug, Clone)]
pub struct FileSettingsStore {
    path: PathBuf,
}

impl FileSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store under the user's configuration directory.
    pub fn in_config_dir() -> Result<Self> {
        let base = dirs_next::config_dir()
            .ok_or_else(|| anyhow!("unable to determine configuration directory"))?;
        Ok(Self::new(base.join(SETTINGS_DIR).join(SETTINGS_FILE)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<BTreeMap<String, String>> {
        if !tokio::fs::try_exists(&self.path).await.unwrap_or(false) {
            return Ok(BTreeMap::new());
        }
        let data = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("failed to read settings file at {}", self.path.display()))?;
        serde_json::from_str(&data)
            .with_context(|| format!("invalid settings data in {}", self.path.display()))
    }
}

#[async_trait]
impl SettingsStore for FileSettingsStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.load().await?.remove(key))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self.load().await?;
        values.insert(key.to_string(), value.to_string());

        if let Some(dir) = self.path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("failed to create settings directory {}", dir.display()))?;
        }
        let data =
            serde_json::to_string_pretty(&values).context("failed to serialize settings")?;
        tokio::fs::write(&self.path, data)
            .await
            .with_context(|| format!("failed to write settings file to {}", self.path.display()))?;
        Ok(())
    }
}

/// In-memory settings, mostly for tests and one-shot CLI runs.
#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_values<'a>(entries: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let values = entries
            .into_iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        Self {
            values: Mutex::new(values),
        }
    }
}

#[async_trait]
impl SettingsStore for MemorySettingsStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.values.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// In-process session cache with a byte quota over all stored values.
#[derive(Debug)]
pub struct MemorySessionCache {
    quota_bytes: usize,
    values: Mutex<HashMap<String, String>>,
}

impl MemorySessionCache {
    pub fn new(quota_bytes: usize) -> Self {
        Self {
            quota_bytes,
            values: Mutex::new(HashMap::new()),
        }
    }

    pub fn quota_bytes(&self) -> usize {
        self.quota_bytes
    }
}

#[async_trait]
impl SessionCache for MemorySessionCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.lock().get(key).cloned())
    }

    async fn set_many(&self, entries: &[(&str, &str)]) -> Result<()> {
        let mut values = self.values.lock();
        let mut projected: usize = values
            .iter()
            .filter(|(key, _)| !entries.iter().any(|(k, _)| *k == key.as_str()))
            .map(|(key, value)| key.len() + value.len())
            .sum();
        projected += entries
            .iter()
            .map(|(key, value)| key.len() + value.len())
            .sum::<usize>();
        if projected > self.quota_bytes {
            return Err(anyhow!(
                "session cache quota exceeded ({projected} > {} bytes)",
                self.quota_bytes
            ));
        }
        for (key, value) in entries {
            values.insert((*key).to_string(), (*value).to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn file_store_round_trips_and_preserves_other_keys() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let store = FileSettingsStore::new(dir.path().join("nested/settings.json"));
        assert_eq!(store.get(KEY_TOKEN).await?, None);

        store.set(KEY_TOKEN, "secret").await?;
        store.set(KEY_QUERY, "SELECT a FROM doc").await?;

        let reopened = FileSettingsStore::new(store.path());
        assert_eq!(reopened.get(KEY_TOKEN).await?.as_deref(), Some("secret"));
        assert_eq!(
            reopened.get(KEY_QUERY).await?.as_deref(),
            Some("SELECT a FROM doc")
        );
        Ok(())
    }

    #[tokio::test]
    async fn corrupt_settings_file_is_an_error() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not json")?;
        assert!(FileSettingsStore::new(path).get(KEY_TOKEN).await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn session_cache_rejects_writes_over_quota() -> Result<()> {
        let cache = MemorySessionCache::new(64);
        cache
            .set_many(&[(KEY_SNAPSHOT_HTML, "<p>ok</p>"), (KEY_SNAPSHOT_SCOPE, "full")])
            .await?;

        let big = "x".repeat(100);
        assert!(cache.set_many(&[(KEY_SNAPSHOT_HTML, &big)]).await.is_err());
        assert_eq!(
            cache.get(KEY_SNAPSHOT_HTML).await?.as_deref(),
            Some("<p>ok</p>")
        );
        Ok(())
    }
}
