use anyhow::{Context, Result};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

/// Durable key-value collaborator
///
/// Values are opaque strings; callers own the encoding.
#[async_trait::async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a value, `None` when the key was never written or was removed
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Overwrite the value stored under `key`
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Delete `key`; deleting a missing key is not an error
    async fn remove(&self, key: &str) -> Result<()>;
}

/// One JSON file per key inside a directory
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty() || key.contains(['/', '\\']) || key.starts_with('.') {
            anyhow::bail!("Invalid store key: {:?}", key);
        }
        Ok(self.dir.join(format!("{}.json", key)))
    }
}

#[async_trait::async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key)?;
        tokio::fs::create_dir_all(&self.dir)
            .await
            .context("Failed to create store directory")?;

        // Write then rename so a crash never leaves a half-written value
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, value)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("Failed to replace {}", path.display()))?;

        debug!("Stored {} bytes under {}", value.len(), key);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to remove {}", path.display())),
        }
    }
}

/// Process-local store, used by tests and dry runs
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.values
            .lock()
            .map_err(|_| anyhow::anyhow!("Memory store lock poisoned"))
    }
}

#[async_trait::async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.lock()?.remove(key);
        Ok(())
    }
}
