//! Snapshot persistence between invocations.
//!
//! A breaker only lives as long as the process that built it. Stores carry
//! its exported state to the next process.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tripwire_core::BreakerState;

/// Somewhere to keep a breaker snapshot.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// The stored snapshot, or `None` if nothing has been saved yet.
    async fn load(&self) -> Result<Option<BreakerState>>;

    /// Replace the stored snapshot.
    async fn save(&self, state: &BreakerState) -> Result<()>;
}

/// JSON file store.
///
/// Writes go to a sibling temp file first and are renamed into place, so a
/// crash mid-write leaves the previous snapshot intact.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl SnapshotStore for FileStore {
    async fn load(&self) -> Result<Option<BreakerState>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("reading {}", self.path.display()))
            }
        };

        if content.trim().is_empty() {
            return Ok(None);
        }

        let state = BreakerState::from_json(&content)
            .with_context(|| format!("parsing snapshot {}", self.path.display()))?;
        Ok(Some(state))
    }

    async fn save(&self, state: &BreakerState) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating {}", parent.display()))?;
        }

        let json = serde_json::to_string_pretty(state)?;
        let temp = self.temp_path();
        tokio::fs::write(&temp, json)
            .await
            .with_context(|| format!("writing {}", temp.display()))?;
        tokio::fs::rename(&temp, &self.path)
            .await
            .with_context(|| format!("replacing {}", self.path.display()))?;

        tracing::debug!(path = %self.path.display(), phase = %state.phase, "Snapshot saved");
        Ok(())
    }
}

/// In-process store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<Option<BreakerState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    async fn load(&self) -> Result<Option<BreakerState>> {
        Ok(*self.state.lock().await)
    }

    async fn save(&self, state: &BreakerState) -> Result<()> {
        *self.state.lock().await = Some(*state);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tripwire_core::Phase;

    fn scratch_dir(test: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("tripwire-{}-{}", test, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    fn open_state() -> BreakerState {
        BreakerState {
            phase: Phase::Open,
            failure_count: 3,
            success_count: 2,
            first_failure_time: Some(1_000),
            last_failure_time: Some(1_200),
            next_attempt: Some(31_200),
        }
    }

    #[tokio::test]
    async fn test_file_store_missing_file_is_empty() {
        let store = FileStore::new(scratch_dir("missing").join("state.json"));
        assert_eq!(store.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_file_store_round_trip() {
        let dir = scratch_dir("round-trip");
        let store = FileStore::new(dir.join("nested").join("state.json"));

        store.save(&open_state()).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(open_state()));
        assert!(!store.temp_path().exists());

        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn test_file_store_rejects_garbage() {
        let dir = scratch_dir("garbage");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("state.json");
        std::fs::write(&path, "not json").unwrap();

        let err = FileStore::new(&path).load().await.unwrap_err();
        assert!(err.to_string().contains("parsing snapshot"));

        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryStore::new();
        assert_eq!(store.load().await.unwrap(), None);

        store.save(&open_state()).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(open_state()));
    }
}
