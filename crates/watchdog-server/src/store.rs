//! File-backed durable state store: one JSON snapshot per collection.

use async_trait::async_trait;
use common::Result;
use std::path::PathBuf;
use tracing::debug;
use watchdog::{PersistedState, StateStore};

/// Durable key-value store keeping each collection's snapshot as a
/// pretty-printed JSON file under one directory.
pub struct FileStateStore {
    dir: PathBuf,
}

impl FileStateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, state_key: &str) -> PathBuf {
        // Keys are derived from sheet titles; keep them filesystem-safe.
        let safe: String = state_key
            .chars()
            .map(|c| if matches!(c, '/' | '\\') { '_' } else { c })
            .collect();
        self.dir.join(format!("{safe}.json"))
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn load(&self, state_key: &str) -> Result<Option<PersistedState>> {
        let path = self.path_for(state_key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let state: PersistedState = serde_json::from_slice(&bytes)?;
                Ok(Some(state))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(key = state_key, "no persisted state yet");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn store(&self, state_key: &str, state: &PersistedState) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(state_key);
        let bytes = serde_json::to_vec_pretty(state)?;

        // Write-then-rename keeps the snapshot atomic: a crashed pass
        // never leaves a partial file behind.
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        debug!(key = state_key, bytes = bytes.len(), "state persisted");
        Ok(())
    }
}
