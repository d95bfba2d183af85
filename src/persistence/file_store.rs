//! JSON file snapshot store with atomic replace.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::error::PersistenceError;
use crate::persistence::{Snapshot, StateStore};

/// Stores the snapshot as pretty-printed JSON at a fixed path.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn dir(&self) -> PathBuf {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    /// Sibling temp path, unique per process and call.
    fn temp_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "state.json".to_string());
        self.dir().join(format!(
            ".{name}.{}.{}.tmp",
            std::process::id(),
            Uuid::new_v4().simple()
        ))
    }
}

#[async_trait]
impl StateStore for FileStore {
    async fn load(&self) -> Snapshot {
        let raw = match fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "No state snapshot; starting empty");
                return Snapshot::default();
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Unreadable state snapshot; starting empty");
                return Snapshot::default();
            }
        };

        match serde_json::from_slice(&raw) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Corrupt state snapshot; starting empty");
                Snapshot::default()
            }
        }
    }

    async fn save(&self, snapshot: &Snapshot) -> Result<(), PersistenceError> {
        let body = serde_json::to_vec_pretty(snapshot)?;
        let dir = self.dir();
        fs::create_dir_all(&dir)
            .await
            .map_err(|source| PersistenceError::Io { path: dir, source })?;

        let tmp = self.temp_path();
        if let Err(source) = write_synced(&tmp, &body).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(PersistenceError::Io { path: tmp, source });
        }
        if let Err(source) = fs::rename(&tmp, &self.path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(PersistenceError::Io {
                path: self.path.clone(),
                source,
            });
        }
        Ok(())
    }
}

async fn write_synced(path: &Path, body: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(path).await?;
    file.write_all(body).await?;
    file.sync_all().await
}
