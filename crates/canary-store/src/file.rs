use std::path::{Path, PathBuf};

use async_trait::async_trait;
use canary_protocol::{CanaryError, CanaryResult, StoreBackend, StoreDocument};
use tokio::fs;
use tracing::{debug, instrument};

/// The store document as one pretty-printed JSON file.
///
/// Saves go to a sibling temporary file that is renamed over the target, so
/// a crash mid-write leaves the previous document intact.
#[derive(Debug, Clone)]
pub struct FileStoreBackend {
    path: PathBuf,
}

impl FileStoreBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    async fn ensure_parent(path: &Path) -> CanaryResult<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).await.map_err(|error| {
                CanaryError::Store(format!("failed to create store dir {parent:?}: {error}"))
            })?;
        }
        Ok(())
    }
}

#[async_trait]
impl StoreBackend for FileStoreBackend {
    #[instrument(skip(self), fields(path = %self.path.display()))]
    async fn load(&self) -> CanaryResult<StoreDocument> {
        if !fs::try_exists(&self.path).await.unwrap_or(false) {
            debug!("no store document yet");
            return Ok(StoreDocument::default());
        }

        let raw = fs::read(&self.path).await.map_err(|error| {
            CanaryError::Store(format!("failed reading store {:?}: {error}", self.path))
        })?;
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Ok(StoreDocument::default());
        }

        let document: StoreDocument = serde_json::from_slice(&raw).map_err(|error| {
            CanaryError::Serialization(format!("failed parsing store {:?}: {error}", self.path))
        })?;
        debug!(total_messages = document.total_messages, "store document loaded");
        Ok(document)
    }

    #[instrument(skip(self, document), fields(path = %self.path.display()))]
    async fn save(&self, document: &StoreDocument) -> CanaryResult<()> {
        Self::ensure_parent(&self.path).await?;

        let payload = serde_json::to_vec_pretty(document)?;
        let temp_path = self.temp_path();
        fs::write(&temp_path, payload).await.map_err(|error| {
            CanaryError::Store(format!("failed writing store {temp_path:?}: {error}"))
        })?;
        fs::rename(&temp_path, &self.path).await.map_err(|error| {
            CanaryError::Store(format!("failed replacing store {:?}: {error}", self.path))
        })?;
        debug!("store document saved");
        Ok(())
    }
}
