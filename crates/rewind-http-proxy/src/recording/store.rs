//! Recording store for proxy responses.
//!
//! Recordings live at `<root>/<target>-api/<key>.json`. Writes land in a
//! temporary sibling file which is then renamed over the final path, so
//! readers only ever see complete files. Concurrent writers of the same key
//! race and the last rename wins.

use super::key::{build_key, RecordingKey};
use super::types::Recording;
use crate::error::StoreError;
use crate::proxy::ApiTarget;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

/// Persistence for recordings.
#[async_trait]
pub trait RecordingStore: Send + Sync {
    /// Persist a recording, overwriting any previous one with the same key.
    async fn save(&self, target: ApiTarget, recording: &Recording) -> Result<PathBuf, StoreError>;

    /// Load a recording. Missing and malformed files are both `None`.
    async fn load(
        &self,
        target: ApiTarget,
        endpoint: &str,
        method: &str,
        request_body: Option<&serde_json::Value>,
    ) -> Option<Recording>;

    async fn exists(
        &self,
        target: ApiTarget,
        endpoint: &str,
        method: &str,
        request_body: Option<&serde_json::Value>,
    ) -> bool {
        self.load(target, endpoint, method, request_body)
            .await
            .is_some()
    }
}

/// Filesystem-backed store rooted at the recordings directory.
#[derive(Debug)]
pub struct FileRecordingStore {
    root: PathBuf,
    tmp_counter: AtomicU64,
}

impl FileRecordingStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            tmp_counter: AtomicU64::new(0),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute location of a key under this store.
    pub fn path_for(&self, key: &RecordingKey) -> PathBuf {
        self.root.join(key.relative_path())
    }

    fn tmp_path_for(&self, path: &Path) -> PathBuf {
        let n = self.tmp_counter.fetch_add(1, Ordering::Relaxed);
        let mut name = path
            .file_name()
            .map(|f| f.to_os_string())
            .unwrap_or_default();
        name.push(format!(".{}.{}.tmp", std::process::id(), n));
        path.with_file_name(name)
    }
}

#[async_trait]
impl RecordingStore for FileRecordingStore {
    async fn save(&self, target: ApiTarget, recording: &Recording) -> Result<PathBuf, StoreError> {
        let key = build_key(
            target,
            &recording.endpoint,
            &recording.method,
            recording.request_body.as_ref(),
        );
        let path = self.path_for(&key);
        let json = serde_json::to_vec_pretty(recording)?;

        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|source| StoreError::Write {
                    path: dir.to_path_buf(),
                    source,
                })?;
        }

        let tmp = self.tmp_path_for(&path);
        if let Err(source) = tokio::fs::write(&tmp, &json).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(StoreError::Write { path, source });
        }
        if let Err(source) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(StoreError::Write { path, source });
        }

        debug!("Saved recording {} ({} bytes)", key, json.len());
        Ok(path)
    }

    async fn load(
        &self,
        target: ApiTarget,
        endpoint: &str,
        method: &str,
        request_body: Option<&serde_json::Value>,
    ) -> Option<Recording> {
        let key = build_key(target, endpoint, method, request_body);
        let path = self.path_for(&key);

        let contents = match tokio::fs::read(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No recording at {:?}", path);
                return None;
            }
            Err(e) => {
                warn!("Failed to read recording {:?}: {}", path, e);
                return None;
            }
        };

        match serde_json::from_slice(&contents) {
            Ok(recording) => Some(recording),
            Err(e) => {
                warn!("Ignoring malformed recording {:?}: {}", path, e);
                None
            }
        }
    }
}
