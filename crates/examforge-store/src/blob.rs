//! Filesystem document storage.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use examforge_core::error::{ExamError, Result};
use examforge_core::traits::BlobStore;

/// Stores blobs as files under a root directory. Storage paths are relative,
/// `/`-separated and never leave the root.
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a storage path onto the filesystem, rejecting anything that could
    /// escape the root.
    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path);
        let mut resolved = self.root.clone();
        let mut parts = 0;
        for component in relative.components() {
            match component {
                Component::Normal(part) => {
                    resolved.push(part);
                    parts += 1;
                }
                _ => {
                    return Err(ExamError::Blob(format!("invalid storage path {path:?}")));
                }
            }
        }
        if parts == 0 {
            return Err(ExamError::Blob(format!("invalid storage path {path:?}")));
        }
        Ok(resolved)
    }
}

/// Reduce a suggested name to safe path segments.
fn sanitize(suggested: &str) -> Result<String> {
    let segments: Vec<String> = suggested
        .split(['/', '\\'])
        .filter(|s| !s.is_empty() && *s != ".")
        .map(|segment| {
            if segment == ".." {
                return Err(ExamError::Blob(format!(
                    "path traversal in {suggested:?}"
                )));
            }
            Ok(segment
                .chars()
                .map(|c| {
                    if c.is_alphanumeric() || matches!(c, '.' | '-' | '_') {
                        c
                    } else {
                        '_'
                    }
                })
                .collect::<String>())
        })
        .collect::<Result<_>>()?;
    if segments.is_empty() {
        return Err(ExamError::Blob(format!("invalid blob name {suggested:?}")));
    }
    Ok(segments.join("/"))
}

fn blob_err(path: &str, e: std::io::Error) -> ExamError {
    ExamError::Blob(format!("{path}: {e}"))
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn save(&self, bytes: &[u8], suggested_name: &str) -> Result<String> {
        let name = sanitize(suggested_name)?;
        let target = self.resolve(&name)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| blob_err(&name, e))?;
        }

        // Never overwrite an existing blob.
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)
            .await
            .map_err(|e| blob_err(&name, e))?;
        file.write_all(bytes).await.map_err(|e| blob_err(&name, e))?;
        file.sync_all().await.map_err(|e| blob_err(&name, e))?;

        debug!(path = %name, bytes = bytes.len(), "blob saved");
        Ok(name)
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let target = self.resolve(path)?;
        tokio::fs::read(&target).await.map_err(|e| blob_err(path, e))
    }

    async fn remove(&self, path: &str) -> Result<()> {
        let target = self.resolve(path)?;
        match tokio::fs::remove_file(&target).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(blob_err(path, e)),
        }
        // Drop the per-exam directory once it is empty; failure just means
        // it still holds files.
        if let Some(parent) = target.parent().filter(|p| *p != self.root) {
            let _ = tokio::fs::remove_dir(parent).await;
        }
        Ok(())
    }
}
