use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("blob not found: {0}")]
    NotFound(String),
    #[error("invalid blob path: {0}")]
    InvalidPath(String),
}

/// Object storage seam. Paths are forward-slash relative keys shaped as
/// `{project_id}/{document_id}/{file_name}`.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store bytes under `path` and return the public URL.
    async fn put(&self, path: &str, bytes: &[u8]) -> Result<String, BlobError>;

    async fn get(&self, path: &str) -> Result<Vec<u8>, BlobError>;

    fn public_url(&self, path: &str) -> String;
}

fn validate_key(path: &str) -> Result<(), BlobError> {
    if path.is_empty() || path.starts_with('/') || path.split('/').any(|seg| seg == "..") {
        return Err(BlobError::InvalidPath(path.to_string()));
    }
    Ok(())
}

/// Filesystem-backed store rooted at a local directory.
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, BlobError> {
        validate_key(path)?;
        Ok(self.root.join(Path::new(path)))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(&self, path: &str, bytes: &[u8]) -> Result<String, BlobError> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&full, bytes).await?;
        Ok(self.public_url(path))
    }

    async fn get(&self, path: &str) -> Result<Vec<u8>, BlobError> {
        let full = self.resolve(path)?;
        match tokio::fs::read(&full).await {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(BlobError::NotFound(path.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    fn public_url(&self, path: &str) -> String {
        format!("file://{}/{}", self.root.display(), path)
    }
}

/// In-memory store for tests. `fail_puts` forces every `put` to error so the
/// upload failure path is exercisable.
#[derive(Default)]
pub struct MemoryBlobStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    pub fail_puts: bool,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
            fail_puts: true,
        }
    }

    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, path: &str, bytes: &[u8]) -> Result<String, BlobError> {
        validate_key(path)?;
        if self.fail_puts {
            return Err(BlobError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "simulated storage outage",
            )));
        }
        self.objects
            .lock()
            .unwrap()
            .insert(path.to_string(), bytes.to_vec());
        Ok(self.public_url(path))
    }

    async fn get(&self, path: &str) -> Result<Vec<u8>, BlobError> {
        validate_key(path)?;
        self.objects
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| BlobError::NotFound(path.to_string()))
    }

    fn public_url(&self, path: &str) -> String {
        format!("memory://{path}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn local_store_round_trips_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path());

        let url = store.put("p1/d1/resume.txt", b"hello").await.unwrap();
        assert!(url.starts_with("file://"));
        assert_eq!(store.get("p1/d1/resume.txt").await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn local_store_reports_missing_blob() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path());

        let err = store.get("p1/d1/missing.txt").await.unwrap_err();
        assert!(matches!(err, BlobError::NotFound(_)));
    }

    #[tokio::test]
    async fn rejects_traversal_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path());

        let err = store.put("../escape.txt", b"x").await.unwrap_err();
        assert!(matches!(err, BlobError::InvalidPath(_)));

        let err = store.get("/absolute").await.unwrap_err();
        assert!(matches!(err, BlobError::InvalidPath(_)));
    }

    #[tokio::test]
    async fn memory_store_can_simulate_outage() {
        let store = MemoryBlobStore::failing();
        let err = store.put("p/d/f.txt", b"x").await.unwrap_err();
        assert!(matches!(err, BlobError::Io(_)));
        assert!(store.is_empty());
    }
}
