//! Upload guard and image storage.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use axum::body::Bytes;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("file extension '{extension}' is not allowed")]
    ExtensionNotAllowed { extension: String, allowed: Vec<String> },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Allow-list check applied to the client-supplied filename before anything
/// is written. Comparison ignores case.
#[derive(Debug, Clone)]
pub struct UploadGuard {
    allowed: Vec<String>,
}

impl UploadGuard {
    pub fn new<I, S>(allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            allowed: allowed
                .into_iter()
                .map(|ext| ext.as_ref().trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        }
    }

    /// Returns the lower-cased extension to store the file under.
    pub fn check_extension(&self, filename: &str) -> Result<String, StorageError> {
        let extension = Path::new(filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();

        if !extension.is_empty() && self.allowed.iter().any(|allowed| *allowed == extension) {
            Ok(extension)
        } else {
            Err(StorageError::ExtensionNotAllowed {
                extension,
                allowed: self.allowed.clone(),
            })
        }
    }
}

/// Where accepted uploads end up. Returned paths are what gets persisted on
/// the product record.
#[async_trait]
pub trait ImageStore: Send + Sync {
    async fn put(&self, extension: &str, bytes: Bytes) -> Result<String, StorageError>;

    /// Removing a path that no longer exists is not an error.
    async fn remove(&self, path: &str) -> Result<(), StorageError>;
}

fn generated_path(image_dir: &str, extension: &str) -> String {
    format!(
        "{}/{}.{}",
        image_dir.trim_end_matches('/'),
        Uuid::new_v4().simple(),
        extension
    )
}

/// Images written below a root directory on local disk.
pub struct LocalImageStore {
    root: PathBuf,
    image_dir: String,
}

impl LocalImageStore {
    pub fn new(root: impl Into<PathBuf>, image_dir: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            image_dir: image_dir.into(),
        }
    }
}

#[async_trait]
impl ImageStore for LocalImageStore {
    async fn put(&self, extension: &str, bytes: Bytes) -> Result<String, StorageError> {
        let relative = generated_path(&self.image_dir, extension);
        let target = self.root.join(&relative);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, &bytes).await?;

        tracing::debug!("Stored {} bytes at {}", bytes.len(), target.display());
        Ok(relative)
    }

    async fn remove(&self, path: &str) -> Result<(), StorageError> {
        match tokio::fs::remove_file(self.root.join(path)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Process-local image store for development runs and tests.
pub struct MemoryImageStore {
    image_dir: String,
    files: RwLock<HashMap<String, Bytes>>,
}

impl MemoryImageStore {
    pub fn new(image_dir: impl Into<String>) -> Self {
        Self {
            image_dir: image_dir.into(),
            files: RwLock::new(HashMap::new()),
        }
    }

    pub async fn contains(&self, path: &str) -> bool {
        self.files.read().await.contains_key(path)
    }

    pub async fn len(&self) -> usize {
        self.files.read().await.len()
    }
}

impl Default for MemoryImageStore {
    fn default() -> Self {
        Self::new("public/images")
    }
}

#[async_trait]
impl ImageStore for MemoryImageStore {
    async fn put(&self, extension: &str, bytes: Bytes) -> Result<String, StorageError> {
        let path = generated_path(&self.image_dir, extension);
        self.files.write().await.insert(path.clone(), bytes);
        Ok(path)
    }

    async fn remove(&self, path: &str) -> Result<(), StorageError> {
        self.files.write().await.remove(path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard() -> UploadGuard {
        UploadGuard::new(["jpg", "png"])
    }

    #[test]
    fn accepts_listed_extensions_in_any_case() {
        assert_eq!(guard().check_extension("photo.png").unwrap(), "png");
        assert_eq!(guard().check_extension("PHOTO.JPG").unwrap(), "jpg");
        assert_eq!(guard().check_extension("archive.tar.png").unwrap(), "png");
    }

    #[test]
    fn rejects_unlisted_and_missing_extensions() {
        match guard().check_extension("setup.exe") {
            Err(StorageError::ExtensionNotAllowed { extension, allowed }) => {
                assert_eq!(extension, "exe");
                assert_eq!(allowed, vec!["jpg", "png"]);
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(guard().check_extension("README").is_err());
        assert!(guard().check_extension(".png").is_err());
    }

    #[test]
    fn allow_list_is_normalized() {
        let guard = UploadGuard::new([".PNG", "Jpg"]);
        assert_eq!(guard.check_extension("a.png").unwrap(), "png");
        match guard.check_extension("a.gif") {
            Err(StorageError::ExtensionNotAllowed { allowed, .. }) => assert_eq!(allowed, vec!["png", "jpg"]),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn local_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalImageStore::new(dir.path(), "public/images");

        let path = store.put("png", Bytes::from_static(b"\x89PNG")).await.unwrap();
        assert!(path.starts_with("public/images/"));
        assert!(path.ends_with(".png"));
        assert!(dir.path().join(&path).exists());

        store.remove(&path).await.unwrap();
        assert!(!dir.path().join(&path).exists());
        // second removal is a no-op
        store.remove(&path).await.unwrap();
    }

    #[tokio::test]
    async fn memory_store_tracks_files() {
        let store = MemoryImageStore::default();
        let path = store.put("jpg", Bytes::from_static(b"jpeg")).await.unwrap();
        assert!(store.contains(&path).await);

        store.remove(&path).await.unwrap();
        assert_eq!(store.len().await, 0);
    }
}
