/// Disk-based blob storage backend
use crate::{
    blob_store::BlobBackend,
    error::{MarketError, MarketResult},
};
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::fs;

/// Disk storage backend
///
/// Files are sharded into subdirectories by the first two characters of
/// their key: `{base}/{key[0..2]}/{key}`.
#[derive(Clone)]
pub struct DiskBlobBackend {
    base_path: PathBuf,
}

impl DiskBlobBackend {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn blob_path(&self, key: &str) -> MarketResult<PathBuf> {
        // Keys are server generated uuids; anything else must not reach the filesystem
        if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(MarketError::InvalidInput(format!("Invalid storage key '{}'", key)));
        }
        if key.len() >= 2 {
            Ok(self.base_path.join(&key[0..2]).join(key))
        } else {
            Ok(self.base_path.join("_").join(key))
        }
    }
}

#[async_trait]
impl BlobBackend for DiskBlobBackend {
    async fn put(&self, key: &str, data: Vec<u8>, _content_type: &str) -> MarketResult<()> {
        let path = self.blob_path(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                MarketError::Storage(format!("Failed to create blob directory: {}", e))
            })?;
        }

        fs::write(&path, data)
            .await
            .map_err(|e| MarketError::Storage(format!("Failed to write blob {}: {}", key, e)))
    }

    async fn get(&self, key: &str) -> MarketResult<Option<Vec<u8>>> {
        match fs::read(self.blob_path(key)?).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(MarketError::Storage(format!("Failed to read blob {}: {}", key, e))),
        }
    }

    async fn delete(&self, key: &str) -> MarketResult<()> {
        match fs::remove_file(self.blob_path(key)?).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(MarketError::Storage(format!("Failed to delete blob {}: {}", key, e))),
        }
    }

    async fn exists(&self, key: &str) -> MarketResult<bool> {
        Ok(fs::try_exists(self.blob_path(key)?).await.unwrap_or(false))
    }

    async fn size(&self, key: &str) -> MarketResult<Option<u64>> {
        match fs::metadata(self.blob_path(key)?).await {
            Ok(metadata) => Ok(Some(metadata.len())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(MarketError::Storage(format!("Failed to stat blob {}: {}", key, e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_put_get_delete() {
        let dir = tempdir().unwrap();
        let backend = DiskBlobBackend::new(dir.path().to_path_buf());
        let key = "3f2a9c1e-0000-4000-8000-000000000001";

        backend.put(key, b"%PDF-1.7".to_vec(), "application/pdf").await.unwrap();
        assert_eq!(backend.get(key).await.unwrap(), Some(b"%PDF-1.7".to_vec()));
        assert_eq!(backend.size(key).await.unwrap(), Some(8));
        assert!(backend.exists(key).await.unwrap());

        backend.delete(key).await.unwrap();
        assert!(!backend.exists(key).await.unwrap());
        assert_eq!(backend.get(key).await.unwrap(), None);
        backend.delete(key).await.unwrap();
    }

    #[tokio::test]
    async fn test_sharded_layout() {
        let dir = tempdir().unwrap();
        let backend = DiskBlobBackend::new(dir.path().to_path_buf());

        let path = backend.blob_path("ab12").unwrap();
        assert!(path.to_string_lossy().contains("/ab/"));
    }

    #[tokio::test]
    async fn test_rejects_path_traversal() {
        let dir = tempdir().unwrap();
        let backend = DiskBlobBackend::new(dir.path().to_path_buf());

        assert!(backend.get("../etc/passwd").await.is_err());
        assert!(backend.put("a/b", vec![1], "image/png").await.is_err());
    }
}
