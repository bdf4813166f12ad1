/// Object storage for note files and preview images
///
/// Bytes live in a [`BlobBackend`]; [`NoteStorage`] layers upload metadata,
/// content checks, thumbnails and signed download links on top.

pub mod disk;
pub mod store;

pub use disk::DiskBlobBackend;
pub use store::{NoteStorage, StorageSettings, UploadRecord};

use crate::error::MarketResult;
use async_trait::async_trait;

/// Blob storage backend trait
///
/// Implementations handle the actual storage and retrieval of bytes by key.
#[async_trait]
pub trait BlobBackend: Send + Sync {
    /// Store bytes under a key
    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> MarketResult<()>;

    /// Retrieve bytes by key
    async fn get(&self, key: &str) -> MarketResult<Option<Vec<u8>>>;

    /// Delete by key; deleting a missing key is not an error
    async fn delete(&self, key: &str) -> MarketResult<()>;

    /// Check if a key exists
    async fn exists(&self, key: &str) -> MarketResult<bool>;

    /// Get the stored size in bytes
    async fn size(&self, key: &str) -> MarketResult<Option<u64>>;
}
