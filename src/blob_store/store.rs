/// Note file storage with upload metadata and signed downloads
use crate::{
    blob_store::BlobBackend,
    error::{MarketError, MarketResult},
};
use chrono::{DateTime, Utc};
use image::ImageFormat;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use std::sync::Arc;
use uuid::Uuid;

/// Longest edge of generated preview thumbnails
pub const THUMBNAIL_MAX_EDGE: u32 = 320;

const DOWNLOAD_AUDIENCE: &str = "notemart-download";

const PDF_MAGIC: &[u8] = b"%PDF-";

const PREVIEW_CONTENT_TYPES: &[&str] = &["image/png", "image/jpeg", "image/webp"];

/// Settings for [`NoteStorage`]
#[derive(Debug, Clone)]
pub struct StorageSettings {
    pub upload_limit: usize,
    /// Base URL download links are built on
    pub public_url: String,
    pub signing_secret: String,
}

/// Metadata row for a stored object
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRecord {
    pub key: String,
    pub content_type: String,
    pub size: i64,
    pub sha256: String,
    pub creator_id: String,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
}

impl UploadRecord {
    pub fn is_pdf(&self) -> bool {
        self.content_type == "application/pdf"
    }

    pub fn is_preview_image(&self) -> bool {
        PREVIEW_CONTENT_TYPES.contains(&self.content_type.as_str())
    }

    fn from_row(row: &SqliteRow) -> MarketResult<Self> {
        Ok(Self {
            key: row.try_get("key")?,
            content_type: row.try_get("content_type")?,
            size: row.try_get("size")?,
            sha256: row.try_get("sha256")?,
            creator_id: row.try_get("creator_id")?,
            is_public: row.try_get("is_public")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

/// Claims carried by a download link token
#[derive(Debug, Serialize, Deserialize)]
struct DownloadClaims {
    key: String,
    aud: String,
    iat: i64,
    exp: i64,
}

/// Storage facade used by the rest of the service
#[derive(Clone)]
pub struct NoteStorage {
    backend: Arc<dyn BlobBackend>,
    db: SqlitePool,
    settings: StorageSettings,
}

impl NoteStorage {
    pub fn new(backend: Arc<dyn BlobBackend>, db: SqlitePool, settings: StorageSettings) -> Self {
        Self {
            backend,
            db,
            settings,
        }
    }

    /// Store an uploaded PDF or preview image and record its metadata.
    /// Preview images are public; PDFs are only reachable with a signed link.
    pub async fn upload(
        &self,
        creator_id: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> MarketResult<UploadRecord> {
        let content_type = normalize_content_type(content_type);

        if data.is_empty() {
            return Err(MarketError::InvalidInput("Upload is empty".to_string()));
        }
        if data.len() > self.settings.upload_limit {
            return Err(MarketError::InvalidInput(format!(
                "Upload size {} exceeds maximum of {} bytes",
                data.len(),
                self.settings.upload_limit
            )));
        }

        let is_public = if content_type == "application/pdf" {
            if !data.starts_with(PDF_MAGIC) {
                return Err(MarketError::InvalidInput(
                    "File does not look like a PDF document".to_string(),
                ));
            }
            false
        } else if PREVIEW_CONTENT_TYPES.contains(&content_type.as_str()) {
            true
        } else {
            return Err(MarketError::InvalidInput(format!(
                "Unsupported content type: {}",
                content_type
            )));
        };

        self.store(creator_id, data, &content_type, is_public).await
    }

    async fn store(
        &self,
        creator_id: &str,
        data: Vec<u8>,
        content_type: &str,
        is_public: bool,
    ) -> MarketResult<UploadRecord> {
        let key = Uuid::new_v4().to_string();
        let sha256 = hex::encode(Sha256::digest(&data));
        let size = data.len() as i64;

        self.backend.put(&key, data, content_type).await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO upload (key, content_type, size, sha256, creator_id, is_public, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&key)
        .bind(content_type)
        .bind(size)
        .bind(&sha256)
        .bind(creator_id)
        .bind(is_public)
        .bind(Utc::now())
        .execute(&self.db)
        .await;

        if let Err(e) = inserted {
            // Metadata is the source of truth; drop the orphaned bytes
            if let Err(cleanup) = self.backend.delete(&key).await {
                tracing::warn!(key = %key, error = %cleanup, "Failed to remove blob after metadata error");
            }
            return Err(e.into());
        }

        tracing::debug!(key = %key, content_type, size, "Stored upload");

        self.get_metadata(&key)
            .await?
            .ok_or_else(|| MarketError::Internal("Upload metadata vanished".to_string()))
    }

    pub async fn get_metadata(&self, key: &str) -> MarketResult<Option<UploadRecord>> {
        let row = sqlx::query(
            "SELECT key, content_type, size, sha256, creator_id, is_public, created_at FROM upload WHERE key = ?1",
        )
        .bind(key)
        .fetch_optional(&self.db)
        .await?;

        row.as_ref().map(UploadRecord::from_row).transpose()
    }

    /// Fetch bytes with their metadata
    pub async fn get(&self, key: &str) -> MarketResult<Option<(Vec<u8>, UploadRecord)>> {
        let Some(record) = self.get_metadata(key).await? else {
            return Ok(None);
        };

        match self.backend.get(key).await? {
            Some(data) => Ok(Some((data, record))),
            None => {
                tracing::warn!(key, "Upload metadata present but blob missing");
                Ok(None)
            }
        }
    }

    /// Delete bytes and metadata
    pub async fn delete(&self, key: &str) -> MarketResult<()> {
        self.backend.delete(key).await?;
        sqlx::query("DELETE FROM upload WHERE key = ?1")
            .bind(key)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    /// Render a public JPEG thumbnail of a stored preview image.
    /// Returns `None` when the image cannot be decoded or encoded.
    pub async fn create_thumbnail(&self, preview_key: &str) -> MarketResult<Option<String>> {
        let Some((data, record)) = self.get(preview_key).await? else {
            return Ok(None);
        };

        let thumbnail = tokio::task::spawn_blocking(move || generate_thumbnail(&data))
            .await
            .map_err(|e| MarketError::Internal(format!("Thumbnail task failed: {}", e)))?;

        match thumbnail {
            Some(bytes) => {
                let stored = self
                    .store(&record.creator_id, bytes, "image/jpeg", true)
                    .await?;
                Ok(Some(stored.key))
            }
            None => Ok(None),
        }
    }

    /// Time-limited link to a private object
    pub fn signed_download_url(&self, key: &str, ttl_secs: u64) -> MarketResult<String> {
        let now = Utc::now().timestamp();
        let claims = DownloadClaims {
            key: key.to_string(),
            aud: DOWNLOAD_AUDIENCE.to_string(),
            iat: now,
            exp: now + ttl_secs as i64,
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.settings.signing_secret.as_bytes()),
        )
        .map_err(|e| MarketError::Internal(format!("Failed to sign download token: {}", e)))?;

        Ok(format!(
            "{}/files/{}?token={}",
            self.settings.public_url.trim_end_matches('/'),
            key,
            token
        ))
    }

    /// Check that a download token is valid for exactly this key
    pub fn verify_download_token(&self, key: &str, token: &str) -> MarketResult<()> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[DOWNLOAD_AUDIENCE]);

        let data = decode::<DownloadClaims>(
            token,
            &DecodingKey::from_secret(self.settings.signing_secret.as_bytes()),
            &validation,
        )
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                MarketError::Forbidden("Download link has expired".to_string())
            }
            _ => MarketError::Forbidden("Invalid download link".to_string()),
        })?;

        if data.claims.key != key {
            return Err(MarketError::Forbidden("Invalid download link".to_string()));
        }
        Ok(())
    }

    /// Uploads older than `ttl_hours` that no note references
    pub async fn list_orphaned_uploads(&self, ttl_hours: i64) -> MarketResult<Vec<String>> {
        let cutoff = Utc::now() - chrono::Duration::hours(ttl_hours);

        let rows = sqlx::query(
            r#"
            SELECT u.key FROM upload u
            WHERE u.created_at < ?1
              AND NOT EXISTS (
                  SELECT 1 FROM note n
                  WHERE n.file_key = u.key OR n.preview_key = u.key OR n.thumbnail_key = u.key
              )
            ORDER BY u.created_at ASC
            "#,
        )
        .bind(cutoff)
        .fetch_all(&self.db)
        .await?;

        let mut keys = Vec::with_capacity(rows.len());
        for row in rows {
            keys.push(row.try_get("key")?);
        }
        Ok(keys)
    }
}

fn normalize_content_type(raw: &str) -> String {
    let base = raw.split(';').next().unwrap_or("").trim().to_lowercase();
    match base.as_str() {
        "image/jpg" => "image/jpeg".to_string(),
        _ => base,
    }
}

fn generate_thumbnail(data: &[u8]) -> Option<Vec<u8>> {
    match image::load_from_memory(data) {
        Ok(img) => {
            let thumb = img.thumbnail(THUMBNAIL_MAX_EDGE, THUMBNAIL_MAX_EDGE).to_rgb8();
            let mut buf = Vec::new();
            let mut cursor = std::io::Cursor::new(&mut buf);

            match thumb.write_to(&mut cursor, ImageFormat::Jpeg) {
                Ok(_) => Some(buf),
                Err(e) => {
                    tracing::warn!("Failed to encode thumbnail: {}", e);
                    None
                }
            }
        }
        Err(e) => {
            tracing::warn!("Failed to decode preview image: {}", e);
            None
        }
    }
}
