/// Note moderation
///
/// A Pending note is approved or rejected exactly once. The note and its
/// submission record are written in the same transaction with one
/// review timestamp.
use crate::{
    admin::{Decision, ReviewStatus},
    blob_store::NoteStorage,
    catalog::{
        manager::{note_from_row, submission_from_row},
        CatalogManager, Note, Submission,
    },
    error::{MarketError, MarketResult},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

/// Admin's verdict on a submitted note
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveNoteRequest {
    pub decision: String,
    pub feedback: Option<String>,
    /// Stored image upload to show buyers before purchase
    pub preview_key: Option<String>,
}

/// Note and submission after resolution
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteResolution {
    pub note: Note,
    pub submission: Submission,
}

#[derive(Clone)]
pub struct ModerationManager {
    db: SqlitePool,
    catalog: CatalogManager,
    storage: NoteStorage,
}

impl ModerationManager {
    pub fn new(db: SqlitePool, catalog: CatalogManager, storage: NoteStorage) -> Self {
        Self {
            db,
            catalog,
            storage,
        }
    }

    /// Approve or reject a Pending note
    pub async fn resolve_note(
        &self,
        note_id: &str,
        decision: Decision,
        feedback: Option<String>,
        preview_key: Option<String>,
    ) -> MarketResult<NoteResolution> {
        let feedback = feedback.map(|f| f.trim().to_string()).filter(|f| !f.is_empty());

        let note = self.catalog.get_note(note_id).await?;
        if note.status != ReviewStatus::Pending {
            return Err(already_resolved(&note));
        }

        // Previews only matter for listings that become visible
        let preview_key = match (decision, preview_key) {
            (Decision::Approved, Some(key)) => {
                let upload = self.storage.get_metadata(&key).await?.ok_or_else(|| {
                    MarketError::InvalidInput("Unknown preview key".to_string())
                })?;
                if !upload.is_preview_image() {
                    return Err(MarketError::InvalidInput(
                        "Preview must be a PNG, JPEG or WebP image".to_string(),
                    ));
                }
                Some(key)
            }
            _ => None,
        };

        let thumbnail_key = match &preview_key {
            Some(key) => match self.storage.create_thumbnail(key).await {
                Ok(thumb) => thumb,
                Err(e) => {
                    tracing::warn!(note_id, error = %e, "Thumbnail generation failed");
                    None
                }
            },
            None => None,
        };

        let result = self
            .write_resolution(
                note_id,
                decision,
                feedback.as_deref(),
                preview_key.as_deref(),
                thumbnail_key.as_deref(),
            )
            .await;

        // A thumbnail rendered for a write that did not land is never referenced
        if let (Err(_), Some(key)) = (&result, &thumbnail_key) {
            if let Err(e) = self.storage.delete(key).await {
                tracing::warn!(note_id, thumbnail_key = %key, error = %e, "Failed to discard unused thumbnail");
            }
        }
        let resolution = result?;

        tracing::info!(
            note_id,
            decision = decision.status().as_str(),
            thumbnail = thumbnail_key.is_some(),
            "Note resolved"
        );

        Ok(resolution)
    }

    /// Note and submission move to the decided state in one transaction
    async fn write_resolution(
        &self,
        note_id: &str,
        decision: Decision,
        feedback: Option<&str>,
        preview_key: Option<&str>,
        thumbnail_key: Option<&str>,
    ) -> MarketResult<NoteResolution> {
        let now = Utc::now();
        let mut tx = self.db.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE note
            SET status = ?1,
                preview_key = COALESCE(?2, preview_key),
                thumbnail_key = COALESCE(?3, thumbnail_key),
                updated_at = ?4
            WHERE id = ?5 AND status = 'Pending'
            RETURNING id, title, description, subject, tags, price, file_key, preview_key,
                      thumbnail_key, status, uploader_id, purchase_count, created_at, updated_at
            "#,
        )
        .bind(decision.status().as_str())
        .bind(preview_key)
        .bind(thumbnail_key)
        .bind(now)
        .bind(note_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = updated else {
            tx.rollback().await?;
            let current = self.catalog.get_note(note_id).await?;
            return Err(already_resolved(&current));
        };
        let note = note_from_row(&row)?;

        let row = sqlx::query(
            r#"
            UPDATE submission
            SET status = ?1, admin_feedback = ?2, reviewed_at = ?3
            WHERE note_id = ?4
            RETURNING id, note_id, uploader_id, title, status, admin_feedback, submitted_at, reviewed_at
            "#,
        )
        .bind(decision.status().as_str())
        .bind(feedback)
        .bind(now)
        .bind(note_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            return Err(MarketError::Internal(format!(
                "Note {} has no submission record",
                note_id
            )));
        };
        let submission = submission_from_row(&row)?;

        tx.commit().await?;

        Ok(NoteResolution { note, submission })
    }
}

fn already_resolved(note: &Note) -> MarketError {
    MarketError::InvalidState(format!(
        "Note has already been {}",
        note.status.as_str().to_lowercase()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob_store::store::tests::{png_bytes, storage_for, PDF_BYTES};
    use crate::catalog::manager::tests::{insert_account, seed_note};
    use crate::db::{create_pool, run_migrations, test_pool, DatabaseOptions};

    fn manager(db: &SqlitePool, dir: &tempfile::TempDir) -> ModerationManager {
        ModerationManager::new(
            db.clone(),
            CatalogManager::new(db.clone()),
            storage_for(db.clone(), dir),
        )
    }

    #[tokio::test]
    async fn test_approve_updates_note_and_submission_together() {
        let db = test_pool().await;
        insert_account(&db, "seller", 0).await;
        let note_id = seed_note(&db, "seller", "50").await;
        let dir = tempfile::tempdir().unwrap();
        let moderation = manager(&db, &dir);

        let resolution = moderation
            .resolve_note(&note_id, Decision::Approved, Some(" Looks good ".to_string()), None)
            .await
            .unwrap();

        assert_eq!(resolution.note.status, ReviewStatus::Approved);
        assert_eq!(resolution.submission.status, ReviewStatus::Approved);
        assert_eq!(resolution.submission.admin_feedback.as_deref(), Some("Looks good"));
        assert_eq!(resolution.submission.reviewed_at, Some(resolution.note.updated_at));

        let stored = CatalogManager::new(db.clone()).get_submission(&note_id).await.unwrap();
        assert_eq!(stored.reviewed_at, resolution.submission.reviewed_at);
    }

    #[tokio::test]
    async fn test_second_resolution_is_invalid_state_and_changes_nothing() {
        let db = test_pool().await;
        insert_account(&db, "seller", 0).await;
        let note_id = seed_note(&db, "seller", "50").await;
        let dir = tempfile::tempdir().unwrap();
        let moderation = manager(&db, &dir);

        let first = moderation
            .resolve_note(&note_id, Decision::Rejected, Some("blurry scans".to_string()), None)
            .await
            .unwrap();
        let err = moderation
            .resolve_note(&note_id, Decision::Approved, Some("on second look".to_string()), None)
            .await
            .unwrap_err();
        assert!(matches!(err, MarketError::InvalidState(_)));

        let catalog = CatalogManager::new(db.clone());
        let note = catalog.get_note(&note_id).await.unwrap();
        let submission = catalog.get_submission(&note_id).await.unwrap();
        assert_eq!(note.status, ReviewStatus::Rejected);
        assert_eq!(submission.admin_feedback.as_deref(), Some("blurry scans"));
        assert_eq!(submission.reviewed_at, first.submission.reviewed_at);
    }

    #[tokio::test]
    async fn test_missing_note_is_not_found() {
        let db = test_pool().await;
        let dir = tempfile::tempdir().unwrap();

        assert!(matches!(
            manager(&db, &dir)
                .resolve_note("missing", Decision::Approved, None, None)
                .await
                .unwrap_err(),
            MarketError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_approval_with_preview_attaches_thumbnail() {
        let db = test_pool().await;
        insert_account(&db, "seller", 0).await;
        insert_account(&db, "admin", 0).await;
        let note_id = seed_note(&db, "seller", "50").await;
        let dir = tempfile::tempdir().unwrap();
        let storage = storage_for(db.clone(), &dir);
        let preview = storage.upload("admin", png_bytes(800, 600), "image/png").await.unwrap();

        let resolution = manager(&db, &dir)
            .resolve_note(&note_id, Decision::Approved, None, Some(preview.key.clone()))
            .await
            .unwrap();

        assert_eq!(resolution.note.preview_key.as_deref(), Some(preview.key.as_str()));
        let thumb = resolution.note.thumbnail_key.unwrap();
        let meta = storage.get_metadata(&thumb).await.unwrap().unwrap();
        assert_eq!(meta.content_type, "image/jpeg");
        assert!(meta.is_public);
    }

    #[tokio::test]
    async fn test_pdf_preview_is_rejected() {
        let db = test_pool().await;
        insert_account(&db, "seller", 0).await;
        let note_id = seed_note(&db, "seller", "50").await;
        let dir = tempfile::tempdir().unwrap();
        let storage = storage_for(db.clone(), &dir);
        let pdf = storage.upload("seller", PDF_BYTES.to_vec(), "application/pdf").await.unwrap();

        let err = manager(&db, &dir)
            .resolve_note(&note_id, Decision::Approved, None, Some(pdf.key))
            .await
            .unwrap_err();

        assert!(matches!(err, MarketError::InvalidInput(_)));
        let note = CatalogManager::new(db).get_note(&note_id).await.unwrap();
        assert_eq!(note.status, ReviewStatus::Pending);
    }

    #[tokio::test]
    async fn test_losing_concurrent_approval_leaves_no_stray_thumbnail() {
        let dir = tempfile::tempdir().unwrap();
        let db = create_pool(&dir.path().join("market.sqlite"), DatabaseOptions::default())
            .await
            .unwrap();
        run_migrations(&db).await.unwrap();
        insert_account(&db, "seller", 0).await;
        insert_account(&db, "admin", 0).await;
        let note_id = seed_note(&db, "seller", "50").await;
        let blobs = tempfile::tempdir().unwrap();
        let storage = storage_for(db.clone(), &blobs);
        let first = storage.upload("admin", png_bytes(640, 480), "image/png").await.unwrap();
        let second = storage.upload("admin", png_bytes(480, 640), "image/png").await.unwrap();
        let moderation = manager(&db, &blobs);

        let (a, b) = tokio::join!(
            moderation.resolve_note(&note_id, Decision::Approved, None, Some(first.key.clone())),
            moderation.resolve_note(&note_id, Decision::Approved, None, Some(second.key.clone()))
        );

        let winner = match (a, b) {
            (Ok(won), Err(lost)) | (Err(lost), Ok(won)) => {
                assert!(matches!(lost, MarketError::InvalidState(_)), "unexpected error: {:?}", lost);
                won
            }
            other => panic!("expected exactly one approval, got {:?}", other),
        };

        let thumbnails: Vec<String> =
            sqlx::query_scalar("SELECT key FROM upload WHERE content_type = 'image/jpeg'")
                .fetch_all(&db)
                .await
                .unwrap();
        assert_eq!(thumbnails.len(), 1);
        assert_eq!(winner.note.thumbnail_key.as_deref(), Some(thumbnails[0].as_str()));
    }
}
