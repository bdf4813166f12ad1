/// Catalog store
use crate::{
    admin::ReviewStatus,
    catalog::{CatalogStats, CreateNoteRequest, Note, NoteQuery, NoteWithSubmission, Submission},
    error::{is_unique_violation, MarketError, MarketResult},
    wallet::{Money, MAX_PRICE},
};
use chrono::Utc;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use uuid::Uuid;
use validator::Validate;

const NOTE_COLUMNS: &str = "id, title, description, subject, tags, price, file_key, preview_key, \
     thumbnail_key, status, uploader_id, purchase_count, created_at, updated_at";

const SUBMISSION_COLUMNS: &str =
    "id, note_id, uploader_id, title, status, admin_feedback, submitted_at, reviewed_at";

/// Content type every note file must have
pub const NOTE_CONTENT_TYPE: &str = "application/pdf";

#[derive(Clone)]
pub struct CatalogManager {
    db: SqlitePool,
}

impl CatalogManager {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Create a Pending listing and its submission record
    pub async fn create_note(
        &self,
        uploader_id: &str,
        req: CreateNoteRequest,
    ) -> MarketResult<NoteWithSubmission> {
        req.validate()?;

        let title = req.title.trim().to_string();
        let subject = req.subject.trim().to_string();
        if title.is_empty() || subject.is_empty() {
            return Err(MarketError::InvalidInput(
                "title and subject must not be blank".to_string(),
            ));
        }

        let tags = normalize_tags(&req.tags)?;

        if req.price > MAX_PRICE {
            return Err(MarketError::InvalidInput(format!(
                "price must not exceed {}",
                MAX_PRICE
            )));
        }

        self.check_file_reference(uploader_id, &req.file_key).await?;

        let note_id = Uuid::new_v4().to_string();
        let submission_id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let tags_json = serde_json::to_string(&tags)
            .map_err(|e| MarketError::Internal(format!("Failed to encode tags: {}", e)))?;

        let mut tx = self.db.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO note (id, title, description, subject, tags, price, file_key,
                              status, uploader_id, purchase_count, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'Pending', ?8, 0, ?9, ?9)
            "#,
        )
        .bind(&note_id)
        .bind(&title)
        .bind(req.description.trim())
        .bind(&subject)
        .bind(&tags_json)
        .bind(req.price.minor())
        .bind(&req.file_key)
        .bind(uploader_id)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                MarketError::Conflict("This file is already attached to a note".to_string())
            } else {
                MarketError::Database(e)
            }
        })?;

        sqlx::query(
            r#"
            INSERT INTO submission (id, note_id, uploader_id, title, status, submitted_at)
            VALUES (?1, ?2, ?3, ?4, 'Pending', ?5)
            "#,
        )
        .bind(&submission_id)
        .bind(&note_id)
        .bind(uploader_id)
        .bind(&title)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(note_id = %note_id, uploader_id, price = %req.price, "Note submitted for review");

        Ok(NoteWithSubmission {
            note: self.get_note(&note_id).await?,
            submission: self.get_submission(&note_id).await?,
        })
    }

    /// The file must be a PDF uploaded by the same account
    async fn check_file_reference(&self, uploader_id: &str, file_key: &str) -> MarketResult<()> {
        let row = sqlx::query("SELECT creator_id, content_type FROM upload WHERE key = ?1")
            .bind(file_key)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| MarketError::InvalidInput("Unknown file key".to_string()))?;

        let creator_id: String = row.try_get("creator_id")?;
        let content_type: String = row.try_get("content_type")?;

        if creator_id != uploader_id {
            return Err(MarketError::Forbidden(
                "The file was uploaded by another account".to_string(),
            ));
        }
        if content_type != NOTE_CONTENT_TYPE {
            return Err(MarketError::InvalidInput("Note files must be PDF documents".to_string()));
        }
        Ok(())
    }

    pub async fn find_note(&self, id: &str) -> MarketResult<Option<Note>> {
        let row = sqlx::query(&format!("SELECT {} FROM note WHERE id = ?1", NOTE_COLUMNS))
            .bind(id)
            .fetch_optional(&self.db)
            .await?;

        row.as_ref().map(note_from_row).transpose()
    }

    pub async fn get_note(&self, id: &str) -> MarketResult<Note> {
        self.find_note(id)
            .await?
            .ok_or_else(|| MarketError::NotFound("Note not found".to_string()))
    }

    pub async fn get_submission(&self, note_id: &str) -> MarketResult<Submission> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM submission WHERE note_id = ?1",
            SUBMISSION_COLUMNS
        ))
        .bind(note_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| MarketError::NotFound("Submission not found".to_string()))?;

        submission_from_row(&row)
    }

    /// Approved notes, newest first
    pub async fn list_approved(&self, query: &NoteQuery) -> MarketResult<Vec<Note>> {
        let limit = query.limit.unwrap_or(20).clamp(1, 100);
        let offset = query.offset.unwrap_or(0).max(0);

        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM note
            WHERE status = 'Approved'
              AND (?1 IS NULL OR subject = ?1 COLLATE NOCASE)
              AND (?2 IS NULL OR EXISTS (SELECT 1 FROM json_each(note.tags) WHERE value = ?2))
            ORDER BY created_at DESC
            LIMIT ?3 OFFSET ?4
            "#,
            NOTE_COLUMNS
        ))
        .bind(query.subject.as_deref().map(str::trim))
        .bind(query.tag.as_deref().map(|t| t.trim().to_lowercase()))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.db)
        .await?;

        rows.iter().map(note_from_row).collect()
    }

    /// Everything an uploader has submitted, with review state
    pub async fn list_by_uploader(&self, uploader_id: &str) -> MarketResult<Vec<NoteWithSubmission>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM note WHERE uploader_id = ?1 ORDER BY created_at DESC",
            NOTE_COLUMNS
        ))
        .bind(uploader_id)
        .fetch_all(&self.db)
        .await?;

        let mut result = Vec::with_capacity(rows.len());
        for row in &rows {
            let note = note_from_row(row)?;
            let submission = self.get_submission(&note.id).await?;
            result.push(NoteWithSubmission { note, submission });
        }
        Ok(result)
    }

    /// Moderation queue, oldest first
    pub async fn list_pending(&self, limit: i64) -> MarketResult<Vec<Note>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM note WHERE status = 'Pending' ORDER BY created_at ASC LIMIT ?1",
            NOTE_COLUMNS
        ))
        .bind(limit.clamp(1, 200))
        .fetch_all(&self.db)
        .await?;

        rows.iter().map(note_from_row).collect()
    }

    pub async fn stats(&self) -> MarketResult<CatalogStats> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS count FROM note GROUP BY status")
            .fetch_all(&self.db)
            .await?;

        let mut stats = CatalogStats::default();
        for row in rows {
            let status: String = row.try_get("status")?;
            let count: i64 = row.try_get("count")?;
            match ReviewStatus::from_str(&status)? {
                ReviewStatus::Pending => stats.pending = count,
                ReviewStatus::Approved => stats.approved = count,
                ReviewStatus::Rejected => stats.rejected = count,
            }
        }
        Ok(stats)
    }
}

/// Trim, lowercase and de-duplicate tags; at least one must remain
fn normalize_tags(raw: &[String]) -> MarketResult<Vec<String>> {
    let mut tags: Vec<String> = Vec::new();
    for tag in raw {
        let tag = tag.trim().to_lowercase();
        if tag.is_empty() {
            continue;
        }
        if tag.len() > 50 {
            return Err(MarketError::InvalidInput("tags must be at most 50 characters".to_string()));
        }
        if !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    if tags.is_empty() {
        return Err(MarketError::InvalidInput("at least one tag is required".to_string()));
    }
    Ok(tags)
}

pub(crate) fn note_from_row(row: &SqliteRow) -> MarketResult<Note> {
    let tags_json: String = row.try_get("tags")?;
    let tags: Vec<String> = serde_json::from_str(&tags_json)
        .map_err(|e| MarketError::Internal(format!("Corrupt tags column: {}", e)))?;
    let status: String = row.try_get("status")?;

    Ok(Note {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        subject: row.try_get("subject")?,
        tags,
        price: Money::from_minor(row.try_get("price")?)?,
        file_key: row.try_get("file_key")?,
        preview_key: row.try_get("preview_key")?,
        thumbnail_key: row.try_get("thumbnail_key")?,
        status: ReviewStatus::from_str(&status)?,
        uploader_id: row.try_get("uploader_id")?,
        purchase_count: row.try_get("purchase_count")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub(crate) fn submission_from_row(row: &SqliteRow) -> MarketResult<Submission> {
    let status: String = row.try_get("status")?;

    Ok(Submission {
        id: row.try_get("id")?,
        note_id: row.try_get("note_id")?,
        uploader_id: row.try_get("uploader_id")?,
        title: row.try_get("title")?,
        status: ReviewStatus::from_str(&status)?,
        admin_feedback: row.try_get("admin_feedback")?,
        submitted_at: row.try_get("submitted_at")?,
        reviewed_at: row.try_get("reviewed_at")?,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::test_pool;

    pub(crate) async fn insert_account(db: &SqlitePool, id: &str, balance: i64) {
        sqlx::query(
            "INSERT INTO account (id, email, name, provider, role, wallet_balance, created_at)
             VALUES (?1, ?2, ?1, 'credentials', 'student', ?3, ?4)",
        )
        .bind(id)
        .bind(format!("{}@example.com", id))
        .bind(balance)
        .bind(Utc::now())
        .execute(db)
        .await
        .unwrap();
    }

    pub(crate) async fn insert_upload(db: &SqlitePool, key: &str, creator: &str, content_type: &str) {
        sqlx::query(
            "INSERT INTO upload (key, content_type, size, sha256, creator_id, is_public, created_at)
             VALUES (?1, ?2, 4, '00', ?3, 0, ?4)",
        )
        .bind(key)
        .bind(content_type)
        .bind(creator)
        .bind(Utc::now())
        .execute(db)
        .await
        .unwrap();
    }

    pub(crate) fn note_request(file_key: &str, price: &str) -> CreateNoteRequest {
        CreateNoteRequest {
            title: "Linear Algebra Week 3".to_string(),
            description: "Eigenvalues and diagonalisation".to_string(),
            subject: "Mathematics".to_string(),
            tags: vec!["Linear Algebra".to_string(), " eigen ".to_string()],
            price: Money::parse(price).unwrap(),
            file_key: file_key.to_string(),
        }
    }

    /// Create an uploader with a listing and return the note id
    pub(crate) async fn seed_note(db: &SqlitePool, uploader: &str, price: &str) -> String {
        let key = format!("file-{}", Uuid::new_v4());
        insert_upload(db, &key, uploader, NOTE_CONTENT_TYPE).await;
        CatalogManager::new(db.clone())
            .create_note(uploader, note_request(&key, price))
            .await
            .unwrap()
            .note
            .id
    }

    #[tokio::test]
    async fn test_create_note_starts_pending_with_submission() {
        let db = test_pool().await;
        insert_account(&db, "seller", 0).await;
        insert_upload(&db, "k1", "seller", NOTE_CONTENT_TYPE).await;
        let catalog = CatalogManager::new(db);

        let created = catalog
            .create_note("seller", note_request("k1", "50"))
            .await
            .unwrap();

        assert_eq!(created.note.status, ReviewStatus::Pending);
        assert_eq!(created.note.tags, vec!["linear algebra", "eigen"]);
        assert_eq!(created.note.purchase_count, 0);
        assert_eq!(created.submission.status, ReviewStatus::Pending);
        assert_eq!(created.submission.note_id, created.note.id);
        assert!(created.submission.reviewed_at.is_none());
    }

    #[tokio::test]
    async fn test_create_note_requires_a_tag() {
        let db = test_pool().await;
        insert_account(&db, "seller", 0).await;
        insert_upload(&db, "k1", "seller", NOTE_CONTENT_TYPE).await;
        let catalog = CatalogManager::new(db);

        let mut req = note_request("k1", "10");
        req.tags = vec!["   ".to_string()];
        assert!(matches!(
            catalog.create_note("seller", req).await.unwrap_err(),
            MarketError::InvalidInput(_)
        ));
    }

    #[tokio::test]
    async fn test_create_note_rejects_foreign_or_non_pdf_files() {
        let db = test_pool().await;
        insert_account(&db, "seller", 0).await;
        insert_account(&db, "other", 0).await;
        insert_upload(&db, "theirs", "other", NOTE_CONTENT_TYPE).await;
        insert_upload(&db, "image", "seller", "image/png").await;
        let catalog = CatalogManager::new(db);

        assert!(matches!(
            catalog.create_note("seller", note_request("theirs", "10")).await.unwrap_err(),
            MarketError::Forbidden(_)
        ));
        assert!(matches!(
            catalog.create_note("seller", note_request("image", "10")).await.unwrap_err(),
            MarketError::InvalidInput(_)
        ));
        assert!(matches!(
            catalog.create_note("seller", note_request("missing", "10")).await.unwrap_err(),
            MarketError::InvalidInput(_)
        ));
    }

    #[tokio::test]
    async fn test_file_cannot_back_two_notes() {
        let db = test_pool().await;
        insert_account(&db, "seller", 0).await;
        insert_upload(&db, "k1", "seller", NOTE_CONTENT_TYPE).await;
        let catalog = CatalogManager::new(db);

        catalog.create_note("seller", note_request("k1", "10")).await.unwrap();
        assert!(matches!(
            catalog.create_note("seller", note_request("k1", "10")).await.unwrap_err(),
            MarketError::Conflict(_)
        ));
    }

    #[tokio::test]
    async fn test_price_above_maximum_is_rejected() {
        let db = test_pool().await;
        insert_account(&db, "seller", 0).await;
        insert_upload(&db, "k1", "seller", NOTE_CONTENT_TYPE).await;
        let catalog = CatalogManager::new(db);

        assert!(matches!(
            catalog.create_note("seller", note_request("k1", "100000")).await.unwrap_err(),
            MarketError::InvalidInput(_)
        ));
    }

    #[tokio::test]
    async fn test_list_approved_hides_pending_and_filters() {
        let db = test_pool().await;
        insert_account(&db, "seller", 0).await;
        let pending = seed_note(&db, "seller", "10").await;
        let approved = seed_note(&db, "seller", "20").await;
        sqlx::query("UPDATE note SET status = 'Approved' WHERE id = ?1")
            .bind(&approved)
            .execute(&db)
            .await
            .unwrap();
        let catalog = CatalogManager::new(db);

        let all = catalog.list_approved(&NoteQuery::default()).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, approved);
        assert!(all.iter().all(|n| n.id != pending));

        let by_tag = catalog
            .list_approved(&NoteQuery {
                tag: Some("EIGEN".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(by_tag.len(), 1);

        let by_subject = catalog
            .list_approved(&NoteQuery {
                subject: Some("physics".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(by_subject.is_empty());

        let stats = catalog.stats().await.unwrap();
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.approved, 1);
        assert_eq!(catalog.list_pending(10).await.unwrap()[0].id, pending);
    }
}
