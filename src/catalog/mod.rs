/// Note catalog
///
/// Listings, their paired submission records, and the queries buyers and
/// uploaders browse them with.

pub(crate) mod manager;

pub use manager::CatalogManager;

use crate::{admin::ReviewStatus, wallet::Money};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// A sellable note listing
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: String,
    pub title: String,
    pub description: String,
    pub subject: String,
    pub tags: Vec<String>,
    pub price: Money,
    /// Private storage key of the PDF
    #[serde(skip_serializing)]
    pub file_key: String,
    pub preview_key: Option<String>,
    pub thumbnail_key: Option<String>,
    pub status: ReviewStatus,
    pub uploader_id: String,
    pub purchase_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Note {
    pub fn is_approved(&self) -> bool {
        self.status == ReviewStatus::Approved
    }
}

/// Moderation record paired 1:1 with a note
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub id: String,
    pub note_id: String,
    pub uploader_id: String,
    pub title: String,
    pub status: ReviewStatus,
    pub admin_feedback: Option<String>,
    pub submitted_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
}

/// A note together with its submission, as shown to its uploader
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteWithSubmission {
    pub note: Note,
    pub submission: Submission,
}

/// Listing creation request
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateNoteRequest {
    #[validate(length(min = 1, max = 200, message = "must be between 1 and 200 characters"))]
    pub title: String,
    #[validate(length(max = 5000, message = "must be at most 5000 characters"))]
    pub description: String,
    #[validate(length(min = 1, max = 100, message = "must be between 1 and 100 characters"))]
    pub subject: String,
    #[validate(length(min = 1, max = 20, message = "must contain between 1 and 20 tags"))]
    pub tags: Vec<String>,
    pub price: Money,
    /// Key returned by the upload endpoint
    #[validate(length(min = 1, message = "is required"))]
    pub file_key: String,
}

/// Browse filter for approved notes
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NoteQuery {
    pub subject: Option<String>,
    pub tag: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Counts of notes per review state
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogStats {
    pub pending: i64,
    pub approved: i64,
    pub rejected: i64,
}
