/// Admin action audit log
use crate::error::MarketResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};

/// Admin action audit log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogEntry {
    pub id: i64,
    pub admin_id: String,
    pub action: String,
    pub subject_id: Option<String>,
    pub details: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Clone)]
pub struct AuditLog {
    db: SqlitePool,
}

impl AuditLog {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Log admin action to audit log
    pub async fn log_action(
        &self,
        admin_id: &str,
        action: &str,
        subject_id: Option<&str>,
        details: Option<&str>,
    ) -> MarketResult<()> {
        sqlx::query(
            r#"
            INSERT INTO admin_audit_log (admin_id, action, subject_id, details, timestamp)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(admin_id)
        .bind(action)
        .bind(subject_id)
        .bind(details)
        .bind(Utc::now())
        .execute(&self.db)
        .await?;

        Ok(())
    }

    /// Most recent entries first
    pub async fn recent(&self, limit: i64) -> MarketResult<Vec<AuditLogEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, admin_id, action, subject_id, details, timestamp
            FROM admin_audit_log
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.db)
        .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            entries.push(AuditLogEntry {
                id: row.try_get("id")?,
                admin_id: row.try_get("admin_id")?,
                action: row.try_get("action")?,
                subject_id: row.try_get("subject_id")?,
                details: row.try_get("details")?,
                timestamp: row.try_get("timestamp")?,
            });
        }
        Ok(entries)
    }
}
