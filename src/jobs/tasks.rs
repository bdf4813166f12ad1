/// Background task implementations
use crate::{context::AppContext, db, error::MarketResult};

/// Uploads younger than this are assumed to still be on their way into a note
pub const ORPHAN_TTL_HOURS: i64 = 24;

/// Health check - verify the database answers
pub async fn health_check(ctx: &AppContext) -> MarketResult<()> {
    db::test_connection(&ctx.db).await
}

/// Delete stale uploads that no note references (file and metadata)
pub async fn cleanup_orphaned_uploads(ctx: &AppContext) -> MarketResult<u64> {
    let orphaned = ctx.storage.list_orphaned_uploads(ORPHAN_TTL_HOURS).await?;

    let mut deleted_count = 0;
    for key in orphaned {
        match ctx.storage.delete(&key).await {
            Ok(()) => {
                tracing::debug!("Deleted orphaned upload: {}", key);
                deleted_count += 1;
            }
            Err(e) => tracing::warn!("Failed to delete orphaned upload {}: {}", key, e),
        }
    }

    Ok(deleted_count)
}
