/// Admin API Endpoints
///
/// Every handler takes an [`AdminAuthContext`], so the stored account role is
/// checked before any admin action runs.
use crate::{
    api::middleware::JsonBody,
    admin::{AuditLogEntry, Decision, NoteResolution, ResolveNoteRequest, ReviewStatus},
    auth::AdminAuthContext,
    catalog::{CatalogStats, Note},
    context::AppContext,
    error::MarketResult,
    wallet::{BalanceRequest, Money},
};
use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

/// Build admin API routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        // Note moderation
        .route("/api/admin/notes/pending", get(list_pending_notes))
        .route("/api/admin/notes/:id/resolve", post(resolve_note))
        // Balance requests
        .route("/api/admin/topups", get(list_topups))
        .route("/api/admin/topups/:id/resolve", post(resolve_topup))
        // Overview
        .route("/api/admin/stats", get(get_stats))
        .route("/api/admin/audit", get(get_audit_log))
}

#[derive(Debug, Deserialize)]
struct LimitQuery {
    limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct TopupQuery {
    status: Option<String>,
    limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResolveTopupRequest {
    decision: String,
    admin_note: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AdminStats {
    accounts: i64,
    notes: CatalogStats,
    pending_topups: i64,
    platform_revenue: Money,
}

/// Record an admin action; a failed audit write does not undo the action
async fn audit(
    ctx: &AppContext,
    auth: &AdminAuthContext,
    action: &str,
    subject_id: &str,
    details: Option<&str>,
) {
    if let Err(e) = ctx
        .audit_log
        .log_action(auth.admin_id(), action, Some(subject_id), details)
        .await
    {
        tracing::warn!(action, subject_id, error = %e, "Failed to write audit log entry");
    }
}

fn action_name(subject: &str, decision: Decision) -> String {
    match decision {
        Decision::Approved => format!("{}.approve", subject),
        Decision::Rejected => format!("{}.reject", subject),
    }
}

async fn list_pending_notes(
    State(ctx): State<AppContext>,
    _auth: AdminAuthContext,
    Query(query): Query<LimitQuery>,
) -> MarketResult<Json<Vec<Note>>> {
    Ok(Json(ctx.catalog.list_pending(query.limit.unwrap_or(50)).await?))
}

async fn resolve_note(
    State(ctx): State<AppContext>,
    auth: AdminAuthContext,
    Path(id): Path<String>,
    JsonBody(req): JsonBody<ResolveNoteRequest>,
) -> MarketResult<Json<NoteResolution>> {
    let decision = Decision::from_str(&req.decision)?;

    let resolution = ctx
        .moderation_manager
        .resolve_note(&id, decision, req.feedback.clone(), req.preview_key)
        .await?;

    audit(
        &ctx,
        &auth,
        &action_name("note", decision),
        &id,
        resolution.submission.admin_feedback.as_deref(),
    )
    .await;

    Ok(Json(resolution))
}

async fn list_topups(
    State(ctx): State<AppContext>,
    _auth: AdminAuthContext,
    Query(query): Query<TopupQuery>,
) -> MarketResult<Json<Vec<BalanceRequest>>> {
    let status = match query.status.as_deref() {
        Some(s) => ReviewStatus::from_str(s)?,
        None => ReviewStatus::Pending,
    };
    Ok(Json(
        ctx.topups
            .list_by_status(status, query.limit.unwrap_or(50))
            .await?,
    ))
}

async fn resolve_topup(
    State(ctx): State<AppContext>,
    auth: AdminAuthContext,
    Path(id): Path<String>,
    JsonBody(req): JsonBody<ResolveTopupRequest>,
) -> MarketResult<Json<BalanceRequest>> {
    let decision = Decision::from_str(&req.decision)?;

    let request = ctx.topups.resolve(&id, decision, req.admin_note).await?;

    let details = format!("{} via {}", request.amount, request.method.as_str());
    audit(&ctx, &auth, &action_name("topup", decision), &id, Some(&details)).await;

    Ok(Json(request))
}

async fn get_stats(
    State(ctx): State<AppContext>,
    _auth: AdminAuthContext,
) -> MarketResult<Json<AdminStats>> {
    Ok(Json(AdminStats {
        accounts: ctx.account_manager.count_accounts().await?,
        notes: ctx.catalog.stats().await?,
        pending_topups: ctx.topups.count_by_status(ReviewStatus::Pending).await?,
        platform_revenue: ctx.purchases.platform_revenue().await?,
    }))
}

async fn get_audit_log(
    State(ctx): State<AppContext>,
    _auth: AdminAuthContext,
    Query(query): Query<LimitQuery>,
) -> MarketResult<Json<Vec<AuditLogEntry>>> {
    Ok(Json(
        ctx.audit_log
            .recent(query.limit.unwrap_or(100).clamp(1, 500))
            .await?,
    ))
}
