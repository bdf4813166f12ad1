/// Catalog browsing, listing creation, purchase and download endpoints
use crate::{
    api::middleware::JsonBody,
    auth::{AuthContext, OptionalAuthContext},
    catalog::{CreateNoteRequest, Note, NoteQuery, NoteWithSubmission},
    context::AppContext,
    error::{MarketError, MarketResult},
    notify::{self, MarketEvent},
    wallet::PurchaseReceipt,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

/// Build note routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/notes", post(create_note).get(list_notes))
        .route("/api/notes/mine", get(list_my_notes))
        .route("/api/notes/:id", get(get_note))
        .route("/api/notes/:id/purchase", post(purchase_note))
        .route("/api/notes/:id/download", get(download_note))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DownloadLink {
    download_url: String,
    expires_in: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PurchaseResponse {
    receipt: PurchaseReceipt,
    download_url: String,
    expires_in: u64,
}

fn download_link(ctx: &AppContext, note: &Note) -> MarketResult<DownloadLink> {
    let ttl = ctx.config.storage.download_url_ttl_secs;
    Ok(DownloadLink {
        download_url: ctx.storage.signed_download_url(&note.file_key, ttl)?,
        expires_in: ttl,
    })
}

/// Create a listing; it stays Pending until an admin reviews it
async fn create_note(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    JsonBody(req): JsonBody<CreateNoteRequest>,
) -> MarketResult<(StatusCode, Json<NoteWithSubmission>)> {
    let created = ctx.catalog.create_note(auth.account_id(), req).await?;

    notify::dispatch(
        ctx.notifier.clone(),
        MarketEvent::NewSubmission {
            note_id: created.note.id.clone(),
            title: created.note.title.clone(),
            uploader_email: auth.account.email.clone(),
            price: created.note.price,
        },
    );

    Ok((StatusCode::CREATED, Json(created)))
}

async fn list_notes(
    State(ctx): State<AppContext>,
    Query(query): Query<NoteQuery>,
) -> MarketResult<Json<Vec<Note>>> {
    Ok(Json(ctx.catalog.list_approved(&query).await?))
}

async fn list_my_notes(
    State(ctx): State<AppContext>,
    auth: AuthContext,
) -> MarketResult<Json<Vec<NoteWithSubmission>>> {
    Ok(Json(ctx.catalog.list_by_uploader(auth.account_id()).await?))
}

/// Approved notes are public; others are visible to their uploader and admins only
async fn get_note(
    State(ctx): State<AppContext>,
    OptionalAuthContext { auth }: OptionalAuthContext,
    Path(id): Path<String>,
) -> MarketResult<Json<Note>> {
    let note = ctx.catalog.get_note(&id).await?;

    let visible = note.is_approved()
        || auth
            .as_ref()
            .is_some_and(|a| a.account.is_admin() || a.account.id == note.uploader_id);

    if !visible {
        return Err(MarketError::NotFound("Note not found".to_string()));
    }
    Ok(Json(note))
}

async fn purchase_note(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<String>,
) -> MarketResult<Json<PurchaseResponse>> {
    let receipt = ctx.purchases.purchase(auth.account_id(), &id).await?;

    let note = ctx.catalog.get_note(&receipt.note_id).await?;
    let link = download_link(&ctx, &note)?;

    Ok(Json(PurchaseResponse {
        receipt,
        download_url: link.download_url,
        expires_in: link.expires_in,
    }))
}

/// Fresh signed link for buyers, the uploader and admins
async fn download_note(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<String>,
) -> MarketResult<Json<DownloadLink>> {
    let note = ctx.catalog.get_note(&id).await?;

    let allowed = auth.account.is_admin()
        || note.uploader_id == auth.account.id
        || ctx
            .account_manager
            .has_purchased(auth.account_id(), &note.id)
            .await?;

    if !allowed {
        return Err(MarketError::Forbidden(
            "You have not purchased this note".to_string(),
        ));
    }

    Ok(Json(download_link(&ctx, &note)?))
}
