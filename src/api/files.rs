/// Upload and file serving endpoints
use crate::{
    api::middleware,
    auth::AuthContext,
    blob_store::UploadRecord,
    context::AppContext,
    error::{MarketError, MarketResult},
};
use axum::{
    body::{Body, Bytes},
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

/// Build file routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/uploads", post(upload))
        .route("/files/:key", get(get_file))
}

#[derive(Debug, Deserialize)]
struct FileQuery {
    token: Option<String>,
}

/// Upload a note PDF or preview image
///
/// Accepts raw binary data in the request body with a Content-Type header.
async fn upload(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    headers: HeaderMap,
    body: Bytes,
) -> MarketResult<(StatusCode, Json<UploadRecord>)> {
    let content_type = middleware::content_type(&headers)
        .ok_or_else(|| MarketError::InvalidInput("Content-Type header is required".to_string()))?;

    let record = ctx
        .storage
        .upload(auth.account_id(), body.to_vec(), &content_type)
        .await?;

    Ok((StatusCode::CREATED, Json(record)))
}

/// Serve a stored file
///
/// Public preview assets are served as is; note files need a download token for this key.
async fn get_file(
    State(ctx): State<AppContext>,
    Path(key): Path<String>,
    Query(query): Query<FileQuery>,
    headers: HeaderMap,
) -> MarketResult<Response> {
    let record = ctx
        .storage
        .get_metadata(&key)
        .await?
        .ok_or_else(|| MarketError::NotFound("File not found".to_string()))?;

    if !record.is_public {
        let token = query
            .token
            .as_deref()
            .ok_or_else(|| MarketError::Forbidden("A download link is required".to_string()))?;
        ctx.storage.verify_download_token(&key, token)?;
    }

    let cache_control = if record.is_public {
        "public, max-age=31536000, immutable"
    } else {
        "private, no-store"
    };
    let etag = format!("\"{}\"", record.sha256);

    if headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == etag)
    {
        return Response::builder()
            .status(StatusCode::NOT_MODIFIED)
            .header(header::ETAG, etag)
            .header(header::CACHE_CONTROL, cache_control)
            .body(Body::empty())
            .map_err(|e| MarketError::Internal(format!("Failed to build response: {}", e)));
    }

    let (data, record) = ctx
        .storage
        .get(&key)
        .await?
        .ok_or_else(|| MarketError::NotFound("File not found".to_string()))?;

    let mut response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, &record.content_type)
        .header(header::CONTENT_LENGTH, data.len())
        .header(header::ETAG, etag)
        .header(header::CACHE_CONTROL, cache_control);

    if record.is_pdf() {
        response = response.header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}.pdf\"", record.key),
        );
    }

    response
        .body(Body::from(data))
        .map_err(|e| MarketError::Internal(format!("Failed to build response: {}", e)))
}
