/// HTTP server setup and routing
use crate::{
    context::AppContext,
    db,
    error::{MarketError, MarketResult},
    rate_limit::rate_limit_middleware,
};
use axum::{
    extract::{DefaultBodyLimit, State},
    http::{header, Method, StatusCode},
    middleware,
    response::Json,
    routing::get,
    Router,
};
use serde_json::json;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

/// Build the main application router
pub fn build_router(ctx: AppContext) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    // Leave headroom over the upload limit so oversized files get the storage error
    let body_limit = ctx.config.service.upload_limit + 64 * 1024;

    Router::new()
        .route("/health", get(health_check))
        .merge(crate::api::routes())
        .with_state(ctx.clone())
        .layer(middleware::from_fn_with_state(ctx, rate_limit_middleware))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .fallback(not_found)
}

/// Health check handler
async fn health_check(State(ctx): State<AppContext>) -> (StatusCode, Json<serde_json::Value>) {
    match db::test_connection(&ctx.db).await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "version": env!("CARGO_PKG_VERSION")
            })),
        ),
        Err(e) => {
            tracing::error!("Health check database probe failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unavailable",
                    "version": env!("CARGO_PKG_VERSION")
                })),
            )
        }
    }
}

/// 404 handler
async fn not_found() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": "NotFound",
            "message": "Endpoint not found"
        })),
    )
}

/// Start the HTTP server
pub async fn serve(ctx: AppContext) -> MarketResult<()> {
    let addr = format!("{}:{}", ctx.config.service.hostname, ctx.config.service.port);

    info!("Notemart listening on {}", addr);
    info!("   Public URL: {}", ctx.service_url());

    let app = build_router(ctx);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| MarketError::Internal(format!("Failed to bind to {}: {}", addr, e)))?;

    axum::serve(listener, app)
        .await
        .map_err(|e| MarketError::Internal(format!("Server error: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob_store::{store::tests::PDF_BYTES, DiskBlobBackend};
    use crate::config::ServerConfig;
    use crate::db::test_pool;
    use crate::notify::LogNotifier;
    use axum::{body::Body, http::Request, response::Response};
    use serde_json::Value;
    use std::sync::Arc;
    use tempfile::TempDir;
    use tower::ServiceExt;

    async fn test_app() -> (Router, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let ctx = AppContext::from_parts(
            ServerConfig::for_tests(),
            test_pool().await,
            Arc::new(DiskBlobBackend::new(dir.path().to_path_buf())),
            Arc::new(LogNotifier),
        );
        (build_router(ctx), dir)
    }

    async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        app.clone().oneshot(request).await.unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn register(app: &Router, email: &str) -> (String, String) {
        let response = send(
            app,
            "POST",
            "/api/auth/register",
            None,
            Some(json!({ "email": email, "name": "Test User", "password": "correct horse" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = json_body(response).await;
        (
            body["accessToken"].as_str().unwrap().to_string(),
            body["account"]["id"].as_str().unwrap().to_string(),
        )
    }

    #[tokio::test]
    async fn test_health_and_fallback() {
        let (app, _dir) = test_app().await;

        let response = send(&app, "GET", "/health", None, None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "ok");

        let response = send(&app, "GET", "/nope", None, None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await["error"], "NotFound");
    }

    #[tokio::test]
    async fn test_auth_guards() {
        let (app, _dir) = test_app().await;
        let (student, _) = register(&app, "student@example.com").await;

        let response = send(&app, "GET", "/api/account", None, None).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await["error"], "Unauthorized");

        let response = send(&app, "GET", "/api/admin/stats", Some(&student), None).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = send(&app, "GET", "/api/account", Some("not-a-token"), None).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_malformed_json_bodies_are_invalid_input() {
        let (app, _dir) = test_app().await;
        let (student, _) = register(&app, "student@example.com").await;

        for amount in [json!("abc"), json!("5.001"), json!("79228162514264337593543950335")] {
            let response = send(
                &app,
                "POST",
                "/api/wallet/topups",
                Some(&student),
                Some(json!({ "amount": amount, "method": "bkash", "transactionId": "TXN1" })),
            )
            .await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            let body = json_body(response).await;
            assert_eq!(body["error"], "InvalidInput");
            assert!(body["message"].is_string());
        }

        let response = send(&app, "POST", "/api/auth/login", None, Some(json!({ "email": 7 }))).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"], "InvalidInput");

        let response = send(&app, "GET", "/api/wallet/topups", Some(&student), None).await;
        assert_eq!(json_body(response).await.as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_marketplace_flow() {
        let (app, _dir) = test_app().await;
        let (seller, _) = register(&app, "seller@example.com").await;
        let (buyer, _) = register(&app, "buyer@example.com").await;
        let (admin, _) = register(&app, "root@notemart.test").await;

        // Seller uploads the PDF and lists it
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/uploads")
                    .header(header::AUTHORIZATION, format!("Bearer {}", seller))
                    .header(header::CONTENT_TYPE, "application/pdf")
                    .body(Body::from(PDF_BYTES.to_vec()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let file_key = json_body(response).await["key"].as_str().unwrap().to_string();

        let response = send(
            &app,
            "POST",
            "/api/notes",
            Some(&seller),
            Some(json!({
                "title": "Organic Chemistry Ch. 5",
                "description": "Reaction mechanisms",
                "subject": "Chemistry",
                "tags": ["orgo"],
                "price": "50",
                "fileKey": file_key,
            })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let note_id = json_body(response).await["note"]["id"].as_str().unwrap().to_string();

        // Pending notes are hidden from buyers
        let response = send(&app, "GET", &format!("/api/notes/{}", note_id), Some(&buyer), None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let response = send(&app, "POST", &format!("/api/notes/{}/purchase", note_id), Some(&buyer), None).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        // Admin approves
        let response = send(
            &app,
            "POST",
            &format!("/api/admin/notes/{}/resolve", note_id),
            Some(&admin),
            Some(json!({ "decision": "Approved", "feedback": "Clear handwriting" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["note"]["status"], "Approved");
        assert_eq!(body["submission"]["status"], "Approved");

        let response = send(
            &app,
            "POST",
            &format!("/api/admin/notes/{}/resolve", note_id),
            Some(&admin),
            Some(json!({ "decision": "Rejected" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(json_body(response).await["error"], "InvalidState");

        // Broke buyer cannot pay
        let response = send(&app, "POST", &format!("/api/notes/{}/purchase", note_id), Some(&buyer), None).await;
        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);

        // Buyer tops up and an admin approves it
        let response = send(
            &app,
            "POST",
            "/api/wallet/topups",
            Some(&buyer),
            Some(json!({ "amount": 100, "method": "bkash", "transactionId": "TXN123" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let request_id = json_body(response).await["id"].as_str().unwrap().to_string();

        let response = send(
            &app,
            "POST",
            "/api/wallet/topups",
            Some(&seller),
            Some(json!({ "amount": 100, "method": "bkash", "transactionId": "TXN123" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = send(
            &app,
            "POST",
            &format!("/api/admin/topups/{}/resolve", request_id),
            Some(&admin),
            Some(json!({ "decision": "Approved", "adminNote": "seen in bKash statement" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        // Purchase and download
        let response = send(&app, "POST", &format!("/api/notes/{}/purchase", note_id), Some(&buyer), None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["receipt"]["amount"], "50.00");
        assert_eq!(body["receipt"]["sellerAmount"], "45.00");
        assert_eq!(body["receipt"]["platformAmount"], "5.00");
        assert_eq!(body["receipt"]["buyerBalance"], "50.00");
        let download_url = body["downloadUrl"].as_str().unwrap().to_string();
        let path = download_url.trim_start_matches("http://localhost:8080");

        let response = send(&app, "GET", path, None, None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/pdf"
        );
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], PDF_BYTES);

        let response = send(&app, "GET", &format!("/files/{}", file_key), None, None).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = send(&app, "POST", &format!("/api/notes/{}/purchase", note_id), Some(&buyer), None).await;
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = send(&app, "POST", &format!("/api/notes/{}/purchase", note_id), Some(&seller), None).await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        // Balances and stats
        let response = send(&app, "GET", "/api/wallet", Some(&seller), None).await;
        let body = json_body(response).await;
        assert_eq!(body["balance"], "45.00");
        assert_eq!(body["sales"].as_array().unwrap().len(), 1);

        let response = send(&app, "GET", "/api/admin/stats", Some(&admin), None).await;
        let body = json_body(response).await;
        assert_eq!(body["accounts"], 3);
        assert_eq!(body["notes"]["approved"], 1);
        assert_eq!(body["platformRevenue"], "5.00");

        let response = send(&app, "GET", "/api/admin/audit", Some(&admin), None).await;
        let body = json_body(response).await;
        assert_eq!(body.as_array().unwrap().len(), 2);

        let response = send(&app, "GET", &format!("/api/notes/{}/download", note_id), Some(&buyer), None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let response = send(&app, "GET", "/api/account/purchases", Some(&buyer), None).await;
        assert_eq!(json_body(response).await.as_array().unwrap().len(), 1);
    }
}
