/// Registration, sign-in and profile endpoints
use crate::{
    api::middleware::JsonBody,
    account::{
        AccountView, FederatedSignInRequest, LoginRequest, PurchasedNote, RegisterRequest,
        SessionResponse,
    },
    auth::AuthContext,
    context::AppContext,
    db::account::Account,
    error::MarketResult,
};
use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};

/// Build account routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .route("/api/auth/federated", post(federated_sign_in))
        .route("/api/account", get(get_account))
        .route("/api/account/purchases", get(list_purchases))
}

fn session_for(ctx: &AppContext, account: Account) -> MarketResult<SessionResponse> {
    let access_token = ctx.account_manager.issue_access_token(&account.id)?;
    Ok(SessionResponse {
        access_token,
        account: account.into(),
    })
}

async fn register(
    State(ctx): State<AppContext>,
    JsonBody(req): JsonBody<RegisterRequest>,
) -> MarketResult<(StatusCode, Json<SessionResponse>)> {
    let account = ctx.account_manager.register(req).await?;
    Ok((StatusCode::CREATED, Json(session_for(&ctx, account)?)))
}

async fn login(
    State(ctx): State<AppContext>,
    JsonBody(req): JsonBody<LoginRequest>,
) -> MarketResult<Json<SessionResponse>> {
    let account = ctx.account_manager.login(&req).await?;
    Ok(Json(session_for(&ctx, account)?))
}

async fn federated_sign_in(
    State(ctx): State<AppContext>,
    JsonBody(req): JsonBody<FederatedSignInRequest>,
) -> MarketResult<Json<SessionResponse>> {
    let account = ctx.account_manager.sign_in_federated(&req.id_token).await?;
    Ok(Json(session_for(&ctx, account)?))
}

async fn get_account(auth: AuthContext) -> Json<AccountView> {
    Json(auth.account.into())
}

async fn list_purchases(
    State(ctx): State<AppContext>,
    auth: AuthContext,
) -> MarketResult<Json<Vec<PurchasedNote>>> {
    Ok(Json(ctx.account_manager.list_purchases(auth.account_id()).await?))
}
