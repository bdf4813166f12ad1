/// Wallet balance, purchase history and top-up endpoints
use crate::{
    api::middleware::JsonBody,
    auth::AuthContext,
    context::AppContext,
    error::MarketResult,
    wallet::{BalanceRequest, Money, SubmitBalanceRequest, TransactionRecord},
};
use axum::{
    extract::State,
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Serialize;

/// Build wallet routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/wallet", get(get_wallet))
        .route("/api/wallet/topups", get(list_topups).post(submit_topup))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WalletSummary {
    balance: Money,
    purchases: Vec<TransactionRecord>,
    sales: Vec<TransactionRecord>,
}

async fn get_wallet(
    State(ctx): State<AppContext>,
    auth: AuthContext,
) -> MarketResult<Json<WalletSummary>> {
    Ok(Json(WalletSummary {
        balance: auth.account.wallet_balance,
        purchases: ctx.purchases.list_for_buyer(auth.account_id()).await?,
        sales: ctx.purchases.list_for_seller(auth.account_id()).await?,
    }))
}

async fn submit_topup(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    JsonBody(req): JsonBody<SubmitBalanceRequest>,
) -> MarketResult<(StatusCode, Json<BalanceRequest>)> {
    let request = ctx.topups.submit(auth.account_id(), req).await?;
    Ok((StatusCode::CREATED, Json(request)))
}

async fn list_topups(
    State(ctx): State<AppContext>,
    auth: AuthContext,
) -> MarketResult<Json<Vec<BalanceRequest>>> {
    Ok(Json(ctx.topups.list_for_account(auth.account_id()).await?))
}
