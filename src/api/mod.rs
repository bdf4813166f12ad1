/// API routes and handlers
pub mod account;
pub mod admin;
pub mod files;
pub mod middleware;
pub mod notes;
pub mod wallet;

use crate::context::AppContext;
use axum::Router;

/// Build API routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .merge(account::routes())
        .merge(notes::routes())
        .merge(files::routes())
        .merge(wallet::routes())
        .merge(admin::routes())
}
