/// Notemart - student note marketplace
///
/// Students upload lecture notes, administrators review them, and buyers
/// pay for approved notes from an internal wallet that sellers earn into.

mod account;
mod admin;
mod api;
mod auth;
mod blob_store;
mod catalog;
mod config;
mod context;
mod db;
mod error;
mod jobs;
mod notify;
mod rate_limit;
mod server;
mod wallet;

use config::ServerConfig;
use context::AppContext;
use error::MarketResult;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> MarketResult<()> {
    let config = ServerConfig::from_env()?;

    let (json_layer, text_layer) = if config.logging.json {
        (Some(tracing_subscriber::fmt::layer().json()), None)
    } else {
        (None, Some(tracing_subscriber::fmt::layer()))
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&config.logging.level))
        .with(json_layer)
        .with(text_layer)
        .init();

    print_banner();

    let ctx = Arc::new(AppContext::new(config).await?);

    let scheduler = Arc::new(jobs::JobScheduler::new(Arc::clone(&ctx)));
    scheduler.start();

    server::serve((*ctx).clone()).await?;

    Ok(())
}

fn print_banner() {
    println!(
        r#"
    _   __      __                             __
   / | / /___  / /____  ____ ___  ____ ______/ /_
  /  |/ / __ \/ __/ _ \/ __ `__ \/ __ `/ ___/ __/
 / /|  / /_/ / /_/  __/ / / / / / /_/ / /  / /_
/_/ |_/\____/\__/\___/_/ /_/ /_/\__,_/_/   \__/

        Student note marketplace v{}
        "#,
        env!("CARGO_PKG_VERSION")
    );
}
