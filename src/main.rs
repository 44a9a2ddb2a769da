mod auth;
mod config;
mod middleware;

mod db;
mod error;
mod models;
mod phone;
mod routes;
mod services;
mod telegram;

#[cfg(test)]
mod testing;

use std::sync::Arc;

use crate::{
    config::Config,
    db::PgStore,
    models::{AppState, Branding},
    telegram::TelegramClient,
};

use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use axum::http::header;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let cfg = Config::from_env()?;
    let pool = db::connect_pg(&cfg.database_url, cfg.db_max_connections).await?;
    let messenger = TelegramClient::new(&cfg.telegram_api_base, &cfg.telegram_bot_token)?;

    if cfg.telegram_webhook_secret.is_none() {
        tracing::warn!("TELEGRAM_WEBHOOK_SECRET not set; webhook endpoint accepts any caller");
    }

    let state = AppState {
        store: Arc::new(PgStore::new(pool)),
        messenger: Arc::new(messenger),
        branding: Branding {
            name: cfg.institution_name.clone(),
            contact: cfg.institution_contact.clone(),
        },
        staff_key_hash: cfg.staff_key_hash.clone(),
        webhook_secret: cfg.telegram_webhook_secret.clone(),
        webhook_url: cfg.webhook_url.clone(),
    };

    // The staff dashboard calls the API from the browser.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::ACCEPT,
        ]);

    let app = routes::router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    tracing::info!(institution = %cfg.institution_name, "Listening on http://{}", cfg.bind_addr);
    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
