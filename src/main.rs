mod certificates;
mod config;
mod db;
mod error;
mod mail;
mod pdf;
mod placement;
mod roster;
mod routes;
mod state;
mod storage;
mod templates;

use axum::{extract::DefaultBodyLimit, routing::get, Router};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "certdesk=info,tower_http=info".into()),
        )
        .init();

    let config = Arc::new(config::Config::from_env()?);

    let storage = storage::Storage::new(&config.storage_root);
    storage.ensure_dirs()?;

    let pool = db::create_pool(&config.database_url).await?;
    db::run_migrations(pool.as_ref()).await?;

    let mailer = mail::SmtpMailer::from_config(config.smtp.as_ref(), config.email_delay)?;

    let state = Arc::new(state::AppState {
        pool,
        config: config.clone(),
        storage,
        mailer,
    });

    let app = Router::new()
        .route("/", get(routes::pages::index))
        .nest("/api", routes::api_router())
        .nest_service("/storage", ServeDir::new(&config.storage_root))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = format!("{}:{}", config.host, config.port);
    tracing::info!(storage = %config.storage_root.display(), "certdesk listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
