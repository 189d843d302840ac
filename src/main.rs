//! quillpress - A server-rendered blog with a media CDN client

use anyhow::Result;
use chrono::Utc;
use std::net::SocketAddr;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use quillpress::{
    api::{self, AppState},
    config::{config_path, Config},
    db,
};

/// How often scheduled posts are checked for publication
const PUBLISH_INTERVAL: Duration = Duration::from_secs(60);
/// How often expired sessions and rate-limit windows are dropped
const CLEANUP_INTERVAL: Duration = Duration::from_secs(300);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "quillpress=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting quillpress v{}", env!("CARGO_PKG_VERSION"));

    let path = config_path();
    let config = Config::load_with_env(&path)?;
    config.validate()?;
    tracing::info!("Configuration loaded from {}", path.display());

    let pool = db::create_pool(&config.database).await?;
    db::ping(&pool).await?;
    let pending = db::migrations::pending_count(&pool).await?;
    if pending > 0 {
        let applied = db::migrations::run_migrations(&pool).await?;
        tracing::info!("Applied {} of {} migrations", applied, db::migrations::total_migrations());
    }
    tracing::info!("Database ready");

    if !config.media.is_configured() {
        tracing::warn!("Media CDN is not configured, uploads are disabled");
    }

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = AppState::new(pool, config)?;

    spawn_scheduled_publisher(state.clone());
    spawn_cleanup(state.clone());

    let app = api::build_router(state);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

/// Publish scheduled posts once their time has come
fn spawn_scheduled_publisher(state: AppState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PUBLISH_INTERVAL);
        loop {
            interval.tick().await;
            if let Err(e) = state.post_service.publish_due_scheduled(Utc::now()).await {
                tracing::warn!("Scheduled publishing failed: {}", e);
            }
        }
    });
}

fn spawn_cleanup(state: AppState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(CLEANUP_INTERVAL);
        loop {
            interval.tick().await;
            match state.user_service.cleanup_expired_sessions().await {
                Ok(0) => {}
                Ok(count) => tracing::debug!("Removed {} expired sessions", count),
                Err(e) => tracing::warn!("Session cleanup failed: {}", e),
            }
            state.login_limiter.cleanup().await;
            state.contact_limiter.cleanup().await;
        }
    });
}
