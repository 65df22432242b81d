mod cleanup;
mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use dreamvault_ai::OpenAiClient;
use dreamvault_api::storage::AvatarStore;
use dreamvault_api::{AppState, AppStateInner, DebugInfo, setup};
use dreamvault_db::Database;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dreamvault=debug,tower_http=debug".into()),
        )
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("FATAL: {}", e);
            std::process::exit(1);
        }
    };

    let db = Database::open(&config.db_path)?;

    let ai = OpenAiClient::new(config.openai_api_key.clone(), config.openai_base_url.clone());
    if config.openai_api_key.is_none() {
        warn!("OPENAI_API_KEY not set; AI routes will return fallbacks or errors");
    }

    let state: AppState = Arc::new(AppStateInner {
        db,
        ai: Arc::new(ai),
        avatars: AvatarStore::new(config.storage_dir.clone()),
        jwt_secret: config.jwt_secret.clone(),
        app_url: config.app_url.clone(),
        debug: DebugInfo {
            db_path: config.db_path.display().to_string(),
            openai_api_key: config.openai_api_key.clone(),
        },
    });

    if config.auto_setup {
        match setup::provision(&state).await {
            Ok(report) if !report.added.is_empty() => info!("Auto-setup added columns: {:?}", report.added),
            Ok(_) => info!("Auto-setup: schema already up to date"),
            Err(e) => warn!("Auto-setup failed, run /api/init-db manually: {}", e),
        }
    }

    tokio::spawn(cleanup::run_share_cleanup_loop(state.clone(), config.share_cleanup_secs));

    let avatar_dir = config.storage_dir.join(dreamvault_api::storage::AVATAR_BUCKET);
    let app = dreamvault_api::router(state)
        .nest_service("/avatars", ServeDir::new(avatar_dir))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("DreamVault server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(signal) => signal,
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
                return;
            }
        };
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
