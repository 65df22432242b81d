use std::sync::Arc;

use tracing::error;

use dreamvault_ai::LanguageModel;
use dreamvault_db::Database;

use crate::error::ApiError;
use crate::storage::AvatarStore;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub ai: Arc<dyn LanguageModel>,
    pub avatars: AvatarStore,
    pub jwt_secret: String,
    /// Public base URL used to build share links.
    pub app_url: String,
    pub debug: DebugInfo,
}

/// Configuration surfaced (masked) by the debug route.
#[derive(Debug, Clone, Default)]
pub struct DebugInfo {
    pub db_path: String,
    pub openai_api_key: Option<String>,
}

/// Runs blocking SQLite work off the async runtime.
pub async fn blocking<F, T>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal("Internal server error".into())
        })?
        .map_err(ApiError::from)
}
