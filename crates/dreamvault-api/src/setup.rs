use axum::{Json, extract::State, response::IntoResponse};
use serde_json::json;
use tracing::{info, warn};

use dreamvault_db::migrations::MigrationReport;
use dreamvault_types::api::{MigrationResponse, SetupStatusResponse};

use crate::error::ApiError;
use crate::state::{AppState, blocking};

/// Shows the first few characters of a configured value.
fn mask(value: Option<&str>, visible: usize) -> String {
    match value.filter(|v| !v.is_empty()) {
        Some(v) => format!("{}...", v.chars().take(visible).collect::<String>()),
        None => "Not set".to_string(),
    }
}

async fn ensure_avatar_bucket(state: &AppState) {
    if let Err(e) = state.avatars.ensure_bucket().await {
        warn!("Avatar bucket unavailable, uploads will be stored inline: {}", e);
    }
}

/// Core schema, optional columns and the avatar bucket. Safe to repeat.
pub async fn provision(state: &AppState) -> Result<MigrationReport, ApiError> {
    let report = blocking(state, |db| {
        db.init_core_schema()?;
        db.run_column_migrations()
    })
    .await?;
    ensure_avatar_bucket(state).await;
    info!("Provisioning complete, added columns: {:?}", report.added);
    Ok(report)
}

pub async fn check_connection(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let success = blocking(&state, |db| Ok(db.check_connection())).await?;
    Ok(Json(json!({ "success": success })))
}

pub async fn setup_status(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let status = blocking(&state, |db| {
        Ok(SetupStatusResponse {
            tables: db.schema_status(),
            capabilities: db.capabilities(),
        })
    })
    .await?;
    Ok(Json(status))
}

pub async fn init_db(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    blocking(&state, |db| db.init_core_schema()).await?;
    ensure_avatar_bucket(&state).await;
    Ok(Json(MigrationResponse {
        success: true,
        message: "Database initialized successfully".into(),
        added: vec![],
    }))
}

/// Adds optional columns. Fails when the tables they belong to are missing.
pub async fn run_migration(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let report = blocking(&state, |db| db.run_column_migrations()).await?;
    if !report.missing_tables.is_empty() {
        return Err(ApiError::SchemaMissing(format!(
            "Missing tables: {}. Please run database setup first.",
            report.missing_tables.join(", ")
        )));
    }

    let message = if report.added.is_empty() {
        "All migrations already applied"
    } else {
        "Migration completed successfully"
    };
    Ok(Json(MigrationResponse {
        success: true,
        message: message.into(),
        added: report.added,
    }))
}

pub async fn debug(State(state): State<AppState>) -> impl IntoResponse {
    let key = state.debug.openai_api_key.as_deref();
    Json(json!({
        "databasePath": state.debug.db_path,
        "openaiApiKey": mask(key, 5),
        "appUrl": state.app_url,
        "avatarBucket": state.avatars.bucket_dir().map(|d| d.display().to_string()),
        "envVarsPresent": {
            "DREAMVAULT_JWT_SECRET": !state.jwt_secret.is_empty(),
            "OPENAI_API_KEY": key.is_some_and(|k| !k.is_empty()),
        },
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masking() {
        assert_eq!(mask(Some("sk-abcdef123"), 5), "sk-ab...");
        assert_eq!(mask(Some(""), 5), "Not set");
        assert_eq!(mask(None, 5), "Not set");
    }
}
