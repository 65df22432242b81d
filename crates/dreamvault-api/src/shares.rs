use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use chrono::Utc;
use tracing::info;

use dreamvault_db::shares::NewShare;
use dreamvault_types::api::{Claims, CreateShareRequest, CreateShareResponse};
use dreamvault_types::models::ShareType;

use crate::error::ApiError;
use crate::state::{AppState, blocking};

fn shares_missing() -> ApiError {
    ApiError::SchemaMissing("The dream_shares table does not exist. Please run database setup.".into())
}

pub async fn create_share(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateShareRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.share_type.trim().is_empty() || req.content.trim().is_empty() {
        return Err(ApiError::validation("Type and content are required"));
    }
    let share_type: ShareType = req
        .share_type
        .trim()
        .parse()
        .map_err(|_| ApiError::validation("Invalid share type"))?;

    let new = NewShare {
        dream_id: req.dream_id.map(|id| id.to_string()),
        share_type,
        content: req.content,
        title: req.title,
    };
    let share = blocking(&state, move |db| {
        if !db.table_exists("dream_shares") {
            return Ok(None);
        }
        db.create_share(&new, Utc::now()).map(Some)
    })
    .await?
    .ok_or_else(shares_missing)?;

    info!("User {} shared {} as {}", claims.sub, share.share_type.as_str(), share.id);
    Ok(Json(CreateShareResponse {
        share_url: format!("{}/share/{}", state.app_url, share.id),
        share_id: share.id,
    }))
}

/// Public. Each successful fetch counts one view; expired links are gone.
pub async fn get_share(
    State(state): State<AppState>,
    Path(share_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let share = blocking(&state, move |db| {
        if !db.table_exists("dream_shares") {
            return Ok(None);
        }
        db.get_shared_content(&share_id, Utc::now())
    })
    .await?
    .ok_or_else(|| ApiError::not_found("Shared content not found or expired"))?;

    Ok(Json(share))
}
