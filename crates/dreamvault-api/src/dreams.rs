use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use dreamvault_ai::dreams::{artwork_prompt, generate_artwork};
use dreamvault_db::dreams::{CreateDreamOutcome, NewDream};
use dreamvault_types::api::{Claims, CreateDreamRequest, CreateDreamResponse};
use dreamvault_types::models::Dream;

use crate::error::ApiError;
use crate::state::{AppState, blocking};

pub(crate) fn dreams_missing() -> ApiError {
    ApiError::SchemaMissing("The dreams table does not exist. Please run database setup.".into())
}

async fn require_dreams_table(state: &AppState) -> Result<(), ApiError> {
    if blocking(state, |db| Ok(db.table_exists("dreams"))).await? {
        Ok(())
    } else {
        Err(dreams_missing())
    }
}

/// Generates artwork for a freshly saved dream and stores its URL. Any
/// failure leaves the dream without artwork.
async fn attach_artwork(state: &AppState, dream: &mut Dream) {
    let Some(interpretation) = dream.interpretation.as_ref() else {
        return;
    };
    if !state.ai.is_configured() {
        return;
    }
    match blocking(state, |db| Ok(db.capabilities().artwork_url)).await {
        Ok(true) => {}
        Ok(false) => {
            warn!("dreams.artwork_url column missing, skipping artwork for {}", dream.id);
            return;
        }
        Err(_) => return,
    }

    let prompt = artwork_prompt(Some(dream.content.as_str()), Some(interpretation));
    let url = match generate_artwork(state.ai.as_ref(), prompt).await {
        Ok(url) => url,
        Err(e) => {
            warn!("Artwork generation failed for dream {}: {}", dream.id, e);
            return;
        }
    };

    let dream_id = dream.id.to_string();
    let stored_url = url.clone();
    match blocking(state, move |db| db.set_artwork_url(&dream_id, &stored_url)).await {
        Ok(true) => {
            dream.artwork_url = Some(url);
            dream.has_artwork = true;
        }
        Ok(false) => warn!("Dream {} vanished before artwork could be saved", dream.id),
        Err(e) => warn!("Saving artwork for dream {} failed: {}", dream.id, e),
    }
}

pub async fn create_dream(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateDreamRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let title = req.title.trim().to_string();
    let content = req.content.trim().to_string();
    if title.is_empty() || content.is_empty() {
        return Err(ApiError::validation("Title and content are required"));
    }

    require_dreams_table(&state).await?;

    let new = NewDream {
        user_id: claims.sub.to_string(),
        title,
        content,
        mood: req.mood.filter(|m| !m.trim().is_empty()),
        interpretation: req.interpretation.filter(|i| !i.is_null()),
        tags: req.tags,
    };
    let outcome = blocking(&state, move |db| db.create_dream(&new, Utc::now())).await?;

    let (mut dream, quota) = match outcome {
        CreateDreamOutcome::Created { dream, quota } => (dream, quota),
        CreateDreamOutcome::QuotaExceeded(quota) => {
            info!("User {} hit the dream limit ({})", claims.sub, quota.dreams_limit);
            return Err(ApiError::QuotaExceeded {
                message: format!(
                    "You have reached your limit of {} dreams this month. Upgrade your plan to record more.",
                    quota.dreams_limit
                ),
                quota,
            });
        }
    };

    attach_artwork(&state, &mut dream).await;

    Ok((StatusCode::CREATED, Json(CreateDreamResponse { dream, quota })))
}

pub async fn list_dreams(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = claims.sub.to_string();
    let dreams = blocking(&state, move |db| db.list_dreams(&user_id)).await?;
    Ok(Json(dreams))
}

pub async fn get_dream(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(dream_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    require_dreams_table(&state).await?;
    let user_id = claims.sub.to_string();
    let dream = blocking(&state, move |db| db.get_dream(&user_id, &dream_id.to_string()))
        .await?
        .ok_or_else(|| ApiError::not_found("Dream not found"))?;
    Ok(Json(dream))
}

pub async fn delete_dream(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(dream_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    require_dreams_table(&state).await?;
    let user_id = claims.sub.to_string();
    let deleted = blocking(&state, move |db| db.delete_dream(&user_id, &dream_id.to_string())).await?;
    if !deleted {
        return Err(ApiError::not_found("Dream not found"));
    }
    info!("Dream {} deleted by {}", dream_id, claims.sub);
    Ok(StatusCode::NO_CONTENT)
}
