use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde_json::json;
use tracing::{error, info, warn};

use dreamvault_ai::AiError;
use dreamvault_ai::dreams::{
    UNTITLED_DREAM, artwork_prompt, generate_artwork, generate_horoscope, generate_title, interpret_dream,
};
use dreamvault_types::api::{
    ArtworkRequest, ArtworkResponse, Claims, DreamTextRequest, HoroscopeRequest, HoroscopeResponse, TitleResponse,
};
use dreamvault_types::zodiac::zodiac_from_str;

use crate::error::ApiError;
use crate::profile::profiles_missing;
use crate::state::{AppState, blocking};

const BIRTHDAY_REQUIRED: &str = "Please set your birthday in settings to generate horoscopes";

fn require_dream_text(text: &str) -> Result<&str, ApiError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(ApiError::validation("Dream text is required"));
    }
    Ok(text)
}

/// Always answers 200 with a JSON interpretation; model failures produce a
/// fallback document carrying an `error` field.
pub async fn interpret(
    State(state): State<AppState>,
    Json(req): Json<DreamTextRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let text = require_dream_text(&req.dream_text)?;
    Ok(Json(interpret_dream(state.ai.as_ref(), text).await))
}

pub async fn title(
    State(state): State<AppState>,
    Json(req): Json<DreamTextRequest>,
) -> Result<Response, ApiError> {
    let text = require_dream_text(&req.dream_text)?;
    match generate_title(state.ai.as_ref(), text).await {
        Ok(title) => Ok(Json(TitleResponse { title }).into_response()),
        Err(e) => {
            error!("Title generation failed: {}", e);
            Ok((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Failed to generate title", "title": UNTITLED_DREAM })),
            )
                .into_response())
        }
    }
}

/// Generates artwork from text or an interpretation. With a `dreamId` the
/// URL is also saved on the caller's dream, best-effort.
pub async fn artwork(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ArtworkRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let text = req.dream_text.as_deref().map(str::trim).filter(|t| !t.is_empty());
    let interpretation = req.interpretation.as_ref().filter(|i| !i.is_null());
    if text.is_none() && interpretation.is_none() {
        return Err(ApiError::validation("Dream text or interpretation is required"));
    }
    if !state.ai.is_configured() {
        return Err(AiError::NotConfigured.into());
    }

    let prompt = artwork_prompt(text, interpretation);
    let image_url = generate_artwork(state.ai.as_ref(), prompt).await?;

    if let Some(dream_id) = req.dream_id {
        let user_id = claims.sub.to_string();
        let url = image_url.clone();
        let saved = blocking(&state, move |db| {
            let dream_id = dream_id.to_string();
            if db.get_dream(&user_id, &dream_id)?.is_none() {
                return Ok(false);
            }
            db.set_artwork_url(&dream_id, &url)
        })
        .await;
        match saved {
            Ok(true) => info!("Artwork saved on dream {}", dream_id),
            Ok(false) => warn!("Artwork for dream {} not saved (missing dream or column)", dream_id),
            Err(e) => warn!("Saving artwork on dream {} failed: {}", dream_id, e),
        }
    }

    Ok(Json(ArtworkResponse { image_url }))
}

/// Horoscope for the caller's zodiac sign, derived from the profile birthday.
pub async fn horoscope(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<HoroscopeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let text = require_dream_text(&req.dream_text)?;

    if !blocking(&state, |db| Ok(db.capabilities().birthday)).await? {
        return Err(ApiError::SchemaMissing(
            "Birthday column does not exist in the database. Please run the migration to add the birthday column."
                .into(),
        ));
    }

    let user_id = claims.sub.to_string();
    let profile = blocking(&state, move |db| db.ensure_profile(&user_id, None, None, Utc::now()))
        .await?
        .ok_or_else(profiles_missing)?;

    let birthday = profile
        .birthday
        .as_deref()
        .filter(|b| !b.trim().is_empty())
        .ok_or_else(|| ApiError::validation(BIRTHDAY_REQUIRED))?;
    let sign = zodiac_from_str(birthday)
        .ok_or_else(|| ApiError::validation("Could not determine zodiac sign from birthday"))?;

    let interpretation = req.interpretation.as_ref().filter(|i| !i.is_null());
    let horoscope = generate_horoscope(
        state.ai.as_ref(),
        text,
        interpretation,
        sign.as_str(),
        Utc::now().date_naive(),
    )
    .await?;

    if let Some(dream_id) = req.dream_id {
        let user_id = claims.sub.to_string();
        let value = horoscope.clone();
        let saved = blocking(&state, move |db| db.set_horoscope(&user_id, &dream_id.to_string(), &value))
            .await
            .map_err(|_| ApiError::Internal("Failed to save horoscope to dream".into()))?;
        if !saved {
            warn!("Horoscope for dream {} not saved (missing dream or column)", dream_id);
        }
    }

    Ok(Json(HoroscopeResponse {
        horoscope,
        zodiac_sign: sign.as_str().to_string(),
    }))
}
