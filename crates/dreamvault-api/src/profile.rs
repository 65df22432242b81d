use axum::{
    Extension, Json,
    extract::State,
    http::{HeaderMap, header},
    response::IntoResponse,
};
use bytes::Bytes;
use chrono::{NaiveDate, Utc};
use tracing::info;

use dreamvault_db::profiles::ProfileUpdate;
use dreamvault_types::api::{AvatarResponse, Claims, ProfileResponse, UpdateProfileRequest};
use dreamvault_types::quota::QuotaStatus;

use crate::error::ApiError;
use crate::state::{AppState, blocking};
use crate::storage::MAX_AVATAR_BYTES;

pub(crate) fn profiles_missing() -> ApiError {
    ApiError::SchemaMissing("The profiles table does not exist. Please run database setup.".into())
}

/// Birthdays are stored as `YYYY-MM-DD`; anything after the date part is ignored.
pub(crate) fn validate_birthday(raw: &str) -> Result<(), ApiError> {
    let date = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map(|_| ())
        .map_err(|_| ApiError::validation("Birthday must be a date in YYYY-MM-DD format"))
}

/// Blank strings clear the field.
fn field(value: Option<String>) -> Option<Option<String>> {
    value.map(|v| {
        let v = v.trim().to_string();
        if v.is_empty() { None } else { Some(v) }
    })
}

/// Loads (or lazily creates) the caller's profile, heals corrupt fields and
/// applies a due monthly reset.
pub async fn get_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = claims.sub.to_string();
    let loaded = blocking(&state, move |db| {
        let now = Utc::now();
        if db.ensure_profile(&user_id, None, None, now)?.is_none() {
            return Ok(None);
        }
        let repairs = db.heal_profile(&user_id, now)?;
        db.reset_quota_if_due(&user_id, now)?;
        Ok(db.get_profile(&user_id)?.map(|profile| (profile, repairs)))
    })
    .await?;

    let (profile, repairs) = loaded.ok_or_else(profiles_missing)?;
    let quota = QuotaStatus::new(profile.dreams_count, profile.dreams_limit, profile.last_dreams_reset);

    Ok(Json(ProfileResponse { profile, quota, repairs }))
}

pub async fn update_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(birthday) = req.birthday.as_deref().filter(|b| !b.trim().is_empty()) {
        validate_birthday(birthday.trim())?;
    }

    let update = ProfileUpdate {
        full_name: field(req.full_name),
        birthday: field(req.birthday),
        timezone: field(req.timezone),
    };

    let user_id = claims.sub.to_string();
    let profile = blocking(&state, move |db| {
        if db.ensure_profile(&user_id, None, None, Utc::now())?.is_none() {
            return Ok(None);
        }
        db.update_profile(&user_id, &update)?;
        db.get_profile(&user_id)
    })
    .await?
    .ok_or_else(profiles_missing)?;

    Ok(Json(profile))
}

/// Raw image body. Written to the avatar bucket, or stored inline when the
/// bucket is unavailable.
pub async fn upload_avatar(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|v| v.trim().to_ascii_lowercase())
        .unwrap_or_default();
    if !content_type.starts_with("image/") {
        return Err(ApiError::validation("Avatar must be an image"));
    }
    if body.is_empty() {
        return Err(ApiError::validation("Avatar image is empty"));
    }
    if body.len() > MAX_AVATAR_BYTES {
        return Err(ApiError::validation("Avatar must be 5 MB or smaller"));
    }

    let user_id = claims.sub.to_string();
    let stored = state
        .avatars
        .store(&user_id, &content_type, &body)
        .await
        .ok_or_else(|| ApiError::Internal("Avatar storage is unavailable".into()))?;

    let url = stored.url().to_string();
    let saved = blocking(&state, move |db| {
        if db.ensure_profile(&user_id, None, None, Utc::now())?.is_none() {
            return Ok(false);
        }
        db.set_avatar_url(&user_id, Some(&url))
    })
    .await?;
    if !saved {
        return Err(profiles_missing());
    }

    info!("Avatar updated for {} ({})", claims.sub, stored.kind());
    Ok(Json(AvatarResponse {
        url: stored.url().to_string(),
        stored: stored.kind(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn birthday_format() {
        assert!(validate_birthday("1990-07-10").is_ok());
        assert!(validate_birthday("1990-07-10T00:00:00Z").is_ok());
        assert!(validate_birthday("10/07/1990").is_err());
        assert!(validate_birthday("").is_err());
    }

    #[test]
    fn blank_fields_clear() {
        assert_eq!(field(None), None);
        assert_eq!(field(Some("  ".into())), Some(None));
        assert_eq!(field(Some(" Ada ".into())), Some(Some("Ada".into())));
    }
}
