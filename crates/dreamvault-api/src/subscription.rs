use axum::{Extension, Json, extract::State, response::IntoResponse};
use chrono::Utc;
use tracing::info;

use dreamvault_types::api::{Claims, SubscriptionRequest, SubscriptionResponse};
use dreamvault_types::models::Tier;

use crate::error::ApiError;
use crate::profile::profiles_missing;
use crate::state::{AppState, blocking};

/// Switches the caller's tier. The dream limit follows the tier.
pub async fn update_subscription(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SubscriptionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let tier: Tier = req
        .new_tier
        .parse()
        .map_err(|_| ApiError::validation("Invalid subscription tier"))?;

    let user_id = claims.sub.to_string();
    let updated = blocking(&state, move |db| {
        if db.ensure_profile(&user_id, None, None, Utc::now())?.is_none() {
            return Ok(false);
        }
        db.set_tier(&user_id, tier)
    })
    .await?;
    if !updated {
        return Err(profiles_missing());
    }

    info!("User {} moved to the {} tier", claims.sub, tier);
    Ok(Json(SubscriptionResponse {
        success: true,
        message: "Subscription updated successfully".into(),
        new_tier: tier.as_str().to_string(),
        dreams_limit: tier.dreams_limit(),
    }))
}
