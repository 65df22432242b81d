use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Dream, Profile};
use crate::quota::QuotaStatus;

// -- JWT Claims --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub full_name: Option<String>,
    pub birthday: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user_id: Uuid,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user_id: Uuid,
    pub email: String,
    pub token: String,
}

// -- Profile --

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    #[serde(flatten)]
    pub profile: Profile,
    pub quota: QuotaStatus,
    /// Corrupt fields that were repaired while loading the profile.
    pub repairs: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateProfileRequest {
    pub full_name: Option<String>,
    pub birthday: Option<String>,
    pub timezone: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AvatarResponse {
    pub url: String,
    /// "bucket" when written to avatar storage, "inline" for the base64 fallback.
    pub stored: &'static str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionRequest {
    pub new_tier: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionResponse {
    pub success: bool,
    pub message: String,
    pub new_tier: String,
    pub dreams_limit: i64,
}

// -- Dreams --

#[derive(Debug, Deserialize)]
pub struct CreateDreamRequest {
    pub title: String,
    pub content: String,
    pub mood: Option<String>,
    pub interpretation: Option<serde_json::Value>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateDreamResponse {
    #[serde(flatten)]
    pub dream: Dream,
    pub quota: Option<QuotaStatus>,
}

// -- AI --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DreamTextRequest {
    #[serde(default)]
    pub dream_text: String,
}

#[derive(Debug, Serialize)]
pub struct TitleResponse {
    pub title: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtworkRequest {
    pub dream_id: Option<Uuid>,
    pub dream_text: Option<String>,
    pub interpretation: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtworkResponse {
    pub image_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HoroscopeRequest {
    pub dream_id: Option<Uuid>,
    #[serde(default)]
    pub dream_text: String,
    pub interpretation: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HoroscopeResponse {
    pub horoscope: serde_json::Value,
    pub zodiac_sign: String,
}

// -- Shares --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateShareRequest {
    #[serde(rename = "type", default)]
    pub share_type: String,
    #[serde(default)]
    pub content: String,
    pub dream_id: Option<Uuid>,
    pub title: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateShareResponse {
    pub share_id: String,
    pub share_url: String,
}

// -- Setup --

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaStatus {
    pub all_tables_exist: bool,
    pub profiles_exist: bool,
    pub dreams_exist: bool,
    pub tags_exist: bool,
    pub shares_exist: bool,
}

/// Optional columns added by the column migrations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    pub artwork_url: bool,
    pub birthday: bool,
    pub timezone: bool,
    pub horoscope: bool,
}

#[derive(Debug, Serialize)]
pub struct SetupStatusResponse {
    pub tables: SchemaStatus,
    pub capabilities: Capabilities,
}

#[derive(Debug, Serialize)]
pub struct MigrationResponse {
    pub success: bool,
    pub message: String,
    pub added: Vec<String>,
}
