use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Subscription level. Controls the monthly dream quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    #[default]
    Free,
    Starter,
    Pro,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Free, Tier::Starter, Tier::Pro];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::Starter => "starter",
            Tier::Pro => "pro",
        }
    }

    /// Dreams allowed per monthly window.
    pub fn dreams_limit(&self) -> i64 {
        match self {
            Tier::Free => 5,
            Tier::Starter => 15,
            Tier::Pro => 30,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown subscription tier '{0}'")]
pub struct ParseTierError(pub String);

impl FromStr for Tier {
    type Err = ParseTierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "free" => Ok(Tier::Free),
            "starter" => Ok(Tier::Starter),
            "pro" => Ok(Tier::Pro),
            other => Err(ParseTierError(other.to_string())),
        }
    }
}

/// What a public share link carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShareType {
    Artwork,
    Affirmation,
    Dream,
}

impl ShareType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShareType::Artwork => "artwork",
            ShareType::Affirmation => "affirmation",
            ShareType::Dream => "dream",
        }
    }
}

impl FromStr for ShareType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "artwork" => Ok(ShareType::Artwork),
            "affirmation" => Ok(ShareType::Affirmation),
            "dream" => Ok(ShareType::Dream),
            other => Err(format!("unknown share type '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub user_id: Uuid,
    pub full_name: Option<String>,
    pub subscription_tier: Tier,
    pub dreams_count: i64,
    pub dreams_limit: i64,
    pub created_at: DateTime<Utc>,
    pub last_dreams_reset: DateTime<Utc>,
    pub avatar_url: Option<String>,
    pub birthday: Option<String>,
    pub timezone: Option<String>,
}

/// A journal entry. `interpretation` and `horoscope` are opaque JSON from the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dream {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub content: String,
    pub mood: Option<String>,
    pub created_at: DateTime<Utc>,
    pub interpretation: Option<serde_json::Value>,
    pub has_artwork: bool,
    pub has_affirmation: bool,
    pub artwork_url: Option<String>,
    pub horoscope: Option<serde_json::Value>,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Share {
    pub id: String,
    pub dream_id: Option<Uuid>,
    pub share_type: ShareType,
    pub content: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub views: i64,
}
