//! Database row types and the conversions into the shared API models.
//! Timestamps are stored as RFC 3339 text with microsecond precision so
//! string comparison orders them correctly.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Row;
use tracing::warn;
use uuid::Uuid;

use dreamvault_types::models::{Dream, Profile, Share, ShareType, Tier};

pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            // SQLite's datetime('now') has no timezone: "YYYY-MM-DD HH:MM:SS"
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .ok()
}

fn timestamp_or_default(raw: &str, field: &str, id: &str) -> DateTime<Utc> {
    parse_timestamp(raw).unwrap_or_else(|| {
        warn!("Corrupt {} '{}' on row '{}'", field, raw, id);
        DateTime::default()
    })
}

fn uuid_or_nil(raw: &str, field: &str) -> Uuid {
    raw.parse().unwrap_or_else(|e| {
        warn!("Corrupt {} '{}': {}", field, raw, e);
        Uuid::nil()
    })
}

/// Reads a column that a later migration may not have added yet.
pub(crate) fn optional_column<T: rusqlite::types::FromSql>(
    row: &Row<'_>,
    name: &str,
) -> rusqlite::Result<Option<T>> {
    match row.as_ref().column_index(name) {
        Ok(idx) => row.get(idx),
        Err(_) => Ok(None),
    }
}

pub struct UserRow {
    pub id: String,
    pub email: String,
    pub password: String,
    pub created_at: String,
}

pub struct ProfileRow {
    pub id: String,
    pub user_id: String,
    pub full_name: Option<String>,
    pub subscription_tier: String,
    pub dreams_count: i64,
    pub dreams_limit: i64,
    pub created_at: String,
    pub last_dreams_reset: Option<String>,
    pub avatar_url: Option<String>,
    pub birthday: Option<String>,
    pub timezone: Option<String>,
}

impl ProfileRow {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            full_name: row.get("full_name")?,
            subscription_tier: row.get("subscription_tier")?,
            dreams_count: row.get("dreams_count")?,
            dreams_limit: row.get("dreams_limit")?,
            created_at: row.get("created_at")?,
            last_dreams_reset: row.get("last_dreams_reset")?,
            avatar_url: row.get("avatar_url")?,
            birthday: optional_column(row, "birthday")?,
            timezone: optional_column(row, "timezone")?,
        })
    }

    pub fn into_profile(self) -> Profile {
        let subscription_tier = self.subscription_tier.parse().unwrap_or_else(|e| {
            warn!("{} on profile '{}'", e, self.id);
            Tier::Free
        });
        let last_dreams_reset = match self.last_dreams_reset.as_deref() {
            Some(raw) => timestamp_or_default(raw, "last_dreams_reset", &self.id),
            None => DateTime::default(),
        };

        Profile {
            id: uuid_or_nil(&self.id, "profile id"),
            user_id: uuid_or_nil(&self.user_id, "profile user_id"),
            full_name: self.full_name,
            subscription_tier,
            dreams_count: self.dreams_count,
            dreams_limit: self.dreams_limit,
            created_at: timestamp_or_default(&self.created_at, "created_at", &self.id),
            last_dreams_reset,
            avatar_url: self.avatar_url,
            birthday: self.birthday,
            timezone: self.timezone,
        }
    }
}

pub struct DreamRow {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub content: String,
    pub mood: Option<String>,
    pub created_at: String,
    pub interpretation: Option<String>,
    pub has_artwork: bool,
    pub has_affirmation: bool,
    pub artwork_url: Option<String>,
    pub horoscope: Option<String>,
}

impl DreamRow {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            title: row.get("title")?,
            content: row.get("content")?,
            mood: row.get("mood")?,
            created_at: row.get("created_at")?,
            interpretation: row.get("interpretation")?,
            has_artwork: row.get("has_artwork")?,
            has_affirmation: row.get("has_affirmation")?,
            artwork_url: optional_column(row, "artwork_url")?,
            horoscope: optional_column(row, "horoscope")?,
        })
    }

    pub fn into_dream(self, tags: Vec<String>) -> Dream {
        let json = |raw: Option<String>, field: &str| {
            raw.and_then(|s| match serde_json::from_str(&s) {
                Ok(v) => Some(v),
                Err(e) => {
                    warn!("Corrupt {} JSON on dream '{}': {}", field, self.id, e);
                    None
                }
            })
        };
        let interpretation = json(self.interpretation.clone(), "interpretation");
        let horoscope = json(self.horoscope.clone(), "horoscope");

        Dream {
            id: uuid_or_nil(&self.id, "dream id"),
            user_id: uuid_or_nil(&self.user_id, "dream user_id"),
            created_at: timestamp_or_default(&self.created_at, "created_at", &self.id),
            title: self.title,
            content: self.content,
            mood: self.mood,
            interpretation,
            has_artwork: self.has_artwork,
            has_affirmation: self.has_affirmation,
            artwork_url: self.artwork_url,
            horoscope,
            tags,
        }
    }
}

pub struct ShareRow {
    pub id: String,
    pub dream_id: Option<String>,
    pub share_type: String,
    pub content: String,
    pub title: String,
    pub created_at: String,
    pub expires_at: String,
    pub views: i64,
}

impl ShareRow {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            dream_id: row.get("dream_id")?,
            share_type: row.get("share_type")?,
            content: row.get("content")?,
            title: row.get("title")?,
            created_at: row.get("created_at")?,
            expires_at: row.get("expires_at")?,
            views: row.get("views")?,
        })
    }

    pub fn into_share(self) -> Share {
        let share_type = self.share_type.parse().unwrap_or_else(|e| {
            warn!("{} on share '{}'", e, self.id);
            ShareType::Dream
        });

        Share {
            dream_id: self.dream_id.as_deref().map(|d| uuid_or_nil(d, "share dream_id")),
            share_type,
            content: self.content,
            title: self.title,
            created_at: timestamp_or_default(&self.created_at, "created_at", &self.id),
            expires_at: timestamp_or_default(&self.expires_at, "expires_at", &self.id),
            views: self.views,
            id: self.id,
        }
    }
}
