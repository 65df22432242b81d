use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};
use tracing::{info, warn};
use uuid::Uuid;

use dreamvault_types::models::{Profile, Tier};
use dreamvault_types::quota::{QuotaStatus, reset_due};

use crate::models::{ProfileRow, format_timestamp, parse_timestamp};
use crate::probe::{column_exists, table_exists};
use crate::Database;

/// Avatar values longer than this are a corrupted base64 upload.
pub const AVATAR_URL_MAX_LEN: usize = 1_000_000;

/// Partial profile update. Outer `None` leaves the field alone, `Some(None)` clears it.
#[derive(Debug, Default)]
pub struct ProfileUpdate {
    pub full_name: Option<Option<String>>,
    pub birthday: Option<Option<String>>,
    pub timezone: Option<Option<String>>,
}

#[derive(Debug)]
pub enum QuotaOutcome {
    /// One dream was counted against the quota.
    Consumed(QuotaStatus),
    /// The window is used up; nothing changed.
    Exhausted(QuotaStatus),
    NoProfile,
}

pub(crate) fn query_profile(conn: &Connection, user_id: &str) -> Result<Option<ProfileRow>> {
    if !table_exists(conn, "profiles") {
        return Ok(None);
    }
    let row = conn
        .query_row(
            "SELECT * FROM profiles WHERE user_id = ?1",
            [user_id],
            ProfileRow::from_row,
        )
        .optional()?;
    Ok(row)
}

fn insert_profile(
    conn: &Connection,
    user_id: &str,
    full_name: Option<&str>,
    birthday: Option<&str>,
    now: DateTime<Utc>,
) -> Result<bool> {
    let ts = format_timestamp(now);
    let birthday = if column_exists(conn, "profiles", "birthday") {
        birthday
    } else {
        if birthday.is_some() {
            warn!("profiles.birthday column missing, dropping birthday for {}", user_id);
        }
        None
    };

    let inserted = conn.execute(
        "INSERT OR IGNORE INTO profiles
            (id, user_id, full_name, subscription_tier, dreams_count, dreams_limit,
             created_at, last_dreams_reset, birthday)
         VALUES (?1, ?2, ?3, ?4, 0, ?5, ?6, ?6, ?7)",
        rusqlite::params![
            Uuid::new_v4().to_string(),
            user_id,
            full_name,
            Tier::Free.as_str(),
            Tier::Free.dreams_limit(),
            ts,
            birthday,
        ],
    )?;
    Ok(inserted > 0)
}

/// Zeroes the counter when the monthly window has elapsed. The update is
/// conditioned on the previously read stamp so two racing resets apply once.
pub(crate) fn reset_quota_if_due(conn: &Connection, user_id: &str, now: DateTime<Utc>) -> Result<bool> {
    let last: Option<Option<String>> = conn
        .query_row(
            "SELECT last_dreams_reset FROM profiles WHERE user_id = ?1",
            [user_id],
            |row| row.get(0),
        )
        .optional()?;

    let Some(raw) = last else {
        return Ok(false);
    };

    let due = match raw.as_deref().and_then(parse_timestamp) {
        Some(last_reset) => reset_due(last_reset, now),
        None => true,
    };
    if !due {
        return Ok(false);
    }

    let changed = conn.execute(
        "UPDATE profiles SET dreams_count = 0, last_dreams_reset = ?1
         WHERE user_id = ?2 AND last_dreams_reset IS ?3",
        rusqlite::params![format_timestamp(now), user_id, raw],
    )?;
    if changed > 0 {
        info!("Monthly dream quota reset for {}", user_id);
    }
    Ok(changed > 0)
}

/// Counts one dream against the quota with a single conditional update, so
/// concurrent creations can never push the count past the limit.
pub(crate) fn try_consume_quota(conn: &Connection, user_id: &str) -> Result<QuotaOutcome> {
    let to_status = |count: i64, limit: i64, last: Option<String>| {
        let last_reset = last.as_deref().and_then(parse_timestamp).unwrap_or_default();
        QuotaStatus::new(count, limit, last_reset)
    };

    let consumed = conn
        .query_row(
            "UPDATE profiles SET dreams_count = dreams_count + 1
             WHERE user_id = ?1 AND dreams_count < dreams_limit
             RETURNING dreams_count, dreams_limit, last_dreams_reset",
            [user_id],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?, row.get::<_, Option<String>>(2)?)),
        )
        .optional()?;

    if let Some((count, limit, last)) = consumed {
        return Ok(QuotaOutcome::Consumed(to_status(count, limit, last)));
    }

    let current = conn
        .query_row(
            "SELECT dreams_count, dreams_limit, last_dreams_reset FROM profiles WHERE user_id = ?1",
            [user_id],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?, row.get::<_, Option<String>>(2)?)),
        )
        .optional()?;

    Ok(match current {
        Some((count, limit, last)) => QuotaOutcome::Exhausted(to_status(count, limit, last)),
        None => QuotaOutcome::NoProfile,
    })
}

fn heal(conn: &Connection, user_id: &str, now: DateTime<Utc>) -> Result<Vec<String>> {
    let Some(row) = query_profile(conn, user_id)? else {
        return Ok(vec![]);
    };
    let mut repairs = Vec::new();

    if row.avatar_url.as_ref().is_some_and(|url| url.len() > AVATAR_URL_MAX_LEN) {
        conn.execute("UPDATE profiles SET avatar_url = NULL WHERE user_id = ?1", [user_id])?;
        repairs.push("avatar_url".to_string());
    }

    match row.subscription_tier.parse::<Tier>() {
        Ok(tier) => {
            if row.dreams_limit != tier.dreams_limit() {
                conn.execute(
                    "UPDATE profiles SET dreams_limit = ?1 WHERE user_id = ?2",
                    rusqlite::params![tier.dreams_limit(), user_id],
                )?;
                repairs.push("dreams_limit".to_string());
            }
        }
        Err(_) => {
            conn.execute(
                "UPDATE profiles SET subscription_tier = ?1, dreams_limit = ?2 WHERE user_id = ?3",
                rusqlite::params![Tier::Free.as_str(), Tier::Free.dreams_limit(), user_id],
            )?;
            repairs.push("subscription_tier".to_string());
        }
    }

    if row.dreams_count < 0 {
        conn.execute("UPDATE profiles SET dreams_count = 0 WHERE user_id = ?1", [user_id])?;
        repairs.push("dreams_count".to_string());
    }

    if row.last_dreams_reset.as_deref().and_then(parse_timestamp).is_none() {
        conn.execute(
            "UPDATE profiles SET last_dreams_reset = ?1 WHERE user_id = ?2",
            rusqlite::params![format_timestamp(now), user_id],
        )?;
        repairs.push("last_dreams_reset".to_string());
    }

    if !repairs.is_empty() {
        warn!("Repaired corrupt profile fields for {}: {:?}", user_id, repairs);
    }
    Ok(repairs)
}

impl Database {
    /// `None` when the profiles table is missing or the user has no row.
    pub fn get_profile(&self, user_id: &str) -> Result<Option<Profile>> {
        self.with_conn(|conn| Ok(query_profile(conn, user_id)?.map(ProfileRow::into_profile)))
    }

    /// Free-tier profile with a fresh quota window. Returns false if one already existed.
    pub fn create_profile(
        &self,
        user_id: &str,
        full_name: Option<&str>,
        birthday: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        self.with_conn(|conn| insert_profile(conn, user_id, full_name, birthday, now))
    }

    /// Loads the profile, creating it on first visit. `None` only when the table is missing.
    pub fn ensure_profile(
        &self,
        user_id: &str,
        full_name: Option<&str>,
        birthday: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Option<Profile>> {
        self.with_conn(|conn| {
            if !table_exists(conn, "profiles") {
                return Ok(None);
            }
            if insert_profile(conn, user_id, full_name, birthday, now)? {
                info!("Created profile for {}", user_id);
            }
            Ok(query_profile(conn, user_id)?.map(ProfileRow::into_profile))
        })
    }

    /// Applies the provided fields. Fields whose column does not exist yet are skipped.
    pub fn update_profile(&self, user_id: &str, update: &ProfileUpdate) -> Result<bool> {
        self.with_conn(|conn| {
            if !table_exists(conn, "profiles") {
                return Ok(false);
            }

            let mut sets: Vec<String> = Vec::new();
            let mut values: Vec<Option<String>> = Vec::new();
            for (column, value) in [
                ("full_name", &update.full_name),
                ("birthday", &update.birthday),
                ("timezone", &update.timezone),
            ] {
                let Some(value) = value else { continue };
                if !column_exists(conn, "profiles", column) {
                    warn!("profiles.{} column missing, skipping update for {}", column, user_id);
                    continue;
                }
                values.push(value.clone());
                sets.push(format!("{} = ?{}", column, values.len()));
            }

            if sets.is_empty() {
                return Ok(query_profile(conn, user_id)?.is_some());
            }

            values.push(Some(user_id.to_string()));
            let sql = format!(
                "UPDATE profiles SET {} WHERE user_id = ?{}",
                sets.join(", "),
                values.len()
            );
            let changed = conn.execute(&sql, rusqlite::params_from_iter(values.iter()))?;
            Ok(changed > 0)
        })
    }

    pub fn reset_quota_if_due(&self, user_id: &str, now: DateTime<Utc>) -> Result<bool> {
        self.with_conn(|conn| {
            if !table_exists(conn, "profiles") {
                return Ok(false);
            }
            reset_quota_if_due(conn, user_id, now)
        })
    }

    /// Reset-if-due followed by the conditional increment, in one transaction.
    pub fn consume_quota(&self, user_id: &str, now: DateTime<Utc>) -> Result<QuotaOutcome> {
        self.with_conn(|conn| {
            if !table_exists(conn, "profiles") {
                return Ok(QuotaOutcome::NoProfile);
            }
            let tx = conn.unchecked_transaction()?;
            reset_quota_if_due(&tx, user_id, now)?;
            let outcome = try_consume_quota(&tx, user_id)?;
            tx.commit()?;
            Ok(outcome)
        })
    }

    /// Changes the tier and its dream limit together. False when the user has no profile.
    pub fn set_tier(&self, user_id: &str, tier: Tier) -> Result<bool> {
        self.with_conn(|conn| {
            if !table_exists(conn, "profiles") {
                return Ok(false);
            }
            let changed = conn.execute(
                "UPDATE profiles SET subscription_tier = ?1, dreams_limit = ?2 WHERE user_id = ?3",
                rusqlite::params![tier.as_str(), tier.dreams_limit(), user_id],
            )?;
            Ok(changed > 0)
        })
    }

    /// Repairs corrupt profile data in place and names the fields it fixed.
    pub fn heal_profile(&self, user_id: &str, now: DateTime<Utc>) -> Result<Vec<String>> {
        self.with_conn(|conn| heal(conn, user_id, now))
    }

    pub fn set_avatar_url(&self, user_id: &str, url: Option<&str>) -> Result<bool> {
        self.with_conn(|conn| {
            if !table_exists(conn, "profiles") {
                return Ok(false);
            }
            let changed = conn.execute(
                "UPDATE profiles SET avatar_url = ?1 WHERE user_id = ?2",
                rusqlite::params![url, user_id],
            )?;
            Ok(changed > 0)
        })
    }
}
