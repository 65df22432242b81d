use anyhow::{Result, bail};
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use rusqlite::OptionalExtension;
use tracing::{info, warn};

use dreamvault_types::models::{Share, ShareType};

use crate::models::{ShareRow, format_timestamp};
use crate::Database;

pub const SHARE_TTL_DAYS: i64 = 30;
pub const SHARE_ID_LEN: usize = 10;
pub const DEFAULT_SHARE_TITLE: &str = "Shared Dream";

/// URL-safe alphabet (64 symbols).
const SHARE_ID_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789_-";

const MAX_ID_ATTEMPTS: usize = 5;

pub fn generate_share_id() -> String {
    let mut rng = rand::rng();
    (0..SHARE_ID_LEN)
        .map(|_| SHARE_ID_ALPHABET[rng.random_range(0..SHARE_ID_ALPHABET.len())] as char)
        .collect()
}

#[derive(Debug, Clone)]
pub struct NewShare {
    pub dream_id: Option<String>,
    pub share_type: ShareType,
    pub content: String,
    pub title: Option<String>,
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    )
}

const SHARE_COLUMNS: &str = "id, dream_id, share_type, content, title, created_at, expires_at, views";

impl Database {
    /// Stores a detached copy of the content that expires after 30 days.
    pub fn create_share(&self, new: &NewShare, now: DateTime<Utc>) -> Result<Share> {
        let title = new
            .title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(DEFAULT_SHARE_TITLE);
        let created_at = format_timestamp(now);
        let expires_at = format_timestamp(now + Duration::days(SHARE_TTL_DAYS));

        self.with_conn(|conn| {
            for _ in 0..MAX_ID_ATTEMPTS {
                let id = generate_share_id();
                let inserted = conn.execute(
                    "INSERT INTO dream_shares
                        (id, dream_id, share_type, content, title, created_at, expires_at, views)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0)",
                    rusqlite::params![
                        id,
                        new.dream_id,
                        new.share_type.as_str(),
                        new.content,
                        title,
                        created_at,
                        expires_at,
                    ],
                );
                match inserted {
                    Ok(_) => {
                        let row = conn.query_row(
                            &format!("SELECT {} FROM dream_shares WHERE id = ?1", SHARE_COLUMNS),
                            [&id],
                            ShareRow::from_row,
                        )?;
                        info!("Share {} created ({})", id, new.share_type.as_str());
                        return Ok(row.into_share());
                    }
                    Err(e) if is_unique_violation(&e) => {
                        warn!("Share id collision on {}, retrying", id);
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            bail!("Could not allocate a unique share id after {} attempts", MAX_ID_ATTEMPTS)
        })
    }

    /// Counts one view and returns the share. `None` when missing or expired.
    pub fn get_shared_content(&self, id: &str, now: DateTime<Utc>) -> Result<Option<Share>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    &format!(
                        "UPDATE dream_shares SET views = views + 1
                         WHERE id = ?1 AND expires_at > ?2
                         RETURNING {}",
                        SHARE_COLUMNS
                    ),
                    [id, format_timestamp(now).as_str()],
                    ShareRow::from_row,
                )
                .optional()?;
            Ok(row.map(ShareRow::into_share))
        })
    }

    /// Deletes every share whose expiry has passed. Returns how many went.
    pub fn prune_expired_shares(&self, now: DateTime<Utc>) -> Result<usize> {
        self.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM dream_shares WHERE expires_at <= ?1",
                [format_timestamp(now)],
            )?;
            Ok(removed)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn setup() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.init_core_schema().unwrap();
        db
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 8, 1, 12, 0, 0).unwrap()
    }

    fn share(content: &str) -> NewShare {
        NewShare {
            dream_id: None,
            share_type: ShareType::Affirmation,
            content: content.into(),
            title: None,
        }
    }

    #[test]
    fn ids_are_short_and_url_safe() {
        let id = generate_share_id();
        assert_eq!(id.len(), SHARE_ID_LEN);
        assert!(id.bytes().all(|b| SHARE_ID_ALPHABET.contains(&b)));
        assert_ne!(generate_share_id(), generate_share_id());
    }

    #[test]
    fn create_sets_defaults_and_expiry() {
        let db = setup();
        let s = db.create_share(&share("I am calm"), now()).unwrap();
        assert_eq!(s.title, DEFAULT_SHARE_TITLE);
        assert_eq!(s.views, 0);
        assert_eq!(s.expires_at, now() + Duration::days(30));
        assert_eq!(s.share_type, ShareType::Affirmation);
    }

    #[test]
    fn each_fetch_counts_one_view() {
        let db = setup();
        let s = db.create_share(&share("I am calm"), now()).unwrap();

        for expected in 1..=3 {
            let fetched = db.get_shared_content(&s.id, now()).unwrap().unwrap();
            assert_eq!(fetched.views, expected);
            assert_eq!(fetched.content, "I am calm");
        }
    }

    #[test]
    fn expired_or_missing_is_none() {
        let db = setup();
        let s = db.create_share(&share("old"), now()).unwrap();
        let later = now() + Duration::days(SHARE_TTL_DAYS) + Duration::seconds(1);

        assert!(db.get_shared_content(&s.id, later).unwrap().is_none());
        assert!(db.get_shared_content("nope", now()).unwrap().is_none());
    }

    #[test]
    fn prune_only_removes_expired() {
        let db = setup();
        db.create_share(&share("old"), now() - Duration::days(40)).unwrap();
        let fresh = db.create_share(&share("new"), now()).unwrap();

        assert_eq!(db.prune_expired_shares(now()).unwrap(), 1);
        assert!(db.get_shared_content(&fresh.id, now()).unwrap().is_some());
    }
}
