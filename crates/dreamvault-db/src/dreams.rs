use std::collections::HashMap;

use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};
use tracing::{info, warn};
use uuid::Uuid;

use dreamvault_types::models::Dream;
use dreamvault_types::quota::QuotaStatus;

use crate::models::{DreamRow, format_timestamp};
use crate::probe::{column_exists, table_exists};
use crate::profiles::{QuotaOutcome, reset_quota_if_due, try_consume_quota};
use crate::Database;

#[derive(Debug, Clone)]
pub struct NewDream {
    pub user_id: String,
    pub title: String,
    pub content: String,
    pub mood: Option<String>,
    pub interpretation: Option<serde_json::Value>,
    pub tags: Vec<String>,
}

#[derive(Debug)]
pub enum CreateDreamOutcome {
    /// `quota` is `None` when quota tracking was unavailable and skipped.
    Created {
        dream: Dream,
        quota: Option<QuotaStatus>,
    },
    /// Rejected before anything was written.
    QuotaExceeded(QuotaStatus),
}

fn query_tags(conn: &Connection, dream_ids: &[String]) -> Result<HashMap<String, Vec<String>>> {
    let mut by_dream: HashMap<String, Vec<String>> = HashMap::new();
    if dream_ids.is_empty() || !table_exists(conn, "dream_tags") {
        return Ok(by_dream);
    }

    let placeholders: Vec<String> = (1..=dream_ids.len()).map(|i| format!("?{}", i)).collect();
    let sql = format!(
        "SELECT dream_id, tag FROM dream_tags WHERE dream_id IN ({}) ORDER BY rowid",
        placeholders.join(", ")
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(dream_ids.iter()), |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    for (dream_id, tag) in rows {
        by_dream.entry(dream_id).or_default().push(tag);
    }
    Ok(by_dream)
}

fn query_dream(conn: &Connection, user_id: &str, dream_id: &str) -> Result<Option<DreamRow>> {
    let row = conn
        .query_row(
            "SELECT * FROM dreams WHERE id = ?1 AND user_id = ?2",
            [dream_id, user_id],
            DreamRow::from_row,
        )
        .optional()?;
    Ok(row)
}

fn insert_dream(conn: &Connection, id: &str, new: &NewDream, tags: &[String], now: DateTime<Utc>) -> Result<()> {
    let interpretation = new
        .interpretation
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;
    let has_interpretation = new.interpretation.is_some();

    conn.execute(
        "INSERT INTO dreams
            (id, user_id, title, content, mood, created_at, interpretation, has_artwork, has_affirmation)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        rusqlite::params![
            id,
            new.user_id,
            new.title,
            new.content,
            new.mood,
            format_timestamp(now),
            interpretation,
            has_interpretation,
            has_interpretation,
        ],
    )?;

    if tags.is_empty() {
        return Ok(());
    }
    if !table_exists(conn, "dream_tags") {
        warn!("dream_tags table missing, dropping {} tags for dream {}", tags.len(), id);
        return Ok(());
    }
    let mut stmt = conn.prepare("INSERT INTO dream_tags (id, dream_id, tag) VALUES (?1, ?2, ?3)")?;
    for tag in tags {
        stmt.execute((Uuid::new_v4().to_string(), id, tag))?;
    }
    Ok(())
}

/// Blank tags are dropped; duplicates are kept as given.
fn clean_tags(tags: &[String]) -> Vec<String> {
    tags.iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

impl Database {
    /// Quota check, dream row and tag rows commit or roll back together.
    ///
    /// When the profiles table or the user's profile is missing the quota is
    /// skipped and the dream is still written.
    pub fn create_dream(&self, new: &NewDream, now: DateTime<Utc>) -> Result<CreateDreamOutcome> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;

            let quota = if table_exists(&tx, "profiles") {
                reset_quota_if_due(&tx, &new.user_id, now)?;
                match try_consume_quota(&tx, &new.user_id)? {
                    QuotaOutcome::Consumed(status) => Some(status),
                    QuotaOutcome::Exhausted(status) => {
                        tx.rollback()?;
                        return Ok(CreateDreamOutcome::QuotaExceeded(status));
                    }
                    QuotaOutcome::NoProfile => {
                        warn!("No profile for {}, dream not counted against a quota", new.user_id);
                        None
                    }
                }
            } else {
                warn!("profiles table missing, skipping quota for {}", new.user_id);
                None
            };

            let id = Uuid::new_v4().to_string();
            let tags = clean_tags(&new.tags);
            insert_dream(&tx, &id, new, &tags, now)?;

            let row = query_dream(&tx, &new.user_id, &id)?
                .ok_or_else(|| anyhow::anyhow!("Dream {} vanished after insert", id))?;
            tx.commit()?;

            info!("Dream {} created for {}", id, new.user_id);
            Ok(CreateDreamOutcome::Created {
                dream: row.into_dream(tags),
                quota,
            })
        })
    }

    /// Newest first, tags attached. Empty when the dreams table is missing.
    pub fn list_dreams(&self, user_id: &str) -> Result<Vec<Dream>> {
        self.with_conn(|conn| {
            if !table_exists(conn, "dreams") {
                warn!("dreams table missing, returning no dreams");
                return Ok(vec![]);
            }

            let mut stmt = conn.prepare(
                "SELECT * FROM dreams WHERE user_id = ?1 ORDER BY created_at DESC, rowid DESC",
            )?;
            let rows = stmt
                .query_map([user_id], DreamRow::from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();
            let mut tags = query_tags(conn, &ids)?;

            Ok(rows
                .into_iter()
                .map(|row| {
                    let dream_tags = tags.remove(&row.id).unwrap_or_default();
                    row.into_dream(dream_tags)
                })
                .collect())
        })
    }

    /// `None` when missing, owned by someone else, or the table does not exist.
    pub fn get_dream(&self, user_id: &str, dream_id: &str) -> Result<Option<Dream>> {
        self.with_conn(|conn| {
            if !table_exists(conn, "dreams") {
                return Ok(None);
            }
            let Some(row) = query_dream(conn, user_id, dream_id)? else {
                return Ok(None);
            };
            let mut tags = query_tags(conn, std::slice::from_ref(&row.id))?;
            let dream_tags = tags.remove(&row.id).unwrap_or_default();
            Ok(Some(row.into_dream(dream_tags)))
        })
    }

    /// Removes the dream's tags, then the dream. False when nothing matched.
    pub fn delete_dream(&self, user_id: &str, dream_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            if !table_exists(conn, "dreams") {
                return Ok(false);
            }
            let tx = conn.unchecked_transaction()?;

            let owned: Option<i64> = tx
                .query_row(
                    "SELECT 1 FROM dreams WHERE id = ?1 AND user_id = ?2",
                    [dream_id, user_id],
                    |row| row.get(0),
                )
                .optional()?;
            if owned.is_none() {
                return Ok(false);
            }

            if table_exists(&tx, "dream_tags") {
                tx.execute("DELETE FROM dream_tags WHERE dream_id = ?1", [dream_id])?;
            }
            tx.execute("DELETE FROM dreams WHERE id = ?1", [dream_id])?;
            tx.commit()?;

            info!("Dream {} deleted by {}", dream_id, user_id);
            Ok(true)
        })
    }

    /// No-op returning false when the `artwork_url` column has not been migrated in.
    pub fn set_artwork_url(&self, dream_id: &str, url: &str) -> Result<bool> {
        self.with_conn(|conn| {
            if !column_exists(conn, "dreams", "artwork_url") {
                return Ok(false);
            }
            let changed = conn.execute(
                "UPDATE dreams SET artwork_url = ?1, has_artwork = 1 WHERE id = ?2",
                [url, dream_id],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn set_horoscope(&self, user_id: &str, dream_id: &str, horoscope: &serde_json::Value) -> Result<bool> {
        self.with_conn(|conn| {
            if !column_exists(conn, "dreams", "horoscope") {
                return Ok(false);
            }
            let changed = conn.execute(
                "UPDATE dreams SET horoscope = ?1 WHERE id = ?2 AND user_id = ?3",
                [serde_json::to_string(horoscope)?.as_str(), dream_id, user_id],
            )?;
            Ok(changed > 0)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn at(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, d, 8, 0, 0).unwrap()
    }

    fn setup() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.init_core_schema().unwrap();
        db.create_profile("u1", None, None, at(1)).unwrap();
        db
    }

    fn new_dream(title: &str, tags: &[&str]) -> NewDream {
        NewDream {
            user_id: "u1".into(),
            title: title.into(),
            content: "I was flying over a city of glass".into(),
            mood: Some("curious".into()),
            interpretation: None,
            tags: tags.iter().map(|t| t.to_string()).collect(),
        }
    }

    fn count(db: &Database, table: &str) -> i64 {
        db.with_conn(|conn| {
            Ok(conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| r.get(0))?)
        })
        .unwrap()
    }

    fn created(outcome: CreateDreamOutcome) -> (Dream, Option<QuotaStatus>) {
        match outcome {
            CreateDreamOutcome::Created { dream, quota } => (dream, quota),
            CreateDreamOutcome::QuotaExceeded(s) => panic!("quota exceeded: {:?}", s),
        }
    }

    #[test]
    fn create_with_tags_and_interpretation() {
        let db = setup();
        let mut new = new_dream("Glass city", &["flying", " ", "city"]);
        new.interpretation = Some(json!({ "summary": "freedom" }));

        let (dream, quota) = created(db.create_dream(&new, at(2)).unwrap());
        assert_eq!(dream.tags, vec!["flying", "city"]);
        assert!(dream.has_artwork && dream.has_affirmation);
        assert_eq!(dream.interpretation, Some(json!({ "summary": "freedom" })));
        assert_eq!(quota.unwrap().dreams_count, 1);

        let fetched = db.get_dream("u1", &dream.id.to_string()).unwrap().unwrap();
        assert_eq!(fetched.tags, vec!["flying", "city"]);
        assert_eq!(db.get_profile("u1").unwrap().unwrap().dreams_count, 1);
    }

    #[test]
    fn full_quota_rejects_without_insert() {
        let db = setup();
        db.with_conn(|conn| {
            conn.execute("UPDATE profiles SET dreams_count = 5, dreams_limit = 5", [])?;
            Ok(())
        })
        .unwrap();

        match db.create_dream(&new_dream("Too many", &["x"]), at(2)).unwrap() {
            CreateDreamOutcome::QuotaExceeded(status) => {
                assert_eq!(status.dreams_count, 5);
                assert_eq!(status.dreams_limit, 5);
            }
            other => panic!("expected rejection, got {:?}", other),
        }
        assert_eq!(count(&db, "dreams"), 0);
        assert_eq!(count(&db, "dream_tags"), 0);
        assert_eq!(db.get_profile("u1").unwrap().unwrap().dreams_count, 5);
    }

    #[test]
    fn missing_profile_skips_quota() {
        let db = setup();
        let mut new = new_dream("No profile", &[]);
        new.user_id = "u2".into();
        let (_, quota) = created(db.create_dream(&new, at(2)).unwrap());
        assert!(quota.is_none());
        assert_eq!(db.list_dreams("u2").unwrap().len(), 1);
    }

    #[test]
    fn list_is_newest_first_and_scoped() {
        let db = setup();
        created(db.create_dream(&new_dream("first", &["a"]), at(2)).unwrap());
        created(db.create_dream(&new_dream("second", &["b", "c"]), at(3)).unwrap());

        let dreams = db.list_dreams("u1").unwrap();
        let titles: Vec<_> = dreams.iter().map(|d| d.title.as_str()).collect();
        assert_eq!(titles, vec!["second", "first"]);
        assert_eq!(dreams[0].tags, vec!["b", "c"]);
        assert!(db.list_dreams("someone-else").unwrap().is_empty());
    }

    #[test]
    fn missing_tables_degrade() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.list_dreams("u1").unwrap().is_empty());
        assert!(db.get_dream("u1", "nope").unwrap().is_none());
        assert!(!db.delete_dream("u1", "nope").unwrap());
    }

    #[test]
    fn delete_removes_tags_then_dream() {
        let db = setup();
        let (dream, _) = created(db.create_dream(&new_dream("gone", &["a", "b"]), at(2)).unwrap());
        let id = dream.id.to_string();

        assert!(!db.delete_dream("intruder", &id).unwrap());
        assert_eq!(count(&db, "dream_tags"), 2);

        assert!(db.delete_dream("u1", &id).unwrap());
        assert_eq!(count(&db, "dream_tags"), 0);
        assert_eq!(count(&db, "dreams"), 0);
        assert!(!db.delete_dream("u1", &id).unwrap());
    }

    #[test]
    fn artwork_url_needs_column() {
        let db = setup();
        let (dream, _) = created(db.create_dream(&new_dream("art", &[]), at(2)).unwrap());
        let id = dream.id.to_string();

        assert!(!db.set_artwork_url(&id, "https://img/1.png").unwrap());

        db.run_column_migrations().unwrap();
        assert!(db.set_artwork_url(&id, "https://img/1.png").unwrap());
        let fetched = db.get_dream("u1", &id).unwrap().unwrap();
        assert_eq!(fetched.artwork_url.as_deref(), Some("https://img/1.png"));
        assert!(fetched.has_artwork);
    }

    #[test]
    fn horoscope_is_scoped_to_owner() {
        let db = setup();
        db.run_column_migrations().unwrap();
        let (dream, _) = created(db.create_dream(&new_dream("stars", &[]), at(2)).unwrap());
        let id = dream.id.to_string();
        let h = json!({ "advice": "rest" });

        assert!(!db.set_horoscope("intruder", &id, &h).unwrap());
        assert!(db.set_horoscope("u1", &id, &h).unwrap());
        assert_eq!(db.get_dream("u1", &id).unwrap().unwrap().horoscope, Some(h));
    }
}
