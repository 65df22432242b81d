use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

use crate::probe::{column_exists, table_exists};

/// Auth tables. Always present, independent of the journal setup state.
pub fn bootstrap(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          TEXT PRIMARY KEY,
            email       TEXT NOT NULL UNIQUE,
            password    TEXT NOT NULL,
            created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        );
        ",
    )?;
    Ok(())
}

/// Creates the journal tables and indexes. Safe to run any number of times.
pub fn init_core_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS profiles (
            id                  TEXT PRIMARY KEY,
            user_id             TEXT NOT NULL UNIQUE,
            full_name           TEXT,
            subscription_tier   TEXT NOT NULL DEFAULT 'free',
            dreams_count        INTEGER NOT NULL DEFAULT 0,
            dreams_limit        INTEGER NOT NULL DEFAULT 5,
            created_at          TEXT NOT NULL,
            avatar_url          TEXT,
            birthday            TEXT,
            last_dreams_reset   TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS dreams (
            id              TEXT PRIMARY KEY,
            user_id         TEXT NOT NULL,
            title           TEXT NOT NULL,
            content         TEXT NOT NULL,
            mood            TEXT,
            created_at      TEXT NOT NULL,
            interpretation  TEXT,
            has_artwork     INTEGER NOT NULL DEFAULT 0,
            has_affirmation INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS dreams_user_id_idx ON dreams(user_id);
        CREATE INDEX IF NOT EXISTS dreams_created_at_idx ON dreams(created_at);

        CREATE TABLE IF NOT EXISTS dream_tags (
            id          TEXT PRIMARY KEY,
            dream_id    TEXT NOT NULL REFERENCES dreams(id) ON DELETE CASCADE,
            tag         TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS dream_tags_dream_id_idx ON dream_tags(dream_id);
        CREATE INDEX IF NOT EXISTS dream_tags_tag_idx ON dream_tags(tag);

        CREATE TABLE IF NOT EXISTS dream_shares (
            id          TEXT PRIMARY KEY,
            dream_id    TEXT,
            share_type  TEXT NOT NULL,
            content     TEXT NOT NULL,
            title       TEXT NOT NULL DEFAULT 'Shared Dream',
            created_at  TEXT NOT NULL,
            expires_at  TEXT NOT NULL,
            views       INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS dream_shares_expires_at_idx ON dream_shares(expires_at);
        ",
    )?;

    info!("Core schema initialized");
    Ok(())
}

/// Optional columns that arrived after the core schema.
const COLUMN_MIGRATIONS: &[(&str, &str, &str)] = &[
    (
        "profiles",
        "timezone",
        "ALTER TABLE profiles ADD COLUMN timezone TEXT DEFAULT 'Pacific Time (UTC-8)'",
    ),
    ("dreams", "artwork_url", "ALTER TABLE dreams ADD COLUMN artwork_url TEXT"),
    ("dreams", "horoscope", "ALTER TABLE dreams ADD COLUMN horoscope TEXT"),
];

#[derive(Debug, Default)]
pub struct MigrationReport {
    /// `table.column` entries added by this run.
    pub added: Vec<String>,
    /// Tables a migration needed that do not exist yet.
    pub missing_tables: Vec<String>,
}

/// Adds any missing optional column. Columns already present are left alone.
pub fn run_column_migrations(conn: &Connection) -> Result<MigrationReport> {
    let mut report = MigrationReport::default();

    for (table, column, ddl) in COLUMN_MIGRATIONS {
        if !table_exists(conn, table) {
            if !report.missing_tables.iter().any(|t| t == table) {
                report.missing_tables.push(table.to_string());
            }
            continue;
        }
        if column_exists(conn, table, column) {
            continue;
        }
        conn.execute_batch(ddl)?;
        info!("Added column {}.{}", table, column);
        report.added.push(format!("{}.{}", table, column));
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;

    #[test]
    fn core_schema_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            init_core_schema(conn)?;
            init_core_schema(conn)?;
            assert!(table_exists(conn, "profiles"));
            assert!(table_exists(conn, "dream_shares"));
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn column_migrations_add_once() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            init_core_schema(conn)?;
            let first = run_column_migrations(conn)?;
            assert_eq!(
                first.added,
                vec!["profiles.timezone", "dreams.artwork_url", "dreams.horoscope"]
            );
            let second = run_column_migrations(conn)?;
            assert!(second.added.is_empty());
            assert!(second.missing_tables.is_empty());
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn column_migrations_report_missing_tables() {
        let db = Database::open_in_memory().unwrap();
        let report = db.with_conn(run_column_migrations).unwrap();
        assert!(report.added.is_empty());
        assert_eq!(report.missing_tables, vec!["profiles", "dreams"]);
    }
}
