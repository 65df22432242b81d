//! Runtime schema capability checks.
//!
//! Setup is a manual, idempotent step, so any table or optional column may be
//! missing. Probes never error: a failed probe reads as "not available".

use anyhow::Result;
use rusqlite::Connection;
use tracing::{debug, warn};

use dreamvault_types::api::{Capabilities, SchemaStatus};

use crate::migrations::{self, MigrationReport};
use crate::Database;

/// Table names cannot be bound as parameters, so only plain identifiers are probed.
fn is_identifier(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Zero-row probe: preparing a statement against a missing table fails.
pub fn table_exists(conn: &Connection, table: &str) -> bool {
    if !is_identifier(table) {
        return false;
    }
    match conn.prepare(&format!("SELECT 1 FROM {} LIMIT 0", table)) {
        Ok(_) => true,
        Err(e) => {
            debug!("Table probe for {} failed: {}", table, e);
            false
        }
    }
}

pub fn column_exists(conn: &Connection, table: &str, column: &str) -> bool {
    let result: rusqlite::Result<i64> = conn.query_row(
        "SELECT COUNT(*) FROM pragma_table_info(?1) WHERE name = ?2",
        [table, column],
        |row| row.get(0),
    );
    match result {
        Ok(count) => count > 0,
        Err(e) => {
            warn!("Column probe for {}.{} failed: {}", table, column, e);
            false
        }
    }
}

pub fn schema_status(conn: &Connection) -> SchemaStatus {
    let profiles_exist = table_exists(conn, "profiles");
    let dreams_exist = table_exists(conn, "dreams");
    let tags_exist = table_exists(conn, "dream_tags");
    let shares_exist = table_exists(conn, "dream_shares");

    SchemaStatus {
        all_tables_exist: profiles_exist && dreams_exist && tags_exist && shares_exist,
        profiles_exist,
        dreams_exist,
        tags_exist,
        shares_exist,
    }
}

pub fn capabilities(conn: &Connection) -> Capabilities {
    Capabilities {
        artwork_url: column_exists(conn, "dreams", "artwork_url"),
        birthday: column_exists(conn, "profiles", "birthday"),
        timezone: column_exists(conn, "profiles", "timezone"),
        horoscope: column_exists(conn, "dreams", "horoscope"),
    }
}

impl Database {
    /// A lock or connection failure also reads as "missing".
    pub fn table_exists(&self, table: &str) -> bool {
        self.with_conn(|conn| Ok(table_exists(conn, table)))
            .unwrap_or(false)
    }

    pub fn column_exists(&self, table: &str, column: &str) -> bool {
        self.with_conn(|conn| Ok(column_exists(conn, table, column)))
            .unwrap_or(false)
    }

    pub fn schema_status(&self) -> SchemaStatus {
        self.with_conn(|conn| Ok(schema_status(conn)))
            .unwrap_or_default()
    }

    pub fn capabilities(&self) -> Capabilities {
        self.with_conn(|conn| Ok(capabilities(conn)))
            .unwrap_or_default()
    }

    /// Connectivity check used by the health endpoints.
    pub fn check_connection(&self) -> bool {
        self.with_conn(|conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
            Ok(())
        })
        .is_ok()
    }

    pub fn init_core_schema(&self) -> Result<()> {
        self.with_conn(migrations::init_core_schema)
    }

    pub fn run_column_migrations(&self) -> Result<MigrationReport> {
        self.with_conn(migrations::run_column_migrations)
    }
}
