//! Mirror manifest - SQLite record of per-mirror sync history
//!
//! The manifest is informational: the filesystem stays the source of truth
//! for every sync decision. It remembers, per mirror, the last outcome, when
//! it last synced and last succeeded, and the pack measurements taken during
//! that run.
//!
//! The database is stored in XDG_DATA_HOME/repomirror/state.db unless
//! `state.path` says otherwise.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use tracing::{debug, info};

use crate::stats::Outcome;

/// A manifest row
#[derive(Debug, Clone, PartialEq)]
pub struct MirrorEntry {
    pub domain: String,
    pub path_with_namespace: String,
    pub local_path: String,
    pub remote_url: String,
    pub last_outcome: Option<Outcome>,
    pub last_error: Option<String>,
    pub last_sync_at: DateTime<Utc>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub largest_pack_bytes: Option<u64>,
    pub object_count: Option<u64>,
}

/// What one processed repository contributes to the manifest
#[derive(Debug, Clone)]
pub struct SyncRecord<'a> {
    pub domain: &'a str,
    pub path_with_namespace: &'a str,
    pub local_path: &'a Path,
    pub remote_url: &'a str,
    pub outcome: Outcome,
    pub error: Option<&'a str>,
    pub largest_pack_bytes: Option<u64>,
    pub object_count: Option<u64>,
}

/// State database manager
pub struct StateDb {
    conn: Connection,
}

impl StateDb {
    /// Open or create the state database at a specific path
    pub fn open_at(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create database directory")?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database at {}", path.display()))?;

        let db = Self { conn };
        db.initialize()?;

        info!("State database opened at {}", path.display());
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        let db = Self { conn };
        db.initialize()?;
        Ok(db)
    }

    fn initialize(&self) -> Result<()> {
        self.conn
            .execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS mirrors (
                    domain TEXT NOT NULL,
                    path_with_namespace TEXT NOT NULL,
                    local_path TEXT NOT NULL,
                    remote_url TEXT NOT NULL,
                    last_outcome TEXT,
                    last_error TEXT,
                    last_sync_at TEXT NOT NULL,
                    last_success_at TEXT,
                    largest_pack_bytes INTEGER,
                    object_count INTEGER,
                    PRIMARY KEY (domain, path_with_namespace)
                );

                CREATE INDEX IF NOT EXISTS idx_mirrors_outcome ON mirrors(last_outcome, last_sync_at);
                "#,
            )
            .context("Failed to initialize database schema")?;

        debug!("Database schema initialized");
        Ok(())
    }

    /// Upsert the manifest row for one processed repository
    ///
    /// Pack measurements and the last success time are only overwritten when
    /// this run produced new values.
    pub fn record_sync(&self, record: &SyncRecord<'_>) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let last_success_at = record.outcome.is_success().then(|| now.clone());

        self.conn
            .execute(
                r#"
                INSERT INTO mirrors (domain, path_with_namespace, local_path, remote_url, last_outcome,
                                     last_error, last_sync_at, last_success_at, largest_pack_bytes, object_count)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                ON CONFLICT(domain, path_with_namespace) DO UPDATE SET
                    local_path = ?3,
                    remote_url = ?4,
                    last_outcome = ?5,
                    last_error = ?6,
                    last_sync_at = ?7,
                    last_success_at = COALESCE(?8, last_success_at),
                    largest_pack_bytes = COALESCE(?9, largest_pack_bytes),
                    object_count = COALESCE(?10, object_count)
                "#,
                params![
                    record.domain,
                    record.path_with_namespace,
                    record.local_path.to_string_lossy().into_owned(),
                    record.remote_url,
                    record.outcome.as_str(),
                    record.error,
                    now,
                    last_success_at,
                    record.largest_pack_bytes.map(|v| v as i64),
                    record.object_count.map(|v| v as i64),
                ],
            )
            .context("Failed to upsert mirror")?;

        debug!(
            "Updated manifest: {}/{} -> {}",
            record.domain, record.path_with_namespace, record.outcome
        );
        Ok(())
    }

    /// Get one mirror's row
    pub fn get_mirror(&self, domain: &str, path_with_namespace: &str) -> Result<Option<MirrorEntry>> {
        self.conn
            .query_row(
                &format!(
                    "{} WHERE domain = ?1 AND path_with_namespace = ?2",
                    SELECT_MIRRORS
                ),
                params![domain, path_with_namespace],
                row_to_entry,
            )
            .optional()
            .context("Failed to query mirror")
    }

    /// All mirrors, grouped by domain
    pub fn list_mirrors(&self) -> Result<Vec<MirrorEntry>> {
        self.query_mirrors(
            &format!("{} ORDER BY domain, path_with_namespace", SELECT_MIRRORS),
            [],
        )
    }

    /// Mirrors whose last run ended in a failure outcome
    pub fn list_failed(&self) -> Result<Vec<MirrorEntry>> {
        self.query_mirrors(
            &format!(
                "{} WHERE last_outcome IN (?1, ?2, ?3) ORDER BY last_sync_at DESC",
                SELECT_MIRRORS
            ),
            params![
                Outcome::Failed.as_str(),
                Outcome::FailedMirror.as_str(),
                Outcome::FailedUpdate.as_str()
            ],
        )
    }

    fn query_mirrors<P: rusqlite::Params>(&self, sql: &str, params: P) -> Result<Vec<MirrorEntry>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mirrors = stmt
            .query_map(params, row_to_entry)
            .context("Failed to query mirrors")?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to collect mirrors")?;
        Ok(mirrors)
    }
}

const SELECT_MIRRORS: &str = r#"
    SELECT domain, path_with_namespace, local_path, remote_url, last_outcome, last_error,
           last_sync_at, last_success_at, largest_pack_bytes, object_count
    FROM mirrors
"#;

fn parse_time(s: Option<String>) -> Option<DateTime<Utc>> {
    s.and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn row_to_entry(row: &Row<'_>) -> rusqlite::Result<MirrorEntry> {
    Ok(MirrorEntry {
        domain: row.get(0)?,
        path_with_namespace: row.get(1)?,
        local_path: row.get(2)?,
        remote_url: row.get(3)?,
        last_outcome: row
            .get::<_, Option<String>>(4)?
            .and_then(|s| Outcome::parse(&s)),
        last_error: row.get(5)?,
        last_sync_at: parse_time(row.get(6)?).unwrap_or_else(Utc::now),
        last_success_at: parse_time(row.get(7)?),
        largest_pack_bytes: row.get::<_, Option<i64>>(8)?.map(|v| v as u64),
        object_count: row.get::<_, Option<i64>>(9)?.map(|v| v as u64),
    })
}
