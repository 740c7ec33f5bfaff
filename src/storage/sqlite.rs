//! Durable SQLite history store
//!
//! # Layout
//!
//! ```text
//! analyses
//!   seq               INTEGER  -- insertion order, never reused
//!   id                TEXT     -- record key (not unique under DuplicatePolicy::Append)
//!   analyzed_at       TEXT     -- RFC 3339
//!   privacy_score     INTEGER
//!   risk_level        TEXT     -- Safe | Watch | Risky
//!   cookie_categories TEXT     -- JSON object {category: count}
//!   trackers_blocked  INTEGER
//! metadata
//!   key, value        -- schema_version lives here
//! ```
//!
//! The database runs in WAL mode with `synchronous=FULL`, so an append is on
//! disk once its transaction commits. Reads go through a small r2d2 pool and
//! never block on the writer.

use super::{DuplicatePolicy, HistoryStore, StoreError};
use crate::model::{AnalysisRecord, CookieCounts, RiskLevel};
use chrono::{DateTime, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection};
use std::path::Path;

const SCHEMA_VERSION: i32 = 1;

pub struct SqliteHistoryStore {
    pool: Pool<SqliteConnectionManager>,
    policy: DuplicatePolicy,
}

/// Row as stored, before conversion back into a record
struct RawRow {
    seq: i64,
    id: String,
    analyzed_at: String,
    privacy_score: i64,
    risk_level: String,
    cookie_categories: String,
    trackers_blocked: i64,
}

impl SqliteHistoryStore {
    /// Open (or create) the history database at `path`
    pub fn open(path: impl AsRef<Path>, policy: DuplicatePolicy) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let manager = SqliteConnectionManager::file(path).with_init(|conn| {
            conn.execute_batch(
                r#"
                PRAGMA journal_mode=WAL;
                PRAGMA synchronous=FULL;
                PRAGMA busy_timeout=5000;
                "#,
            )
        });
        let pool = Pool::builder().max_size(4).build(manager)?;

        let conn = pool.get()?;
        Self::init_schema(&conn)?;

        Ok(Self { pool, policy })
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, StoreError> {
        Ok(self.pool.get()?)
    }

    /// Create tables and record the schema version
    fn init_schema(conn: &Connection) -> anyhow::Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS metadata (key TEXT PRIMARY KEY, value TEXT NOT NULL);",
        )?;

        let current_version: i32 = conn
            .query_row(
                "SELECT COALESCE(
                    (SELECT CAST(value AS INTEGER) FROM metadata WHERE key = 'schema_version'),
                    0
                )",
                [],
                |row| row.get(0),
            )
            .unwrap_or(0);

        if current_version < 1 {
            conn.execute_batch(
                r#"
                BEGIN;
                CREATE TABLE IF NOT EXISTS analyses (
                    seq               INTEGER PRIMARY KEY AUTOINCREMENT,
                    id                TEXT NOT NULL,
                    analyzed_at       TEXT NOT NULL,
                    privacy_score     INTEGER NOT NULL,
                    risk_level        TEXT NOT NULL,
                    cookie_categories TEXT NOT NULL DEFAULT '{}',
                    trackers_blocked  INTEGER NOT NULL DEFAULT 0
                );
                CREATE INDEX IF NOT EXISTS idx_analyses_id ON analyses(id);
                CREATE INDEX IF NOT EXISTS idx_analyses_analyzed_at ON analyses(analyzed_at);
                COMMIT;
                "#,
            )?;
        }

        conn.execute(
            "INSERT OR REPLACE INTO metadata (key, value) VALUES ('schema_version', ?1)",
            params![SCHEMA_VERSION.to_string()],
        )?;
        Ok(())
    }

    fn into_record(row: RawRow) -> Result<AnalysisRecord, StoreError> {
        let corrupt = |what: &str| StoreError::Corrupt(format!("seq {}: {}", row.seq, what));

        let analyzed_at = DateTime::parse_from_rfc3339(&row.analyzed_at)
            .map_err(|e| corrupt(&format!("analyzed_at: {}", e)))?
            .with_timezone(&Utc);
        let privacy_score = u8::try_from(row.privacy_score)
            .map_err(|_| corrupt(&format!("privacy_score {}", row.privacy_score)))?;
        let risk_level = RiskLevel::parse(&row.risk_level)
            .ok_or_else(|| corrupt(&format!("risk_level {:?}", row.risk_level)))?;
        let cookie_categories: CookieCounts = serde_json::from_str(&row.cookie_categories)
            .map_err(|e| corrupt(&format!("cookie_categories: {}", e)))?;
        let trackers_blocked_count = u32::try_from(row.trackers_blocked)
            .map_err(|_| corrupt(&format!("trackers_blocked {}", row.trackers_blocked)))?;

        Ok(AnalysisRecord {
            id: row.id,
            analyzed_at,
            privacy_score,
            risk_level,
            cookie_categories,
            trackers_blocked_count,
        })
    }
}

impl HistoryStore for SqliteHistoryStore {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn append(&self, record: &AnalysisRecord) -> Result<(), StoreError> {
        record.validate()?;

        let cookies = serde_json::to_string(&record.cookie_categories)
            .map_err(|e| StoreError::Unavailable(format!("encode cookie categories: {}", e)))?;

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        if self.policy == DuplicatePolicy::Overwrite {
            let replaced = tx.execute("DELETE FROM analyses WHERE id = ?1", params![record.id])?;
            if replaced > 0 {
                tracing::debug!("Overwriting {} record(s) with id {}", replaced, record.id);
            }
        }
        tx.execute(
            r#"
            INSERT INTO analyses
                (id, analyzed_at, privacy_score, risk_level, cookie_categories, trackers_blocked)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                record.id,
                record.analyzed_at.to_rfc3339(),
                i64::from(record.privacy_score),
                record.risk_level.as_str(),
                cookies,
                i64::from(record.trackers_blocked_count),
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn read_all(&self) -> Result<Vec<AnalysisRecord>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT seq, id, analyzed_at, privacy_score, risk_level, cookie_categories, trackers_blocked
            FROM analyses
            ORDER BY seq
            "#,
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(RawRow {
                seq: row.get(0)?,
                id: row.get(1)?,
                analyzed_at: row.get(2)?,
                privacy_score: row.get(3)?,
                risk_level: row.get(4)?,
                cookie_categories: row.get(5)?,
                trackers_blocked: row.get(6)?,
            })
        })?;

        let mut records = Vec::new();
        for row in rows {
            records.push(Self::into_record(row?)?);
        }
        Ok(records)
    }
}
