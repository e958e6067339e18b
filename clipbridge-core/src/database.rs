//! SQLite persistence layer for the clipboard history.
//!
//! One `items` table holds the history; a `meta` key/value table holds the
//! device identifier, the sync watermark and the last successful sync time,
//! so a single file carries all persistent state.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection};
use thiserror::Error;
use tracing::warn;

use crate::models::{ClipboardItem, Origin, TAG_ACCESS_CODE};
use crate::query::HistoryFilter;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

fn format_ts(ts: DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Strict timestamp parse; unparseable rows are treated as corrupt and
/// skipped by callers rather than silently defaulted.
fn parse_db_timestamp(timestamp_str: &str) -> Option<DateTime<Utc>> {
    chrono::NaiveDateTime::parse_from_str(timestamp_str, TIMESTAMP_FORMAT)
        .or_else(|_| chrono::NaiveDateTime::parse_from_str(timestamp_str, "%Y-%m-%d %H:%M:%S"))
        .map(|dt| Utc.from_utc_datetime(&dt))
        .ok()
}

fn corrupt(column: usize, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        column,
        Type::Text,
        Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, msg)),
    )
}

/// Thread-safe database wrapper; all access serializes on the connection.
pub(crate) struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let conn = Connection::open(path)?;

        // WAL mode + mmap for faster reads
        conn.execute_batch(
            "
            PRAGMA journal_mode=WAL;
            PRAGMA mmap_size=67108864;
            PRAGMA cache_size=-32000;
        ",
        )?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.setup_schema()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.setup_schema()?;
        Ok(db)
    }

    fn setup_schema(&self) -> StoreResult<()> {
        let conn = self.conn.lock();

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS items (
                id TEXT PRIMARY KEY,
                content TEXT NOT NULL,
                truncated INTEGER NOT NULL DEFAULT 0,
                contentHash TEXT NOT NULL UNIQUE,
                capturedAt DATETIME NOT NULL,
                deviceId TEXT NOT NULL,
                tags TEXT NOT NULL,
                origin TEXT NOT NULL,
                syncedAt DATETIME,
                seenCount INTEGER NOT NULL DEFAULT 1
            )
            "#,
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_items_hash ON items(contentHash)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_items_captured ON items(capturedAt)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS meta (key TEXT PRIMARY KEY, value TEXT NOT NULL)",
            [],
        )?;

        Ok(())
    }

    pub fn insert_item(&self, item: &ClipboardItem) -> StoreResult<()> {
        let conn = self.conn.lock();
        let tags_json = serde_json::to_string(&item.tags)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        conn.execute(
            r#"
            INSERT INTO items (id, content, truncated, contentHash, capturedAt, deviceId, tags, origin, syncedAt, seenCount)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                item.id,
                item.content,
                item.truncated,
                item.content_hash,
                format_ts(item.captured_at),
                item.device_id,
                tags_json,
                item.origin.as_str(),
                item.synced_at.map(format_ts),
                item.seen_count,
            ],
        )?;

        Ok(())
    }

    pub fn get(&self, id: &str) -> StoreResult<Option<ClipboardItem>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT * FROM items WHERE id = ?1 LIMIT 1")?;
        match stmt.query_row([id], Self::row_to_item) {
            Ok(item) => Ok(Some(item)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn find_by_hash(&self, hash: &str) -> StoreResult<Option<ClipboardItem>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT * FROM items WHERE contentHash = ?1 LIMIT 1")?;
        match stmt.query_row([hash], Self::row_to_item) {
            Ok(item) => Ok(Some(item)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Bump the last-seen counter of an existing row; `seen_at` also moves
    /// `capturedAt` forward (local re-captures only).
    pub fn bump_seen(&self, id: &str, seen_at: Option<DateTime<Utc>>) -> StoreResult<()> {
        let conn = self.conn.lock();
        match seen_at {
            Some(at) => {
                conn.execute(
                    "UPDATE items SET seenCount = seenCount + 1, capturedAt = ?1 WHERE id = ?2",
                    params![format_ts(at), id],
                )?;
            }
            None => {
                conn.execute(
                    "UPDATE items SET seenCount = seenCount + 1 WHERE id = ?1",
                    params![id],
                )?;
            }
        }
        Ok(())
    }

    pub fn mark_synced(&self, id: &str, synced_at: DateTime<Utc>) -> StoreResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE items SET syncedAt = ?1 WHERE id = ?2",
            params![format_ts(synced_at), id],
        )?;
        Ok(())
    }

    /// List items matching the filter, newest first. Text and time bounds
    /// are prefiltered in SQL; the full predicate (including tag
    /// intersection) is re-checked on the parsed rows.
    pub fn list(&self, filter: &HistoryFilter, now: DateTime<Utc>) -> StoreResult<Vec<ClipboardItem>> {
        let conn = self.conn.lock();

        let mut sql = String::from("SELECT * FROM items");
        let mut clauses: Vec<&str> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(cutoff) = filter.cutoff(now) {
            clauses.push("capturedAt >= ?");
            values.push(format_ts(cutoff).into());
        }
        // SQLite's LOWER folds ASCII only, so the LIKE prefilter applies
        // just to ASCII queries; non-ASCII text is matched by the Rust
        // predicate below.
        if let Some(text) = filter.text.as_deref().filter(|t| t.is_ascii()) {
            clauses.push(r"LOWER(content) LIKE ? ESCAPE '\'");
            let escaped = text
                .to_lowercase()
                .replace('\\', "\\\\")
                .replace('%', "\\%")
                .replace('_', "\\_");
            values.push(format!("%{}%", escaped).into());
        }
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY capturedAt DESC");

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values), Self::row_to_item)?;
        Ok(Self::collect_resilient(rows)
            .into_iter()
            .filter(|item| filter.matches(item, now))
            .collect())
    }

    /// Local-origin, access-code-tagged items not yet accepted by the bridge.
    pub fn pending_push(&self) -> StoreResult<Vec<ClipboardItem>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            r#"SELECT * FROM items
               WHERE origin = 'local' AND syncedAt IS NULL AND tags LIKE ?1
               ORDER BY capturedAt ASC"#,
        )?;
        let pattern = format!("%\"{}\"%", TAG_ACCESS_CODE);
        let rows = stmt.query_map([pattern], Self::row_to_item)?;
        Ok(Self::collect_resilient(rows)
            .into_iter()
            .filter(|item| item.is_access_code())
            .collect())
    }

    /// Scan every row to rebuild the hash -> id dedup index. Unreadable
    /// rows are skipped with a warning; the store always comes up.
    pub fn scan_hash_index(&self) -> StoreResult<HashMap<String, String>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT * FROM items")?;
        let rows = stmt.query_map([], Self::row_to_item)?;
        Ok(Self::collect_resilient(rows)
            .into_iter()
            .map(|item| (item.content_hash, item.id))
            .collect())
    }

    pub fn count_items(&self) -> StoreResult<i64> {
        let conn = self.conn.lock();
        Ok(conn.query_row("SELECT COUNT(*) FROM items", [], |row| row.get(0))?)
    }

    pub fn count_tagged(&self, tag: &str) -> StoreResult<i64> {
        let conn = self.conn.lock();
        Ok(conn.query_row(
            "SELECT COUNT(*) FROM items WHERE tags LIKE ?1",
            [format!("%\"{}\"%", tag)],
            |row| row.get(0),
        )?)
    }

    /// Delete all items (user-initiated clear, the only deletion path).
    pub fn clear_all(&self) -> StoreResult<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM items", [])?;
        Ok(())
    }

    pub fn meta_get(&self, key: &str) -> StoreResult<Option<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT value FROM meta WHERE key = ?1")?;
        match stmt.query_row([key], |row| row.get::<_, String>(0)) {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn meta_set(&self, key: &str, value: &str) -> StoreResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO meta (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    fn collect_resilient(
        rows: impl Iterator<Item = rusqlite::Result<ClipboardItem>>,
    ) -> Vec<ClipboardItem> {
        rows.filter_map(|row| match row {
            Ok(item) => Some(item),
            Err(e) => {
                warn!("skipping unreadable history row: {e}");
                None
            }
        })
        .collect()
    }

    fn row_to_item(row: &rusqlite::Row) -> rusqlite::Result<ClipboardItem> {
        let id: String = row.get("id")?;
        let content: String = row.get("content")?;
        let truncated: bool = row.get("truncated")?;
        let content_hash: String = row.get("contentHash")?;
        let captured_at_str: String = row.get("capturedAt")?;
        let device_id: String = row.get("deviceId")?;
        let tags_json: String = row.get("tags")?;
        let origin_str: String = row.get("origin")?;
        let synced_at_str: Option<String> = row.get("syncedAt")?;
        let seen_count: i64 = row.get("seenCount")?;

        let captured_at = parse_db_timestamp(&captured_at_str)
            .ok_or_else(|| corrupt(4, format!("bad capturedAt {captured_at_str:?}")))?;
        let tags = serde_json::from_str(&tags_json)
            .map_err(|e| corrupt(6, format!("bad tags {tags_json:?}: {e}")))?;
        let origin = Origin::parse(&origin_str)
            .ok_or_else(|| corrupt(7, format!("bad origin {origin_str:?}")))?;
        let synced_at = match synced_at_str {
            Some(s) => Some(
                parse_db_timestamp(&s).ok_or_else(|| corrupt(8, format!("bad syncedAt {s:?}")))?,
            ),
            None => None,
        };

        Ok(ClipboardItem {
            id,
            content,
            truncated,
            content_hash,
            captured_at,
            device_id,
            tags,
            origin,
            synced_at,
            seen_count,
        })
    }

    /// Raw execute, test-only escape hatch for planting corrupt rows.
    #[cfg(test)]
    pub fn execute_raw(&self, sql: &str) -> StoreResult<()> {
        let conn = self.conn.lock();
        conn.execute(sql, [])?;
        Ok(())
    }
}
