//! The local history store: the sole source of truth for queries.
//!
//! Wraps the SQLite layer with an in-memory `contentHash -> id` index for
//! O(1) dedup lookups, rebuilt on open by scanning the table. All mutation
//! goes through `put` / `mark_synced` / `clear`, which serialize internally,
//! so the watcher and sync loops can share one store. The sync client only
//! adds and merges rows; nothing here deletes locally-authored data as a
//! side effect of a failed push.

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::debug;

use crate::database::{Database, StoreResult};
use crate::models::{ClipboardItem, Origin, TAG_ACCESS_CODE};
use crate::query::HistoryFilter;

const META_DEVICE_ID: &str = "device_id";
const META_WATERMARK: &str = "sync_watermark";
const META_LAST_SYNC: &str = "last_sync_at";

/// Result of a `put`: whether a new row was created, and the id of the row
/// now holding this content (existing row's id on dedup).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutOutcome {
    pub inserted: bool,
    pub id: String,
}

/// Operator-facing store counters, surfaced by the `stats` command.
#[derive(Debug, Clone)]
pub struct StoreStats {
    pub total_items: i64,
    pub access_code_items: i64,
    pub pending_push: usize,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub watermark: Option<DateTime<Utc>>,
}

pub struct HistoryStore {
    db: Database,
    /// contentHash -> id of the row holding that content.
    index: Mutex<HashMap<String, String>>,
}

impl HistoryStore {
    /// Open or create a store at the given path, rebuilding the dedup
    /// index by scanning the persisted history. Unreadable rows are skipped
    /// with a warning; the store always comes up, possibly degraded.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let db = Database::open(path)?;
        let index = db.scan_hash_index()?;
        debug!(items = index.len(), "history index rebuilt");
        Ok(Self {
            db,
            index: Mutex::new(index),
        })
    }

    /// In-memory store (for testing).
    pub fn open_in_memory() -> StoreResult<Self> {
        let db = Database::open_in_memory()?;
        let index = db.scan_hash_index()?;
        Ok(Self {
            db,
            index: Mutex::new(index),
        })
    }

    /// Insert an item if its content hash is unseen; otherwise bump the
    /// existing row's seen counter (and, for local re-captures, its
    /// captured-at time) instead of duplicating it.
    pub fn put(&self, item: ClipboardItem) -> StoreResult<PutOutcome> {
        let mut index = self.index.lock();
        if let Some(existing_id) = index.get(&item.content_hash) {
            let seen_at = match item.origin {
                Origin::Local => Some(item.captured_at),
                Origin::Remote => None,
            };
            self.db.bump_seen(existing_id, seen_at)?;
            return Ok(PutOutcome {
                inserted: false,
                id: existing_id.clone(),
            });
        }

        self.db.insert_item(&item)?;
        index.insert(item.content_hash.clone(), item.id.clone());
        Ok(PutOutcome {
            inserted: true,
            id: item.id,
        })
    }

    pub fn get(&self, id: &str) -> StoreResult<Option<ClipboardItem>> {
        self.db.get(id)
    }

    pub fn find_by_hash(&self, hash: &str) -> StoreResult<Option<ClipboardItem>> {
        self.db.find_by_hash(hash)
    }

    /// Query the history, newest first.
    pub fn list(&self, filter: &HistoryFilter) -> StoreResult<Vec<ClipboardItem>> {
        self.db.list(filter, Utc::now())
    }

    /// Shorthand for `list` with the access-code tag filter.
    pub fn find_access_codes(&self) -> StoreResult<Vec<ClipboardItem>> {
        self.list(&HistoryFilter::access_codes())
    }

    pub fn mark_synced(&self, id: &str, synced_at: DateTime<Utc>) -> StoreResult<()> {
        self.db.mark_synced(id, synced_at)
    }

    /// Items eligible for the next push cycle: local origin, tagged as
    /// access codes, never successfully pushed.
    pub fn pending_push(&self) -> StoreResult<Vec<ClipboardItem>> {
        self.db.pending_push()
    }

    /// User-initiated clear: the only way history rows are deleted.
    pub fn clear(&self) -> StoreResult<()> {
        let mut index = self.index.lock();
        self.db.clear_all()?;
        index.clear();
        Ok(())
    }

    pub fn stats(&self) -> StoreResult<StoreStats> {
        Ok(StoreStats {
            total_items: self.db.count_items()?,
            access_code_items: self.db.count_tagged(TAG_ACCESS_CODE)?,
            pending_push: self.db.pending_push()?.len(),
            last_sync_at: self.last_sync_at()?,
            watermark: self.watermark()?,
        })
    }

    /// Stable per-installation identifier, generated once and persisted.
    /// `seed` names the device (defaults to the hostname); a random suffix
    /// keeps identically-named machines distinct.
    pub fn device_id(&self, seed: Option<&str>) -> StoreResult<String> {
        if let Some(existing) = self.db.meta_get(META_DEVICE_ID)? {
            return Ok(existing);
        }
        let base = seed
            .map(str::to_string)
            .or_else(|| std::env::var("HOSTNAME").ok())
            .or_else(|| std::env::var("COMPUTERNAME").ok())
            .unwrap_or_else(|| "device".to_string());
        let id = format!("{}-{}", base, hex::encode(rand::random::<[u8; 4]>()));
        self.db.meta_set(META_DEVICE_ID, &id)?;
        Ok(id)
    }

    /// Timestamp of the newest remote item merged so far.
    pub fn watermark(&self) -> StoreResult<Option<DateTime<Utc>>> {
        self.meta_timestamp(META_WATERMARK)
    }

    pub fn set_watermark(&self, ts: DateTime<Utc>) -> StoreResult<()> {
        self.db.meta_set(META_WATERMARK, &ts.to_rfc3339())
    }

    pub fn last_sync_at(&self) -> StoreResult<Option<DateTime<Utc>>> {
        self.meta_timestamp(META_LAST_SYNC)
    }

    pub fn set_last_sync_at(&self, ts: DateTime<Utc>) -> StoreResult<()> {
        self.db.meta_set(META_LAST_SYNC, &ts.to_rfc3339())
    }

    fn meta_timestamp(&self, key: &str) -> StoreResult<Option<DateTime<Utc>>> {
        Ok(self
            .db
            .meta_get(key)?
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc)))
    }

    #[cfg(test)]
    pub(crate) fn db(&self) -> &Database {
        &self.db
    }
}
