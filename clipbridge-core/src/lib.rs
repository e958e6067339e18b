//! clipbridge-core - clipboard history capture engine
//!
//! Core business logic for the clipbridge clipboard history and code
//! synchronization tool: capture, classification, deduplicated storage and
//! query. Network synchronization lives in the `clipbridge-sync` crate.
//!
//! # Architecture
//! - `models`: data model (`ClipboardItem`, origin, tag constants)
//! - `detect`: pattern detector with an injectable pattern set
//! - `database`: SQLite layer with a meta table for sync state
//! - `store`: dedup store, the sole source of truth for queries
//! - `query`: composable text/tag/time filters
//! - `watcher`: clipboard polling loop with cooperative cancellation

mod database;

pub mod detect;
pub mod models;
pub mod query;
pub mod store;
pub mod watcher;

pub use database::{StoreError, StoreResult};
pub use detect::{auxiliary_tags, Classification, DetectError, PatternSet, PatternSpec};
pub use models::{
    ClipboardItem, Origin, MAX_CONTENT_BYTES, TAG_ACCESS_CODE, TAG_CAPTURE, TAG_REMOTE,
};
pub use query::HistoryFilter;
pub use store::{HistoryStore, PutOutcome, StoreStats};
pub use watcher::{
    ClipboardReadError, ClipboardSource, ClipboardWatcher, SystemClipboard, DEFAULT_POLL_INTERVAL,
};
