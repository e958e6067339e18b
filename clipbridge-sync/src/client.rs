//! Sync client: keeps the local store and the bridge convergent.
//!
//! Convergence comes from idempotent, hash-keyed merge rather than any
//! cross-device locking. Push re-sends unsynced items until the bridge
//! accepts them; pull re-delivers at least once from the persisted
//! watermark, and the store's dedup absorbs duplicates. A crash anywhere
//! between fetch and merge only costs a re-pull of a superset.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use clipbridge_core::{HistoryStore, StoreError};

use crate::bridge::{BridgeError, BridgeItem, BridgeTransport, PushReceipt};

/// Backoff ceiling for retryable sync failures.
const MAX_BACKOFF: Duration = Duration::from_secs(300);

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Bridge(#[from] BridgeError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SyncError {
    /// Store errors are treated as retryable: the watermark and synced
    /// markers are untouched on failure, so retrying is always safe.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Bridge(e) => e.is_retryable(),
            SyncError::Store(_) => true,
        }
    }
}

/// Outcome of one sync cycle, for logging and stats.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncCycle {
    pub pushed: usize,
    pub pulled: usize,
    pub merged: usize,
}

pub struct SyncClient<B> {
    bridge: B,
    store: Arc<HistoryStore>,
}

impl<B: BridgeTransport> SyncClient<B> {
    pub fn new(bridge: B, store: Arc<HistoryStore>) -> Self {
        Self { bridge, store }
    }

    /// Push every pending item (local origin, access-code tagged, never
    /// synced). On success each sent item is marked synced; on failure
    /// `synced_at` stays null and the whole batch is retried next cycle,
    /// which the bridge absorbs idempotently.
    pub async fn push_pending(&self) -> Result<PushReceipt, SyncError> {
        let pending = self.store.pending_push()?;
        if pending.is_empty() {
            return Ok(PushReceipt::default());
        }

        let batch: Vec<BridgeItem> = pending.iter().map(BridgeItem::from_item).collect();
        let receipt = self.bridge.push(&batch).await?;
        if receipt.rejected > 0 {
            warn!(
                rejected = receipt.rejected,
                "bridge rejected items from push batch"
            );
        }

        // The receipt carries counts only, so a rejection cannot be pinned
        // to a specific item. Every sent item is marked synced here and a
        // rejected count is logged above, not retried; re-sending the same
        // batch forever would spin on a permanently rejected item.
        let now = Utc::now();
        for item in &pending {
            self.store.mark_synced(&item.id, now)?;
        }
        debug!(pushed = pending.len(), "push cycle complete");
        Ok(receipt)
    }

    /// Pull remote items newer than the watermark and merge them into the
    /// store with remote origin. The watermark advances only after every
    /// pulled item has been merged, so a crash mid-merge re-pulls a
    /// superset on restart; dedup by content hash absorbs the re-delivery.
    pub async fn pull_remote(&self) -> Result<SyncCycle, SyncError> {
        let since = self
            .store
            .watermark()?
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

        let remote = self.bridge.pull(since).await?;
        let pulled = remote.len();

        let mut merged = 0;
        let mut newest = since;
        for wire_item in remote {
            if wire_item.captured_at > newest {
                newest = wire_item.captured_at;
            }
            if self.store.put(wire_item.into_item())?.inserted {
                merged += 1;
            }
        }

        if newest > since {
            self.store.set_watermark(newest)?;
        }
        debug!(pulled, merged, "pull cycle complete");
        Ok(SyncCycle {
            pushed: 0,
            pulled,
            merged,
        })
    }

    /// One full cycle: push, then pull. Records the last successful sync
    /// time for the `stats` command.
    pub async fn sync_once(&self) -> Result<SyncCycle, SyncError> {
        let receipt = self.push_pending().await?;
        let mut cycle = self.pull_remote().await?;
        cycle.pushed = receipt.accepted;
        self.store.set_last_sync_at(Utc::now())?;
        Ok(cycle)
    }

    /// The slow loop: sync on its own schedule, decoupled from capture.
    /// Retryable failures back off exponentially up to a ceiling; a
    /// configuration error ends the loop (capture and local query keep
    /// working offline). Cancellation is observed within one wait.
    pub async fn run(self, interval: Duration, cancel: CancellationToken) {
        info!(interval_secs = interval.as_secs(), "sync loop started");
        let mut wait = interval;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }

            match self.sync_once().await {
                Ok(cycle) => {
                    if cycle.pushed > 0 || cycle.merged > 0 {
                        info!(
                            pushed = cycle.pushed,
                            merged = cycle.merged,
                            "sync cycle applied changes"
                        );
                    }
                    wait = interval;
                }
                Err(e) if e.is_retryable() => {
                    wait = (wait * 2).min(MAX_BACKOFF);
                    warn!(retry_in_secs = wait.as_secs(), "sync failed, backing off: {e}");
                }
                Err(e) => {
                    error!("sync paused on configuration error: {e}");
                    break;
                }
            }
        }
        info!("sync loop stopped");
    }
}
