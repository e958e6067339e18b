//! The `monitor` command: run capture and sync until interrupted.
//!
//! Two independent schedules share the store. The watcher polls fast on a
//! dedicated thread (clipboard reads are blocking OS calls and must stay
//! off both the async runtime and the store's critical path); the sync
//! client runs slow on a tokio task. A slow or unreachable bridge never
//! delays local capture.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use clipbridge_core::{
    auxiliary_tags, ClipboardItem, ClipboardWatcher, HistoryStore, PatternSet, SystemClipboard,
};
use clipbridge_sync::{HttpBridge, SyncClient};

use crate::config::Config;

pub async fn run(config: &Config, store: Arc<HistoryStore>) -> Result<()> {
    let patterns = config.pattern_set()?;
    let device_id = store.device_id(config.device_name.as_deref())?;
    let cancel = CancellationToken::new();
    let (events_tx, mut events_rx) = mpsc::channel::<String>(64);

    // Fast loop: clipboard polling on its own thread.
    let poll_interval = Duration::from_millis(config.poll_interval_ms);
    let watcher_cancel = cancel.clone();
    let watcher_thread = std::thread::Builder::new()
        .name("clipboard-watcher".to_string())
        .spawn(move || {
            let source = match SystemClipboard::new() {
                Ok(source) => source,
                Err(e) => {
                    warn!("cannot open system clipboard: {e}");
                    return;
                }
            };
            ClipboardWatcher::new(source, poll_interval).run_blocking(events_tx, watcher_cancel);
        })?;

    // Slow loop: bridge sync, only when a bridge is configured. An invalid
    // URL is an unrecoverable configuration error and aborts startup.
    let sync_task = match &config.bridge_url {
        Some(url) => {
            let bridge = HttpBridge::new(url, Duration::from_secs(config.http_timeout_secs))?;
            let client = SyncClient::new(bridge, store.clone());
            let interval = Duration::from_secs(config.sync_interval_secs);
            Some(tokio::spawn(client.run(interval, cancel.clone())))
        }
        None => {
            warn!("no bridge_url configured; capturing locally without sync");
            None
        }
    };

    info!(device_id = %device_id, "monitoring clipboard; press Ctrl-C to stop");
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                break;
            }
            event = events_rx.recv() => {
                match event {
                    Some(content) => handle_capture(&store, &patterns, &device_id, &content),
                    None => break,
                }
            }
        }
    }

    cancel.cancel();
    if let Some(task) = sync_task {
        let _ = task.await;
    }
    let _ = watcher_thread.join();
    Ok(())
}

/// Classify one capture and persist it. Capture errors never abort the
/// loop; they are logged and the next event proceeds.
fn handle_capture(store: &HistoryStore, patterns: &PatternSet, device_id: &str, content: &str) {
    let classification = patterns.classify(content);
    let mut tags: BTreeSet<String> = classification.tags;
    tags.extend(auxiliary_tags(content));

    let item = ClipboardItem::captured(content, device_id, tags);
    match store.put(item) {
        Ok(outcome) => {
            if classification.matched {
                info!(
                    inserted = outcome.inserted,
                    code = classification.extracted.as_deref().unwrap_or_default(),
                    "captured access code"
                );
            } else {
                debug!(inserted = outcome.inserted, "captured clipboard item");
            }
        }
        Err(e) => warn!("failed to store capture: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clipbridge_core::{HistoryFilter, TAG_ACCESS_CODE, TAG_CAPTURE};

    #[test]
    fn test_handle_capture_tags_and_dedups() {
        let store = HistoryStore::open_in_memory().unwrap();
        let patterns = PatternSet::with_defaults();

        handle_capture(&store, &patterns, "desk-1", "my code is CLOUD123! thanks");
        handle_capture(&store, &patterns, "desk-1", "my code is CLOUD123! thanks");

        let items = store.list(&HistoryFilter::default()).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].seen_count, 2);
        assert!(items[0].tags.contains(TAG_ACCESS_CODE));
        assert!(items[0].tags.contains(TAG_CAPTURE));

        // classified items become eligible for push
        assert_eq!(store.pending_push().unwrap().len(), 1);
    }

    #[test]
    fn test_handle_capture_plain_text_not_pushed() {
        let store = HistoryStore::open_in_memory().unwrap();
        let patterns = PatternSet::with_defaults();

        handle_capture(&store, &patterns, "desk-1", "just a note to self");
        assert_eq!(store.stats().unwrap().total_items, 1);
        assert!(store.pending_push().unwrap().is_empty());
    }
}
