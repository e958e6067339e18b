//! Clipboard polling watcher.
//!
//! The OS clipboard offers no portable change notification, so the watcher
//! diffs snapshots: each tick reads the current text and emits it only when
//! it differs from the previous tick's content. The last-seen snapshot is
//! owned by the watcher instance, so independent watchers (and tests) do
//! not share state. Read failures are transient by contract: log, treat as
//! no-change, keep polling.

use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Default poll interval: a trade-off between responsiveness and OS-call
/// overhead. Tunable via configuration.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);

#[derive(Debug, Error)]
pub enum ClipboardReadError {
    #[error("clipboard unavailable: {0}")]
    Unavailable(String),
}

/// Seam over the OS clipboard so the watcher is testable without one.
pub trait ClipboardSource {
    /// Current clipboard text; `Ok(None)` for empty or non-text content
    /// (both are non-events, not errors).
    fn read_text(&mut self) -> Result<Option<String>, ClipboardReadError>;
}

/// The real system clipboard. Reads are blocking OS calls with bounded
/// latency; callers keep them off the store's critical path.
pub struct SystemClipboard {
    inner: arboard::Clipboard,
}

impl SystemClipboard {
    pub fn new() -> Result<Self, ClipboardReadError> {
        let inner =
            arboard::Clipboard::new().map_err(|e| ClipboardReadError::Unavailable(e.to_string()))?;
        Ok(Self { inner })
    }
}

impl ClipboardSource for SystemClipboard {
    fn read_text(&mut self) -> Result<Option<String>, ClipboardReadError> {
        match self.inner.get_text() {
            Ok(text) => Ok(Some(text)),
            // empty clipboard or non-text content (image, files)
            Err(arboard::Error::ContentNotAvailable) => Ok(None),
            Err(e) => Err(ClipboardReadError::Unavailable(e.to_string())),
        }
    }
}

/// Polls a [`ClipboardSource`] and emits change events.
pub struct ClipboardWatcher<S> {
    source: S,
    last_seen: Option<String>,
    interval: Duration,
}

impl<S: ClipboardSource> ClipboardWatcher<S> {
    pub fn new(source: S, interval: Duration) -> Self {
        Self {
            source,
            last_seen: None,
            interval,
        }
    }

    /// One poll tick. Returns the new content only when it differs from
    /// the previous tick's snapshot; whitespace-only content and read
    /// failures are no-events.
    pub fn poll_once(&mut self) -> Option<String> {
        match self.source.read_text() {
            Ok(Some(content)) => {
                if content.trim().is_empty() {
                    return None;
                }
                if self.last_seen.as_deref() == Some(content.as_str()) {
                    return None;
                }
                self.last_seen = Some(content.clone());
                Some(content)
            }
            Ok(None) => None,
            Err(e) => {
                warn!("clipboard read failed, will retry: {e}");
                None
            }
        }
    }

    /// Run the polling loop until the channel closes or the token fires.
    /// Cancellation is observed within one poll interval. Blocking by
    /// design: run it on a dedicated thread, not on the async runtime.
    pub fn run_blocking(mut self, events: mpsc::Sender<String>, cancel: CancellationToken) {
        debug!(interval_ms = self.interval.as_millis() as u64, "clipboard watcher started");
        while !cancel.is_cancelled() {
            if let Some(content) = self.poll_once() {
                if events.blocking_send(content).is_err() {
                    break;
                }
            }
            std::thread::sleep(self.interval);
        }
        debug!("clipboard watcher stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Scripted source: replays a fixed sequence of reads, then holds the
    /// last value forever.
    struct ScriptedSource {
        reads: VecDeque<Result<Option<String>, ClipboardReadError>>,
    }

    impl ScriptedSource {
        fn new(reads: Vec<Result<Option<String>, ClipboardReadError>>) -> Self {
            Self {
                reads: reads.into(),
            }
        }
    }

    impl ClipboardSource for ScriptedSource {
        fn read_text(&mut self) -> Result<Option<String>, ClipboardReadError> {
            if self.reads.len() > 1 {
                self.reads.pop_front().unwrap()
            } else {
                match self.reads.front() {
                    Some(Ok(v)) => Ok(v.clone()),
                    Some(Err(e)) => Err(ClipboardReadError::Unavailable(e.to_string())),
                    None => Ok(None),
                }
            }
        }
    }

    fn some(s: &str) -> Result<Option<String>, ClipboardReadError> {
        Ok(Some(s.to_string()))
    }

    #[test]
    fn test_emits_only_on_change() {
        let source = ScriptedSource::new(vec![
            some("first"),
            some("first"),
            some("second"),
            some("second"),
        ]);
        let mut watcher = ClipboardWatcher::new(source, Duration::from_millis(1));

        assert_eq!(watcher.poll_once().as_deref(), Some("first"));
        assert_eq!(watcher.poll_once(), None);
        assert_eq!(watcher.poll_once().as_deref(), Some("second"));
        assert_eq!(watcher.poll_once(), None);
    }

    #[test]
    fn test_empty_and_nontext_are_no_events() {
        let source = ScriptedSource::new(vec![Ok(None), some("   \n"), some("real content")]);
        let mut watcher = ClipboardWatcher::new(source, Duration::from_millis(1));

        assert_eq!(watcher.poll_once(), None);
        assert_eq!(watcher.poll_once(), None);
        assert_eq!(watcher.poll_once().as_deref(), Some("real content"));
    }

    #[test]
    fn test_read_errors_do_not_stop_polling() {
        let source = ScriptedSource::new(vec![
            Err(ClipboardReadError::Unavailable("locked".to_string())),
            some("after recovery"),
        ]);
        let mut watcher = ClipboardWatcher::new(source, Duration::from_millis(1));

        assert_eq!(watcher.poll_once(), None);
        assert_eq!(watcher.poll_once().as_deref(), Some("after recovery"));
    }

    #[test]
    fn test_independent_watchers_have_independent_snapshots() {
        let mut a = ClipboardWatcher::new(
            ScriptedSource::new(vec![some("x")]),
            Duration::from_millis(1),
        );
        let mut b = ClipboardWatcher::new(
            ScriptedSource::new(vec![some("x")]),
            Duration::from_millis(1),
        );
        assert!(a.poll_once().is_some());
        // a's snapshot does not suppress b's first sighting
        assert!(b.poll_once().is_some());
    }

    #[test]
    fn test_run_blocking_emits_and_cancels_promptly() {
        let (tx, mut rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        let watcher = ClipboardWatcher::new(
            ScriptedSource::new(vec![some("CLOUD123!"), some("second copy")]),
            Duration::from_millis(5),
        );

        let cancel_for_loop = cancel.clone();
        let handle = std::thread::spawn(move || watcher.run_blocking(tx, cancel_for_loop));

        assert_eq!(rx.blocking_recv().as_deref(), Some("CLOUD123!"));
        assert_eq!(rx.blocking_recv().as_deref(), Some("second copy"));

        cancel.cancel();
        handle.join().unwrap();
        // sender dropped with the loop
        assert!(rx.blocking_recv().is_none());
    }
}
