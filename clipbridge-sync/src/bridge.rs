//! Bridge wire types and HTTP transport.
//!
//! The bridge stores classified items and redistributes them across a
//! user's devices. Its write endpoint is idempotent on
//! `(content_hash, device_id)`, which is what makes retry-forever push
//! semantics safe.

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use clipbridge_core::ClipboardItem;

/// One item on the wire: `POST /items` body element and `GET /items`
/// response element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeItem {
    pub content_hash: String,
    pub content: String,
    pub device_id: String,
    pub captured_at: DateTime<Utc>,
    pub tags: BTreeSet<String>,
}

impl BridgeItem {
    pub fn from_item(item: &ClipboardItem) -> Self {
        Self {
            content_hash: item.content_hash.clone(),
            content: item.content.clone(),
            device_id: item.device_id.clone(),
            captured_at: item.captured_at,
            tags: item.tags.clone(),
        }
    }

    /// Convert a pulled wire item into a remote-origin store item.
    pub fn into_item(self) -> ClipboardItem {
        ClipboardItem::pulled(&self.content, &self.device_id, self.captured_at, self.tags)
    }
}

/// Batch push outcome as reported by the bridge. Counts only; the remote
/// write is idempotent, so duplicates show up as accepted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushReceipt {
    pub accepted: usize,
    pub rejected: usize,
}

#[derive(Debug, Error)]
pub enum BridgeError {
    /// Network-level failure (DNS, connect, timeout). Retried with backoff.
    #[error("bridge transport error: {0}")]
    Transport(String),
    /// Bridge-side failure (5xx). Retried with backoff.
    #[error("bridge returned server error {status}")]
    Server { status: u16 },
    /// Bad URL, bad credentials, rejected request shape (4xx). Fatal to
    /// the sync loop; surfaced to the operator.
    #[error("bridge configuration error: {0}")]
    Config(String),
}

impl BridgeError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, BridgeError::Transport(_) | BridgeError::Server { .. })
    }
}

/// Seam over the bridge so the sync client is testable without a network.
#[async_trait]
pub trait BridgeTransport: Send + Sync {
    /// Push a batch of classified items. Idempotent on the remote side.
    async fn push(&self, items: &[BridgeItem]) -> Result<PushReceipt, BridgeError>;

    /// Fetch items captured after `since`, across all of the user's devices.
    async fn pull(&self, since: DateTime<Utc>) -> Result<Vec<BridgeItem>, BridgeError>;
}

#[async_trait]
impl<T: BridgeTransport + ?Sized> BridgeTransport for std::sync::Arc<T> {
    async fn push(&self, items: &[BridgeItem]) -> Result<PushReceipt, BridgeError> {
        (**self).push(items).await
    }

    async fn pull(&self, since: DateTime<Utc>) -> Result<Vec<BridgeItem>, BridgeError> {
        (**self).pull(since).await
    }
}

/// The real bridge over HTTP: `POST {base}/items`, `GET {base}/items?since=`.
#[derive(Debug)]
pub struct HttpBridge {
    client: reqwest::Client,
    items_url: Url,
}

impl HttpBridge {
    /// Validates the base URL up front; an unparseable or non-HTTP URL is
    /// a configuration error, not something to retry against.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, BridgeError> {
        let base = Url::parse(base_url)
            .map_err(|e| BridgeError::Config(format!("invalid bridge URL {base_url:?}: {e}")))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(BridgeError::Config(format!(
                "bridge URL must be http(s), got {base_url:?}"
            )));
        }
        let items_url = base
            .join("items")
            .map_err(|e| BridgeError::Config(format!("invalid bridge URL {base_url:?}: {e}")))?;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BridgeError::Transport(e.to_string()))?;

        Ok(Self { client, items_url })
    }

    fn check_status(status: reqwest::StatusCode) -> Result<(), BridgeError> {
        if status.is_success() {
            Ok(())
        } else if status.is_server_error() {
            Err(BridgeError::Server {
                status: status.as_u16(),
            })
        } else {
            Err(BridgeError::Config(format!(
                "bridge rejected request with status {status}"
            )))
        }
    }
}

#[async_trait]
impl BridgeTransport for HttpBridge {
    async fn push(&self, items: &[BridgeItem]) -> Result<PushReceipt, BridgeError> {
        let response = self
            .client
            .post(self.items_url.clone())
            .json(items)
            .send()
            .await
            .map_err(|e| BridgeError::Transport(e.to_string()))?;

        Self::check_status(response.status())?;
        response
            .json::<PushReceipt>()
            .await
            .map_err(|e| BridgeError::Transport(format!("bad push response body: {e}")))
    }

    async fn pull(&self, since: DateTime<Utc>) -> Result<Vec<BridgeItem>, BridgeError> {
        let response = self
            .client
            .get(self.items_url.clone())
            .query(&[("since", since.to_rfc3339())])
            .send()
            .await
            .map_err(|e| BridgeError::Transport(e.to_string()))?;

        Self::check_status(response.status())?;
        response
            .json::<Vec<BridgeItem>>()
            .await
            .map_err(|e| BridgeError::Transport(format!("bad pull response body: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clipbridge_core::{Origin, TAG_ACCESS_CODE, TAG_REMOTE};

    #[test]
    fn test_invalid_bridge_url_is_config_error() {
        let err = HttpBridge::new("not a url", Duration::from_secs(5)).unwrap_err();
        assert!(matches!(err, BridgeError::Config(_)));
        assert!(!err.is_retryable());

        let err = HttpBridge::new("ftp://cb.yourl.cloud", Duration::from_secs(5)).unwrap_err();
        assert!(matches!(err, BridgeError::Config(_)));
    }

    #[test]
    fn test_error_retryability() {
        assert!(BridgeError::Transport("timeout".to_string()).is_retryable());
        assert!(BridgeError::Server { status: 503 }.is_retryable());
        assert!(!BridgeError::Config("bad auth".to_string()).is_retryable());
    }

    #[test]
    fn test_wire_roundtrip_yields_remote_origin() {
        let local = ClipboardItem::captured(
            "CLOUD123!",
            "desk-1",
            [TAG_ACCESS_CODE.to_string()].into_iter().collect(),
        );
        let wire = BridgeItem::from_item(&local);
        assert_eq!(wire.content_hash, local.content_hash);

        let merged = wire.into_item();
        assert_eq!(merged.origin, Origin::Remote);
        assert_eq!(merged.content_hash, local.content_hash);
        assert!(merged.tags.contains(TAG_REMOTE));
        assert!(merged.synced_at.is_none());
    }
}
