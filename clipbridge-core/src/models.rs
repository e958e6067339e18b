//! Core data model for captured clipboard items.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Maximum stored content size. Larger captures are truncated on a char
/// boundary and flagged; the content hash is always computed over the full
/// text so dedup and cross-device merge see the logical item.
pub const MAX_CONTENT_BYTES: usize = 64 * 1024;

/// Tag applied when the pattern detector matched an access code.
pub const TAG_ACCESS_CODE: &str = "access-code";
/// Capture-source tag for items observed on this device's clipboard.
pub const TAG_CAPTURE: &str = "capture";
/// Capture-source tag for items pulled from the bridge.
pub const TAG_REMOTE: &str = "remote";

/// Where an item entered the local store.
///
/// Remote-origin items are never pushed back to the bridge; that is what
/// keeps two devices pulling from each other from looping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Local,
    Remote,
}

impl Origin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Origin::Local => "local",
            Origin::Remote => "remote",
        }
    }

    pub fn parse(s: &str) -> Option<Origin> {
        match s {
            "local" => Some(Origin::Local),
            "remote" => Some(Origin::Remote),
            _ => None,
        }
    }
}

/// One captured clipboard snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipboardItem {
    /// Stable identifier derived from the content hash and first-seen time.
    pub id: String,
    pub content: String,
    /// True when `content` was cut down to [`MAX_CONTENT_BYTES`].
    pub truncated: bool,
    /// SHA-256 hex of the full (pre-truncation) content; dedup and merge key.
    pub content_hash: String,
    pub captured_at: DateTime<Utc>,
    pub device_id: String,
    /// Never empty; always carries a capture-source tag.
    pub tags: BTreeSet<String>,
    pub origin: Origin,
    /// Set once the item has been accepted by the bridge.
    pub synced_at: Option<DateTime<Utc>>,
    /// Bumped when identical content is captured again.
    pub seen_count: i64,
}

/// SHA-256 hex digest of the content, stable across devices and builds.
pub fn hash_content(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

/// Truncate to the size bound on a char boundary. Returns (text, truncated).
fn bound_content(content: &str) -> (String, bool) {
    if content.len() <= MAX_CONTENT_BYTES {
        return (content.to_string(), false);
    }
    let mut end = MAX_CONTENT_BYTES;
    while !content.is_char_boundary(end) {
        end -= 1;
    }
    (content[..end].to_string(), true)
}

impl ClipboardItem {
    /// Build an item for content observed on the local clipboard.
    pub fn captured(content: &str, device_id: &str, tags: BTreeSet<String>) -> Self {
        Self::assemble(content, device_id, Utc::now(), tags, Origin::Local, TAG_CAPTURE)
    }

    /// Build an item for content pulled from the bridge.
    pub fn pulled(
        content: &str,
        device_id: &str,
        captured_at: DateTime<Utc>,
        tags: BTreeSet<String>,
    ) -> Self {
        Self::assemble(content, device_id, captured_at, tags, Origin::Remote, TAG_REMOTE)
    }

    fn assemble(
        content: &str,
        device_id: &str,
        captured_at: DateTime<Utc>,
        mut tags: BTreeSet<String>,
        origin: Origin,
        source_tag: &str,
    ) -> Self {
        let content_hash = hash_content(content);
        let (content, truncated) = bound_content(content);
        tags.insert(source_tag.to_string());
        Self {
            id: Self::derive_id(&content_hash, captured_at),
            content,
            truncated,
            content_hash,
            captured_at,
            device_id: device_id.to_string(),
            tags,
            origin,
            synced_at: None,
            seen_count: 1,
        }
    }

    /// `{hash prefix}-{unix seconds}`; idempotent for re-insertion of the
    /// same logical item.
    pub fn derive_id(content_hash: &str, captured_at: DateTime<Utc>) -> String {
        let prefix = &content_hash[..content_hash.len().min(16)];
        format!("{}-{}", prefix, captured_at.timestamp())
    }

    pub fn is_access_code(&self) -> bool {
        self.tags.contains(TAG_ACCESS_CODE)
    }

    /// Display text (truncated, normalized whitespace) for list previews.
    pub fn preview(&self, max_chars: usize) -> String {
        normalize_preview(&self.content, max_chars)
    }
}

/// Normalize text for preview display (truncate, normalize whitespace)
/// - Skips leading whitespace
/// - Collapses consecutive whitespace to single space
/// - Converts newlines/tabs to spaces
/// - Truncates at max_chars with ellipsis
pub fn normalize_preview(text: &str, max_chars: usize) -> String {
    let mut result = String::with_capacity(max_chars + 1);
    let mut chars = text.chars().peekable();

    while chars.peek().map(|c| c.is_whitespace()).unwrap_or(false) {
        chars.next();
    }

    let mut last_was_space = false;
    let mut count = 0;

    for ch in chars {
        if count >= max_chars {
            result.push('…');
            return result;
        }

        let ch = match ch {
            '\n' | '\t' | '\r' => ' ',
            c => c,
        };

        if ch == ' ' {
            if last_was_space {
                continue;
            }
            last_was_space = true;
        } else {
            last_was_space = false;
        }

        result.push(ch);
        count += 1;
    }

    while result.ends_with(' ') {
        result.pop();
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_captured_item_fields() {
        let item = ClipboardItem::captured("Hello World", "desk-1", tags(&[TAG_ACCESS_CODE]));
        assert_eq!(item.content, "Hello World");
        assert!(!item.truncated);
        assert_eq!(item.origin, Origin::Local);
        assert_eq!(item.seen_count, 1);
        assert!(item.synced_at.is_none());
        assert!(item.tags.contains(TAG_CAPTURE));
        assert!(item.is_access_code());
    }

    #[test]
    fn test_tags_never_empty() {
        let item = ClipboardItem::captured("plain text", "desk-1", BTreeSet::new());
        assert_eq!(item.tags, tags(&[TAG_CAPTURE]));

        let pulled = ClipboardItem::pulled("plain text", "laptop", Utc::now(), BTreeSet::new());
        assert_eq!(pulled.tags, tags(&[TAG_REMOTE]));
        assert_eq!(pulled.origin, Origin::Remote);
    }

    #[test]
    fn test_hash_is_stable_and_content_keyed() {
        assert_eq!(hash_content("CLOUD123!"), hash_content("CLOUD123!"));
        assert_ne!(hash_content("CLOUD123!"), hash_content("CLOUD124!"));
        // sha256 hex
        assert_eq!(hash_content("x").len(), 64);
    }

    #[test]
    fn test_identical_content_same_hash_different_device() {
        let a = ClipboardItem::captured("CLOUD123!", "desk-1", BTreeSet::new());
        let b = ClipboardItem::captured("CLOUD123!", "laptop", BTreeSet::new());
        assert_eq!(a.content_hash, b.content_hash);
    }

    #[test]
    fn test_oversized_content_truncated_hash_of_full_text() {
        let big = "a".repeat(MAX_CONTENT_BYTES + 100);
        let item = ClipboardItem::captured(&big, "desk-1", BTreeSet::new());
        assert!(item.truncated);
        assert_eq!(item.content.len(), MAX_CONTENT_BYTES);
        assert_eq!(item.content_hash, hash_content(&big));
    }

    #[test]
    fn test_truncation_respects_char_boundary() {
        // 4-byte scalar straddling the boundary must not split
        let mut big = "a".repeat(MAX_CONTENT_BYTES - 2);
        big.push('🦀');
        big.push_str(&"b".repeat(50));
        let item = ClipboardItem::captured(&big, "desk-1", BTreeSet::new());
        assert!(item.truncated);
        assert!(item.content.len() <= MAX_CONTENT_BYTES);
        assert!(item.content.is_char_boundary(item.content.len()));
    }

    #[test]
    fn test_derive_id_stable() {
        let at = Utc::now();
        let hash = hash_content("CLOUD123!");
        assert_eq!(
            ClipboardItem::derive_id(&hash, at),
            ClipboardItem::derive_id(&hash, at)
        );
    }

    #[test]
    fn test_preview_normalizes_whitespace() {
        let item = ClipboardItem::captured("  hello\n\nworld  ", "desk-1", BTreeSet::new());
        assert_eq!(item.preview(200), "hello world");
    }
}
