//! History query filters.
//!
//! All filter dimensions compose with AND semantics; an omitted dimension
//! is a no-op. Results are always ordered newest-first by the store.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{ClipboardItem, TAG_ACCESS_CODE};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryFilter {
    /// Case-insensitive substring match over content.
    pub text: Option<String>,
    /// Item must carry every requested tag (intersection semantics).
    pub tags: BTreeSet<String>,
    /// `captured_at >= now - since_hours`.
    pub since_hours: Option<u64>,
}

impl HistoryFilter {
    /// Shorthand for the access-code listing (`yourl-codes`).
    pub fn access_codes() -> Self {
        Self::default().with_tag(TAG_ACCESS_CODE)
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn with_since_hours(mut self, hours: u64) -> Self {
        self.since_hours = Some(hours);
        self
    }

    /// Lower time bound implied by `since_hours`, if any. A window too
    /// large to represent bounds nothing, so it degrades to no cutoff
    /// rather than panicking or wrapping.
    pub fn cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let hours = i64::try_from(self.since_hours?).ok()?;
        let window = Duration::try_hours(hours)?;
        now.checked_sub_signed(window)
    }

    /// Full predicate; the store prefilters text and time in SQL and
    /// re-checks everything here, so tag semantics live in one place.
    pub fn matches(&self, item: &ClipboardItem, now: DateTime<Utc>) -> bool {
        if let Some(text) = &self.text {
            if !item.content.to_lowercase().contains(&text.to_lowercase()) {
                return false;
            }
        }
        if !self.tags.iter().all(|tag| item.tags.contains(tag)) {
            return false;
        }
        if let Some(cutoff) = self.cutoff(now) {
            if item.captured_at < cutoff {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn item(content: &str, tags: &[&str], age_hours: i64) -> ClipboardItem {
        let tags: BTreeSet<String> = tags.iter().map(|s| s.to_string()).collect();
        let mut item = ClipboardItem::captured(content, "desk-1", tags);
        item.captured_at = Utc::now() - Duration::hours(age_hours);
        item
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        let filter = HistoryFilter::default();
        assert!(filter.matches(&item("anything", &[], 1000), Utc::now()));
    }

    #[test]
    fn test_text_filter_case_insensitive() {
        let filter = HistoryFilter::default().with_text("YOURL");
        assert!(filter.matches(&item("visit yourl.cloud", &[], 0), Utc::now()));
        assert!(!filter.matches(&item("something else", &[], 0), Utc::now()));
    }

    #[test]
    fn test_tag_filter_requires_all_tags() {
        let filter = HistoryFilter::default()
            .with_tag(TAG_ACCESS_CODE)
            .with_tag("url");
        assert!(filter.matches(&item("x", &[TAG_ACCESS_CODE, "url"], 0), Utc::now()));
        assert!(!filter.matches(&item("x", &[TAG_ACCESS_CODE], 0), Utc::now()));
    }

    #[test]
    fn test_since_hours_filter() {
        let filter = HistoryFilter::default().with_since_hours(24);
        assert!(filter.matches(&item("x", &[], 1), Utc::now()));
        assert!(!filter.matches(&item("x", &[], 25), Utc::now()));
    }

    #[test]
    fn test_oversized_since_hours_means_no_cutoff() {
        // windows beyond what a Duration or timestamp can represent must
        // not panic or flip the cutoff into the future
        let now = Utc::now();
        for hours in [10_000_000_000_000_u64, i64::MAX as u64 + 1, u64::MAX] {
            let filter = HistoryFilter::default().with_since_hours(hours);
            assert!(filter.cutoff(now).is_none());
            assert!(filter.matches(&item("x", &[], 0), now));
            assert!(filter.matches(&item("x", &[], 500_000), now));
        }
    }

    #[test]
    fn test_filters_compose_with_and() {
        let filter = HistoryFilter::default()
            .with_text("yourl")
            .with_tag(TAG_ACCESS_CODE)
            .with_since_hours(24);
        let now = Utc::now();
        assert!(filter.matches(&item("yourl code", &[TAG_ACCESS_CODE], 1), now));
        // each predicate failing alone rejects the item
        assert!(!filter.matches(&item("other code", &[TAG_ACCESS_CODE], 1), now));
        assert!(!filter.matches(&item("yourl code", &[], 1), now));
        assert!(!filter.matches(&item("yourl code", &[TAG_ACCESS_CODE], 48), now));
    }

    #[test]
    fn test_access_codes_shorthand() {
        let filter = HistoryFilter::access_codes();
        assert!(filter.matches(&item("x", &[TAG_ACCESS_CODE], 0), Utc::now()));
        assert!(!filter.matches(&item("x", &["url"], 0), Utc::now()));
    }
}
