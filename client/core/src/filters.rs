//! Retrieval Filters
//!
//! Opaque filter values the caller builds from its selections and the
//! stream source passes through to the backend unmodified.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A metadata tag on indexed documents
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tag {
    /// Tag key
    pub tag_key: String,
    /// Tag value
    pub tag_value: String,
}

/// Time window selected by the user
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimeRange {
    /// Start of the window
    pub from: DateTime<Utc>,
    /// End of the window
    pub to: DateTime<Utc>,
}

impl TimeRange {
    /// The last `days` days up to now
    #[must_use]
    pub fn last_days(days: u32) -> Self {
        let to = Utc::now();
        Self {
            from: to - Duration::days(i64::from(days)),
            to,
        }
    }
}

/// Retrieval filters sent with every question
///
/// Absent fields mean "no restriction".
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Filters {
    /// Allowed connector sources
    pub source_type: Option<Vec<String>>,
    /// Allowed document sets
    pub document_set: Option<Vec<String>>,
    /// Only documents updated after this instant
    pub time_cutoff: Option<DateTime<Utc>>,
    /// Required tags
    pub tags: Option<Vec<Tag>>,
}

impl Filters {
    /// Whether no restriction is set
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.source_type.is_none()
            && self.document_set.is_none()
            && self.time_cutoff.is_none()
            && self.tags.is_none()
    }
}

fn non_empty<T: Clone>(items: &[T]) -> Option<Vec<T>> {
    (!items.is_empty()).then(|| items.to_vec())
}

/// Build filters from the user's current selections
#[must_use]
pub fn build_filters(
    sources: &[String],
    document_sets: &[String],
    time_range: Option<&TimeRange>,
    tags: &[Tag],
) -> Filters {
    Filters {
        source_type: non_empty(sources),
        document_set: non_empty(document_sets),
        time_cutoff: time_range.map(|range| range.from),
        tags: non_empty(tags),
    }
}
