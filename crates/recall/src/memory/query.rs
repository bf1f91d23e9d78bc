//! Query type for memory reads
//!
//! A `MemoryQuery` narrows reads by text, owner, type, importance, and time.
//! All fields are optional except `limit`; set fields combine with AND logic.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::memory::types::{MAX_IMPORTANCE, MemoryEntry, MemoryType};

/// Smallest accepted `limit`
pub const MIN_LIMIT: usize = 1;
/// Largest accepted `limit`
pub const MAX_LIMIT: usize = 1000;

/// Half-open window on `created_at`: `start <= created_at < end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl TimeRange {
    pub fn between(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }

    pub fn since(start: DateTime<Utc>) -> Self {
        Self {
            start: Some(start),
            end: None,
        }
    }

    pub fn until(end: DateTime<Utc>) -> Self {
        Self {
            start: None,
            end: Some(end),
        }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start.is_none_or(|s| at >= s) && self.end.is_none_or(|e| at < e)
    }
}

/// Read criteria for a backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryQuery {
    /// Case-insensitive substring matched against title and content
    pub content_search: Option<String>,
    pub session_id: Option<String>,
    pub agent_id: Option<String>,
    pub memory_type: Option<MemoryType>,
    /// Minimum importance (inclusive); ungated entries never match
    pub min_importance: Option<u8>,
    pub time_range: Option<TimeRange>,
    /// Maximum number of entries to return
    pub limit: usize,
}

impl Default for MemoryQuery {
    fn default() -> Self {
        Self {
            content_search: None,
            session_id: None,
            agent_id: None,
            memory_type: None,
            min_importance: None,
            time_range: None,
            limit: 50,
        }
    }
}

impl MemoryQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_content_search(mut self, text: impl Into<String>) -> Self {
        self.content_search = Some(text.into());
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    pub fn with_memory_type(mut self, memory_type: MemoryType) -> Self {
        self.memory_type = Some(memory_type);
        self
    }

    pub fn with_min_importance(mut self, min_importance: u8) -> Self {
        self.min_importance = Some(min_importance);
        self
    }

    pub fn with_time_range(mut self, range: TimeRange) -> Self {
        self.time_range = Some(range);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Reject pathological values before anything reaches a backend.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(MIN_LIMIT..=MAX_LIMIT).contains(&self.limit) {
            return Err(ValidationError::LimitOutOfRange(self.limit));
        }
        if let Some(min) = self.min_importance {
            if min > MAX_IMPORTANCE {
                return Err(ValidationError::ImportanceOutOfRange(min));
            }
        }
        if let Some(TimeRange {
            start: Some(start),
            end: Some(end),
        }) = self.time_range
        {
            if start > end {
                return Err(ValidationError::InvertedTimeRange);
            }
        }
        for (name, value) in [
            ("content_search", &self.content_search),
            ("session_id", &self.session_id),
            ("agent_id", &self.agent_id),
        ] {
            if value.as_deref().is_some_and(|v| v.trim().is_empty()) {
                return Err(ValidationError::EmptyField(name));
            }
        }
        Ok(())
    }

    /// Evaluate this query's filters against one entry in process.
    ///
    /// Backends use this for predicates they do not push down to the store.
    pub fn matches(&self, entry: &MemoryEntry, now: DateTime<Utc>) -> bool {
        if entry.is_expired(now) {
            return false;
        }
        if let Some(ref needle) = self.content_search {
            if !contains_ignore_case(&entry.title, needle)
                && !contains_ignore_case(&entry.content, needle)
            {
                return false;
            }
        }
        if self.session_id.as_ref().is_some_and(|s| *s != entry.session_id) {
            return false;
        }
        if self.agent_id.as_ref().is_some_and(|a| *a != entry.agent_id) {
            return false;
        }
        if self.memory_type.is_some_and(|t| t != entry.memory_type()) {
            return false;
        }
        if let Some(min) = self.min_importance {
            if entry.importance.is_none_or(|i| i < min) {
                return false;
            }
        }
        if let Some(range) = self.time_range {
            if !range.contains(entry.created_at) {
                return false;
            }
        }
        true
    }
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Ranking order shared by every read path: higher importance first, then
/// newer `created_at`, then id so the order is total.
pub fn rank_order(a: &MemoryEntry, b: &MemoryEntry) -> std::cmp::Ordering {
    b.importance
        .unwrap_or(0)
        .cmp(&a.importance.unwrap_or(0))
        .then_with(|| b.created_at.cmp(&a.created_at))
        .then_with(|| a.id.cmp(&b.id))
}
