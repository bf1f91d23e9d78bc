//! Filter clauses for the LanceDB table store
//!
//! Translates a `MemoryQuery` into a SQL predicate for `only_if`. Every
//! caller-supplied string goes through `sql_literal`; content search is not
//! pushed down and is evaluated in process by the backend instead.

use chrono::{DateTime, Utc};

use crate::memory::query::MemoryQuery;
use crate::memory::types::{EntryId, MemoryType};

/// Quote a string as a SQL literal, doubling embedded single quotes.
pub fn sql_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Predicate over the `memories` table.
#[derive(Debug, Clone, Default)]
pub struct LanceFilter {
    conditions: Vec<String>,
}

impl LanceFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the pushed-down part of a query. Working entries that expired
    /// before `now` are always excluded.
    pub fn from_query(query: &MemoryQuery, now: DateTime<Utc>) -> Self {
        let mut filter = Self::new().excluding_expired(now);

        if let Some(ref session_id) = query.session_id {
            filter = filter.with_session(session_id);
        }
        if let Some(ref agent_id) = query.agent_id {
            filter
                .conditions
                .push(format!("agent_id = {}", sql_literal(agent_id)));
        }
        if let Some(memory_type) = query.memory_type {
            filter = filter.with_memory_type(memory_type);
        }
        if let Some(min) = query.min_importance {
            filter.conditions.push(format!("importance >= {min}"));
        }
        if let Some(range) = query.time_range {
            if let Some(start) = range.start {
                filter
                    .conditions
                    .push(format!("created_at >= {}", start.timestamp_micros()));
            }
            if let Some(end) = range.end {
                filter
                    .conditions
                    .push(format!("created_at < {}", end.timestamp_micros()));
            }
        }

        filter
    }

    pub fn with_id(mut self, id: EntryId) -> Self {
        self.conditions.push(format!("id = '{id}'"));
        self
    }

    pub fn with_ids(mut self, ids: &[EntryId]) -> Self {
        let list = ids
            .iter()
            .map(|id| format!("'{id}'"))
            .collect::<Vec<_>>()
            .join(", ");
        self.conditions.push(format!("id IN ({list})"));
        self
    }

    pub fn with_session(mut self, session_id: &str) -> Self {
        self.conditions
            .push(format!("session_id = {}", sql_literal(session_id)));
        self
    }

    pub fn with_memory_type(mut self, memory_type: MemoryType) -> Self {
        self.conditions
            .push(format!("memory_type = '{}'", memory_type.as_str()));
        self
    }

    pub fn excluding_expired(mut self, now: DateTime<Utc>) -> Self {
        self.conditions.push(format!(
            "(expires_at IS NULL OR expires_at > {})",
            now.timestamp_micros()
        ));
        self
    }

    /// Only Working entries whose expiry has passed.
    pub fn expired_working(mut self, now: DateTime<Utc>) -> Self {
        self.conditions.push(format!(
            "memory_type = 'Working' AND expires_at IS NOT NULL AND expires_at <= {}",
            now.timestamp_micros()
        ));
        self
    }

    /// Render the predicate. Returns `None` when no condition is set.
    pub fn to_sql_clause(&self) -> Option<String> {
        if self.conditions.is_empty() {
            None
        } else {
            Some(self.conditions.join(" AND "))
        }
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }
}
