//! Memory types for the Recall engine
//!
//! Defines the `MemoryEntry` record, the closed set of memory kinds,
//! and the validation rules every entry must pass before it is stored.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

/// Unique identifier of a memory entry
pub type EntryId = Uuid;

/// Metadata key the retrieval pipeline writes code-context summaries under.
/// Callers may not set it themselves.
pub const CODE_CONTEXT_KEY: &str = "code_context";

/// Highest importance the quality gate can assign
pub const MAX_IMPORTANCE: u8 = 10;

/// Characters per approximate token.
///
/// An entry's estimate is `ceil((chars(title) + chars(content)) / CHARS_PER_TOKEN)`,
/// one ceiling over the combined length, counting Unicode scalar values.
pub const CHARS_PER_TOKEN: usize = 4;

/// A single memory record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    /// Unique identifier, generated at creation
    pub id: EntryId,
    /// Kind of memory; fixed for the lifetime of the entry
    memory_type: MemoryType,
    /// Short human-readable summary
    pub title: String,
    /// Body text
    pub content: String,
    /// Session that owns this entry
    pub session_id: String,
    /// Agent that created this entry
    pub agent_id: String,
    pub created_at: DateTime<Utc>,
    /// Bumped whenever the entry is returned by a retrieval
    pub accessed_at: DateTime<Utc>,
    /// Quality-gate verdict (0-10); `None` until gated
    pub importance: Option<u8>,
    /// Open key/value annotations
    pub metadata: BTreeMap<String, String>,
    /// Expiry for Working memory
    pub expires_at: Option<DateTime<Utc>>,
}

impl MemoryEntry {
    /// Create a new entry with a fresh id and current timestamps.
    pub fn new(
        memory_type: MemoryType,
        title: impl Into<String>,
        content: impl Into<String>,
        session_id: impl Into<String>,
        agent_id: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            memory_type,
            title: title.into(),
            content: content.into(),
            session_id: session_id.into(),
            agent_id: agent_id.into(),
            created_at: now,
            accessed_at: now,
            importance: None,
            metadata: BTreeMap::new(),
            expires_at: None,
        }
    }

    /// Rebuild an entry from persisted columns. Used by storage backends only.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        id: EntryId,
        memory_type: MemoryType,
        title: String,
        content: String,
        session_id: String,
        agent_id: String,
        created_at: DateTime<Utc>,
        accessed_at: DateTime<Utc>,
        importance: Option<u8>,
        metadata: BTreeMap<String, String>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id,
            memory_type,
            title,
            content,
            session_id,
            agent_id,
            created_at,
            accessed_at,
            importance,
            metadata,
            expires_at,
        }
    }

    pub fn memory_type(&self) -> MemoryType {
        self.memory_type
    }

    pub fn with_metadata(mut self, metadata: BTreeMap<String, String>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Record that this entry was returned to a caller
    pub fn mark_accessed(&mut self, at: DateTime<Utc>) {
        self.accessed_at = at;
    }

    /// Working entries past their expiry are invisible to reads
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.memory_type == MemoryType::Working && self.expires_at.is_some_and(|exp| exp <= now)
    }

    /// Approximate size of this entry in tokens.
    pub fn estimated_tokens(&self) -> usize {
        (self.title.chars().count() + self.content.chars().count()).div_ceil(CHARS_PER_TOKEN)
    }

    /// Check the creation-time invariants of this entry.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate(self, Utc::now())
    }
}

/// Estimate token count from character length.
#[inline]
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

/// Validate a freshly built entry against `now`.
///
/// Expiry is only checked against the clock here, at creation; entries that
/// expire later are still valid records.
pub fn validate(entry: &MemoryEntry, now: DateTime<Utc>) -> Result<(), ValidationError> {
    if entry.title.trim().is_empty() {
        return Err(ValidationError::EmptyTitle);
    }
    if entry.session_id.trim().is_empty() {
        return Err(ValidationError::EmptyField("session_id"));
    }
    if entry.agent_id.trim().is_empty() {
        return Err(ValidationError::EmptyField("agent_id"));
    }

    if let Some(expires_at) = entry.expires_at {
        if entry.memory_type != MemoryType::Working {
            return Err(ValidationError::ExpiryNotAllowed(entry.memory_type));
        }
        if expires_at <= now {
            return Err(ValidationError::ExpiryInPast);
        }
    }

    if let Some(importance) = entry.importance {
        if importance > MAX_IMPORTANCE {
            return Err(ValidationError::ImportanceOutOfRange(importance));
        }
    }

    if entry.metadata.contains_key(CODE_CONTEXT_KEY) {
        return Err(ValidationError::ReservedMetadataKey(
            CODE_CONTEXT_KEY.to_string(),
        ));
    }

    Ok(())
}

/// The five kinds of memory. A closed set: new behavior is keyed off the
/// variant, never added by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MemoryType {
    /// A specific event or decision tied to one session
    Episodic,
    /// A durable fact or concept, independent of any session
    Semantic,
    /// A reusable how-to sequence
    Procedural,
    /// A future intention; lives until fulfilled or superseded
    Prospective,
    /// Session-scoped scratch context; expires and is cleared at session end
    Working,
}

impl MemoryType {
    pub const ALL: [MemoryType; 5] = [
        MemoryType::Episodic,
        MemoryType::Semantic,
        MemoryType::Procedural,
        MemoryType::Prospective,
        MemoryType::Working,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryType::Episodic => "Episodic",
            MemoryType::Semantic => "Semantic",
            MemoryType::Procedural => "Procedural",
            MemoryType::Prospective => "Prospective",
            MemoryType::Working => "Working",
        }
    }

    /// Whether entries of this kind go through reviewer consensus
    pub fn is_gated(&self) -> bool {
        !matches!(self, MemoryType::Working)
    }
}

impl fmt::Display for MemoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemoryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "episodic" => Ok(MemoryType::Episodic),
            "semantic" => Ok(MemoryType::Semantic),
            "procedural" => Ok(MemoryType::Procedural),
            "prospective" => Ok(MemoryType::Prospective),
            "working" => Ok(MemoryType::Working),
            other => Err(format!("Unknown memory type: {other}")),
        }
    }
}
