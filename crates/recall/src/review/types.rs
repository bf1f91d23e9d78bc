//! Review types for the quality gate
//!
//! Defines the candidate handed to reviewers, the score they return, the
//! lens a reviewer judges through, and reviewer-specific errors.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::memory::types::{MAX_IMPORTANCE, MemoryEntry, MemoryType};

/// What a reviewer sees of a proposed entry
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewCandidate {
    pub memory_type: MemoryType,
    pub title: String,
    pub content: String,
    pub session_id: String,
    pub agent_id: String,
    pub metadata: BTreeMap<String, String>,
}

impl ReviewCandidate {
    pub fn from_entry(entry: &MemoryEntry) -> Self {
        Self {
            memory_type: entry.memory_type(),
            title: entry.title.clone(),
            content: entry.content.clone(),
            session_id: entry.session_id.clone(),
            agent_id: entry.agent_id.clone(),
            metadata: entry.metadata.clone(),
        }
    }
}

/// A reviewer's verdict on one candidate
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewScore {
    /// 0.0 to 10.0
    pub score: f32,
    pub rationale: Option<String>,
}

impl ReviewScore {
    /// Create a score, clamped to 0-10
    pub fn new(score: f32) -> Self {
        Self {
            score: score.clamp(0.0, f32::from(MAX_IMPORTANCE)),
            rationale: None,
        }
    }

    pub fn with_rationale(mut self, rationale: impl Into<String>) -> Self {
        self.rationale = Some(rationale.into());
        self
    }
}

/// The quality a reviewer weighs most
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewLens {
    /// Will this matter to future work on the same project?
    #[default]
    Relevance,
    /// Will this still be true next week?
    Durability,
    /// Is this concrete enough to act on?
    Specificity,
}

impl ReviewLens {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewLens::Relevance => "relevance",
            ReviewLens::Durability => "durability",
            ReviewLens::Specificity => "specificity",
        }
    }
}

impl fmt::Display for ReviewLens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reviewer-specific errors. The consensus step absorbs all of them.
#[derive(Debug, thiserror::Error)]
pub enum ReviewError {
    #[error("API error: {0}")]
    Api(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Reviewer timed out after {0:?}")]
    Timeout(Duration),
}
