//! Node and edge types for the graph backend

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::memory::types::EntryId;

/// Kind of a code-structure node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CodeNodeKind {
    File,
    Class,
    Function,
}

impl CodeNodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CodeNodeKind::File => "File",
            CodeNodeKind::Class => "Class",
            CodeNodeKind::Function => "Function",
        }
    }
}

impl FromStr for CodeNodeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "File" => Ok(CodeNodeKind::File),
            "Class" => Ok(CodeNodeKind::Class),
            "Function" => Ok(CodeNodeKind::Function),
            other => Err(format!("Unknown code node kind: {other}")),
        }
    }
}

/// A file, class, or function known to the code-structure graph.
///
/// Identity is `(kind, path, name)`; upserting the same triple again only
/// refreshes the summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeNode {
    pub kind: CodeNodeKind,
    /// Repository-relative path of the file that defines the node
    pub path: String,
    pub name: String,
    pub summary: Option<String>,
}

impl CodeNode {
    /// A file node; its name is the last path segment.
    pub fn file(path: impl Into<String>) -> Self {
        let path = path.into();
        let name = path
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(path.as_str())
            .to_string();
        Self {
            kind: CodeNodeKind::File,
            path,
            name,
            summary: None,
        }
    }

    pub fn class(path: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: CodeNodeKind::Class,
            path: path.into(),
            name: name.into(),
            summary: None,
        }
    }

    pub fn function(path: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: CodeNodeKind::Function,
            path: path.into(),
            name: name.into(),
            summary: None,
        }
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    /// One-line label used when rendering code context
    pub fn label(&self) -> String {
        match self.kind {
            CodeNodeKind::File => format!("file {}", self.path),
            CodeNodeKind::Class => format!("class {} ({})", self.name, self.path),
            CodeNodeKind::Function => format!("fn {} ({})", self.name, self.path),
        }
    }
}

/// Reference to any node in the graph
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeRef {
    Memory(EntryId),
    Session(String),
    /// Row id returned by `GraphBackend::upsert_code_node`
    Code(i64),
}

impl NodeRef {
    pub(crate) fn kind_str(&self) -> &'static str {
        match self {
            NodeRef::Memory(_) => "memory",
            NodeRef::Session(_) => "session",
            NodeRef::Code(_) => "code",
        }
    }

    pub(crate) fn key(&self) -> String {
        match self {
            NodeRef::Memory(id) => id.to_string(),
            NodeRef::Session(id) => id.clone(),
            NodeRef::Code(id) => id.to_string(),
        }
    }

    pub(crate) fn from_columns(kind: &str, key: &str) -> Result<Self, String> {
        match kind {
            "memory" => uuid::Uuid::parse_str(key)
                .map(NodeRef::Memory)
                .map_err(|e| format!("Invalid memory node id '{key}': {e}")),
            "session" => Ok(NodeRef::Session(key.to_string())),
            "code" => key
                .parse::<i64>()
                .map(NodeRef::Code)
                .map_err(|e| format!("Invalid code node id '{key}': {e}")),
            other => Err(format!("Unknown node kind: {other}")),
        }
    }
}

/// Edge types. Each constrains which node kinds it may connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationType {
    /// entry -> entry
    RelatesTo,
    /// entry -> entry; the source replaces the target
    Supersedes,
    /// entry -> entry
    FollowsFrom,
    /// entry -> session; created on write
    InSession,
    ReferencesFile,
    ReferencesClass,
    ReferencesFunction,
    /// code -> code
    Contains,
}

impl RelationType {
    pub const ALL: [RelationType; 8] = [
        RelationType::RelatesTo,
        RelationType::Supersedes,
        RelationType::FollowsFrom,
        RelationType::InSession,
        RelationType::ReferencesFile,
        RelationType::ReferencesClass,
        RelationType::ReferencesFunction,
        RelationType::Contains,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RelationType::RelatesTo => "RelatesTo",
            RelationType::Supersedes => "Supersedes",
            RelationType::FollowsFrom => "FollowsFrom",
            RelationType::InSession => "InSession",
            RelationType::ReferencesFile => "ReferencesFile",
            RelationType::ReferencesClass => "ReferencesClass",
            RelationType::ReferencesFunction => "ReferencesFunction",
            RelationType::Contains => "Contains",
        }
    }

    /// Code node kind the target must have, for entry -> code edges
    pub fn target_code_kind(&self) -> Option<CodeNodeKind> {
        match self {
            RelationType::ReferencesFile => Some(CodeNodeKind::File),
            RelationType::ReferencesClass => Some(CodeNodeKind::Class),
            RelationType::ReferencesFunction => Some(CodeNodeKind::Function),
            _ => None,
        }
    }

    fn endpoints(&self) -> (&'static str, &'static str) {
        match self {
            RelationType::RelatesTo | RelationType::Supersedes | RelationType::FollowsFrom => {
                ("memory", "memory")
            }
            RelationType::InSession => ("memory", "session"),
            RelationType::ReferencesFile
            | RelationType::ReferencesClass
            | RelationType::ReferencesFunction => ("memory", "code"),
            RelationType::Contains => ("code", "code"),
        }
    }
}

impl fmt::Display for RelationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RelationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RelationType::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| format!("Unknown relationship type: {s}"))
    }
}

/// A directed, typed edge. Duplicate edges between the same pair are allowed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    /// Set once the edge is stored
    pub id: Option<i64>,
    pub source: NodeRef,
    pub target: NodeRef,
    pub rel_type: RelationType,
    /// 0.0 to 1.0
    pub relevance_score: f32,
    pub context: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Relationship {
    pub fn new(source: NodeRef, rel_type: RelationType, target: NodeRef) -> Self {
        Self {
            id: None,
            source,
            target,
            rel_type,
            relevance_score: 1.0,
            context: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_relevance(mut self, score: f32) -> Self {
        self.relevance_score = score;
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Check the score range and that the endpoint kinds fit the edge type.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(0.0..=1.0).contains(&self.relevance_score) {
            return Err(ValidationError::RelevanceOutOfRange(self.relevance_score));
        }
        let (source_kind, target_kind) = self.rel_type.endpoints();
        if self.source.kind_str() != source_kind || self.target.kind_str() != target_kind {
            return Err(ValidationError::InvalidRelationship(format!(
                "{} connects {} -> {}, got {} -> {}",
                self.rel_type,
                source_kind,
                target_kind,
                self.source.kind_str(),
                self.target.kind_str()
            )));
        }
        Ok(())
    }
}

/// A code node one hop from an entry, as returned by `code_context`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeLink {
    pub entry_id: EntryId,
    pub relation: RelationType,
    pub node: CodeNode,
    pub relevance_score: f32,
    pub context: Option<String>,
}
