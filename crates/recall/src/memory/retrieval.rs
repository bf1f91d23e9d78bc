//! Memory Retrieval with Token Budgeting
//!
//! This module implements the read path:
//! 1. Filtered, ranked read from the backend
//! 2. Whole-entry packing into the caller's token budget
//! 3. Optional code-context enrichment from the graph
//! 4. Access-time bookkeeping for the entries handed back

use std::sync::Arc;

use chrono::{SubsecRound, Utc};
use tracing::{debug, warn};

use crate::error::{Result, ValidationError};
use crate::memory::query::{MemoryQuery, rank_order};
use crate::memory::types::{CODE_CONTEXT_KEY, EntryId, MemoryEntry};
use crate::storage::{CodeLink, MemoryBackend, with_retry};

/// A caller's retrieval request
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalRequest {
    pub query: MemoryQuery,
    /// Upper bound on the summed token estimate of returned entries
    pub token_budget: usize,
    /// Attach linked code nodes under the `code_context` metadata key
    pub include_code_context: bool,
}

impl RetrievalRequest {
    pub fn new(query: MemoryQuery, token_budget: usize) -> Self {
        Self {
            query,
            token_budget,
            include_code_context: false,
        }
    }

    pub fn with_code_context(mut self) -> Self {
        self.include_code_context = true;
        self
    }

    pub fn validate(&self) -> std::result::Result<(), ValidationError> {
        self.query.validate()?;
        if self.token_budget == 0 {
            return Err(ValidationError::ZeroTokenBudget);
        }
        Ok(())
    }
}

/// Entries returned by a retrieval, in rank order
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RetrievalResult {
    pub entries: Vec<MemoryEntry>,
    /// Set when at least one matching entry was left out to fit the budget
    pub truncated: bool,
}

impl RetrievalResult {
    pub fn total_tokens(&self) -> usize {
        self.entries.iter().map(MemoryEntry::estimated_tokens).sum()
    }
}

/// Read pipeline over a shared backend
pub struct RetrievalPipeline {
    backend: Arc<dyn MemoryBackend>,
    max_code_links_per_entry: usize,
}

impl RetrievalPipeline {
    pub fn new(backend: Arc<dyn MemoryBackend>, max_code_links_per_entry: usize) -> Self {
        Self {
            backend,
            max_code_links_per_entry,
        }
    }

    pub async fn retrieve(&self, request: RetrievalRequest) -> Result<RetrievalResult> {
        request.validate()?;

        let backend = &self.backend;
        let query = &request.query;
        let mut candidates = with_retry("read", || backend.read(query)).await?;
        candidates.sort_by(rank_order);

        let (mut entries, truncated) = pack_budget(candidates, request.token_budget);
        debug!(
            "Retrieved {} entries from {} (truncated: {})",
            entries.len(),
            backend.name(),
            truncated
        );

        if request.include_code_context && !entries.is_empty() {
            self.enrich(&mut entries).await;
        }

        if !entries.is_empty() {
            let ids: Vec<EntryId> = entries.iter().map(|e| e.id).collect();
            // Stores keep microseconds
            let now = Utc::now().trunc_subsecs(6);
            match with_retry("touch", || backend.touch(&ids, now)).await {
                Ok(()) => entries.iter_mut().for_each(|e| e.mark_accessed(now)),
                Err(e) => warn!("Failed to record access for {} entries: {}", ids.len(), e),
            }
        }

        Ok(RetrievalResult { entries, truncated })
    }

    /// Attach code context in one batched call. Never fails the retrieval.
    async fn enrich(&self, entries: &mut [MemoryEntry]) {
        if !self.backend.capabilities().graph_traversal {
            debug!(
                "Backend {} has no graph support, skipping code context",
                self.backend.name()
            );
            return;
        }

        let ids: Vec<EntryId> = entries.iter().map(|e| e.id).collect();
        let mut links = match self.backend.code_context(&ids).await {
            Ok(links) => links,
            Err(e) => {
                warn!("Code context enrichment failed, returning entries without it: {}", e);
                return;
            }
        };

        for entry in entries.iter_mut() {
            if let Some(entry_links) = links.remove(&entry.id).filter(|l| !l.is_empty()) {
                entry.metadata.insert(
                    CODE_CONTEXT_KEY.to_string(),
                    format_code_context(&entry_links, self.max_code_links_per_entry),
                );
            }
        }
    }
}

/// Take entries in order while the running token sum stays within `budget`.
/// Stops at the first entry that does not fit.
fn pack_budget(candidates: Vec<MemoryEntry>, budget: usize) -> (Vec<MemoryEntry>, bool) {
    let total = candidates.len();
    let mut used = 0usize;
    let mut entries = Vec::with_capacity(total);

    for entry in candidates {
        let tokens = entry.estimated_tokens();
        if used + tokens > budget {
            break;
        }
        used += tokens;
        entries.push(entry);
    }

    let truncated = entries.len() < total;
    (entries, truncated)
}

/// Render links as one line each, strongest first.
fn format_code_context(links: &[CodeLink], max_links: usize) -> String {
    let mut sorted: Vec<&CodeLink> = links.iter().collect();
    sorted.sort_by(|a, b| b.relevance_score.total_cmp(&a.relevance_score));

    let mut lines: Vec<String> = sorted
        .iter()
        .take(max_links)
        .map(|link| {
            let mut line = format!(
                "{} {} [{:.2}]",
                link.relation,
                link.node.label(),
                link.relevance_score
            );
            if let Some(summary) = &link.node.summary {
                line.push_str(": ");
                line.push_str(summary);
            }
            if let Some(context) = &link.context {
                line.push_str(&format!(" ({context})"));
            }
            line
        })
        .collect();

    if links.len() > max_links {
        lines.push(format!("+{} more", links.len() - max_links));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::types::MemoryType;
    use crate::storage::{CodeNode, GraphBackend, NodeRef, RelationType, Relationship};
    use crate::testing::entry_with_tokens;
    use tempfile::TempDir;

    async fn graph(dir: &TempDir) -> Arc<GraphBackend> {
        Arc::new(
            GraphBackend::open(&dir.path().join("graph.db"), 2)
                .await
                .unwrap(),
        )
    }

    #[test]
    fn test_pack_budget_boundary() {
        let entries: Vec<_> = (0..3).map(|_| entry_with_tokens("s-1", 10)).collect();
        let exact: usize = entries.iter().map(MemoryEntry::estimated_tokens).sum();

        let (packed, truncated) = pack_budget(entries.clone(), exact);
        assert_eq!(packed.len(), 3);
        assert!(!truncated);

        let (packed, truncated) = pack_budget(entries, exact - 1);
        assert_eq!(packed.len(), 2);
        assert!(truncated);
    }

    #[test]
    fn test_pack_budget_stops_at_first_misfit() {
        let big = entry_with_tokens("s-1", 50);
        let small = entry_with_tokens("s-1", 5);
        let (packed, truncated) = pack_budget(vec![big, small], 20);
        assert!(packed.is_empty());
        assert!(truncated);
    }

    #[test]
    fn test_format_code_context_caps_links() {
        let entry_id = uuid::Uuid::new_v4();
        let links: Vec<CodeLink> = (0..4)
            .map(|i| CodeLink {
                entry_id,
                relation: RelationType::ReferencesFunction,
                node: CodeNode::function(format!("src/f{i}.rs"), format!("f{i}")),
                relevance_score: i as f32 / 10.0,
                context: None,
            })
            .collect();

        let block = format_code_context(&links, 2);
        let lines: Vec<_> = block.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("f3"));
        assert!(lines[1].contains("f2"));
        assert_eq!(lines[2], "+2 more");
    }

    #[tokio::test]
    async fn test_retrieve_enriches_and_touches() {
        let dir = TempDir::new().unwrap();
        let backend = graph(&dir).await;

        let entry = MemoryEntry::new(
            MemoryType::Semantic,
            "Session store",
            "Sessions are kept in Redis",
            "s-1",
            "agent-1",
        );
        backend.write(&entry).await.unwrap();
        let file = backend
            .upsert_code_node(&CodeNode::file("src/session.rs").with_summary("session cache"))
            .await
            .unwrap();
        backend
            .link(
                &Relationship::new(
                    NodeRef::Memory(entry.id),
                    RelationType::ReferencesFile,
                    NodeRef::Code(file),
                )
                .with_relevance(0.9),
            )
            .await
            .unwrap();

        let pipeline = RetrievalPipeline::new(backend.clone(), 5);
        let request = RetrievalRequest::new(MemoryQuery::new().with_session("s-1"), 1000)
            .with_code_context();
        let result = pipeline.retrieve(request).await.unwrap();

        assert_eq!(result.entries.len(), 1);
        let returned = &result.entries[0];
        let block = &returned.metadata[CODE_CONTEXT_KEY];
        assert!(block.contains("src/session.rs"));
        assert!(block.contains("session cache"));
        assert!(returned.accessed_at > entry.accessed_at);

        let stored = backend.get(entry.id).await.unwrap().unwrap();
        assert_eq!(stored.accessed_at, returned.accessed_at);
        assert!(!stored.metadata.contains_key(CODE_CONTEXT_KEY));
    }

    #[tokio::test]
    async fn test_zero_budget_rejected() {
        let dir = TempDir::new().unwrap();
        let pipeline = RetrievalPipeline::new(graph(&dir).await, 5);
        let err = pipeline
            .retrieve(RetrievalRequest::new(MemoryQuery::new(), 0))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("token budget"));
    }
}
