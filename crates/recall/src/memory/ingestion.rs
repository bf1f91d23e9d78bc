//! Memory Storage Pipeline
//!
//! Orchestrates the write path: validation, quality gating through reviewer
//! consensus, and the backend write.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::Result;
use crate::memory::types::{EntryId, MemoryEntry, MemoryType};
use crate::review::{ReviewCandidate, ReviewPanel};
use crate::storage::{MemoryBackend, with_retry};

/// A caller's request to store one memory.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageRequest {
    pub memory_type: MemoryType,
    pub title: String,
    pub content: String,
    pub session_id: String,
    pub agent_id: String,
    pub metadata: BTreeMap<String, String>,
    /// Only valid for Working memory
    pub expires_at: Option<DateTime<Utc>>,
}

impl StorageRequest {
    pub fn new(
        memory_type: MemoryType,
        title: impl Into<String>,
        content: impl Into<String>,
        session_id: impl Into<String>,
        agent_id: impl Into<String>,
    ) -> Self {
        Self {
            memory_type,
            title: title.into(),
            content: content.into(),
            session_id: session_id.into(),
            agent_id: agent_id.into(),
            metadata: BTreeMap::new(),
            expires_at: None,
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_metadata_map(mut self, metadata: BTreeMap<String, String>) -> Self {
        self.metadata.extend(metadata);
        self
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    fn into_entry(self) -> MemoryEntry {
        let entry = MemoryEntry::new(
            self.memory_type,
            self.title,
            self.content,
            self.session_id,
            self.agent_id,
        )
        .with_metadata(self.metadata);
        match self.expires_at {
            Some(expires_at) => entry.with_expiry(expires_at),
            None => entry,
        }
    }
}

/// Outcome of a store call. Declining an entry is not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum StorageResult {
    Stored {
        entry_id: EntryId,
        /// `None` for Working entries and when gating is disabled
        importance: Option<u8>,
    },
    NotStored {
        score: f32,
        threshold: f32,
        reason: String,
    },
}

impl StorageResult {
    pub fn is_stored(&self) -> bool {
        matches!(self, StorageResult::Stored { .. })
    }

    pub fn entry_id(&self) -> Option<EntryId> {
        match self {
            StorageResult::Stored { entry_id, .. } => Some(*entry_id),
            StorageResult::NotStored { .. } => None,
        }
    }
}

/// Pipeline for storing entries into a backend.
///
/// The pipeline runs:
/// 1. Entry construction and validation
/// 2. Reviewer consensus (skipped for Working memory or when gating is off)
/// 3. Importance assignment from the consensus mean
/// 4. Backend write, retried once on a transient failure
pub struct StoragePipeline {
    backend: Arc<dyn MemoryBackend>,
    /// `None` when the quality gate is disabled
    panel: Option<ReviewPanel>,
}

impl StoragePipeline {
    pub fn new(backend: Arc<dyn MemoryBackend>, panel: Option<ReviewPanel>) -> Self {
        Self { backend, panel }
    }

    pub fn gating_enabled(&self) -> bool {
        self.panel.is_some()
    }

    pub async fn store(&self, request: StorageRequest) -> Result<StorageResult> {
        let mut entry = request.into_entry();
        entry.validate()?;

        if let Some(panel) = self.panel.as_ref().filter(|_| entry.memory_type().is_gated()) {
            let verdict = panel.review(&ReviewCandidate::from_entry(&entry)).await;
            if !verdict.passed() {
                let reason = verdict.reason();
                debug!("Declined '{}': {}", entry.title, reason);
                return Ok(StorageResult::NotStored {
                    score: verdict.mean,
                    threshold: verdict.threshold,
                    reason,
                });
            }
            entry.importance = Some(verdict.importance());
        }

        let backend = &self.backend;
        let entry_id = with_retry("write", || backend.write(&entry)).await?;
        debug!(
            "Stored {} entry {} (importance {:?}) on {}",
            entry.memory_type(),
            entry_id,
            entry.importance,
            backend.name()
        );

        Ok(StorageResult::Stored {
            entry_id,
            importance: entry.importance,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{BackendError, MemoryError, ValidationError};
    use crate::memory::types::CODE_CONTEXT_KEY;
    use crate::review::{ConsensusConfig, Reviewer};
    use crate::storage::GraphBackend;
    use crate::testing::{FixedReviewer, FlakyBackend};
    use chrono::Duration;
    use tempfile::TempDir;

    async fn graph_backend(dir: &TempDir) -> Arc<dyn MemoryBackend> {
        Arc::new(
            GraphBackend::open(&dir.path().join("graph.db"), 1)
                .await
                .unwrap(),
        )
    }

    fn panel(score: f32) -> ReviewPanel {
        let reviewers: Vec<Arc<dyn Reviewer>> = vec![Arc::new(FixedReviewer::new(score))];
        ReviewPanel::new(reviewers, ConsensusConfig::default()).unwrap()
    }

    fn decision() -> StorageRequest {
        StorageRequest::new(
            MemoryType::Episodic,
            "Chose Redis for session storage",
            "Redis gives TTLs natively",
            "s-1",
            "agent-1",
        )
    }

    #[tokio::test]
    async fn test_store_assigns_importance() {
        let dir = TempDir::new().unwrap();
        let backend = graph_backend(&dir).await;
        let pipeline = StoragePipeline::new(Arc::clone(&backend), Some(panel(7.4)));

        let result = pipeline.store(decision()).await.unwrap();
        let StorageResult::Stored { entry_id, importance } = result else {
            panic!("expected Stored, got {result:?}");
        };
        assert_eq!(importance, Some(7));

        let stored = backend.get(entry_id).await.unwrap().unwrap();
        assert_eq!(stored.importance, Some(7));
        assert_eq!(stored.title, "Chose Redis for session storage");
    }

    #[tokio::test]
    async fn test_low_score_not_stored() {
        let dir = TempDir::new().unwrap();
        let backend = graph_backend(&dir).await;
        let pipeline = StoragePipeline::new(Arc::clone(&backend), Some(panel(3.0)));

        let result = pipeline.store(decision()).await.unwrap();
        match result {
            StorageResult::NotStored { score, threshold, reason } => {
                assert_eq!(score, 3.0);
                assert_eq!(threshold, 6.0);
                assert!(!reason.is_empty());
            }
            other => panic!("expected NotStored, got {other:?}"),
        }
        assert_eq!(backend.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_working_memory_bypasses_gate() {
        let dir = TempDir::new().unwrap();
        let backend = graph_backend(&dir).await;
        let pipeline = StoragePipeline::new(backend, Some(panel(0.0)));

        let request = StorageRequest::new(
            MemoryType::Working,
            "scratch",
            "current file: src/lib.rs",
            "s-1",
            "agent-1",
        )
        .with_expiry(Utc::now() + Duration::hours(1));

        let result = pipeline.store(request).await.unwrap();
        assert_eq!(
            result,
            StorageResult::Stored {
                entry_id: result.entry_id().unwrap(),
                importance: None,
            }
        );
    }

    #[tokio::test]
    async fn test_gating_disabled_commits_without_importance() {
        let dir = TempDir::new().unwrap();
        let pipeline = StoragePipeline::new(graph_backend(&dir).await, None);
        assert!(!pipeline.gating_enabled());

        match pipeline.store(decision()).await.unwrap() {
            StorageResult::Stored { importance, .. } => assert_eq!(importance, None),
            other => panic!("expected Stored, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_validation_fails_before_backend() {
        let dir = TempDir::new().unwrap();
        let backend = graph_backend(&dir).await;
        let pipeline = StoragePipeline::new(Arc::clone(&backend), Some(panel(9.0)));

        let empty_title = StorageRequest::new(MemoryType::Semantic, "  ", "body", "s-1", "a-1");
        assert!(matches!(
            pipeline.store(empty_title).await,
            Err(MemoryError::Validation(ValidationError::EmptyTitle))
        ));

        let reserved = decision().with_metadata(CODE_CONTEXT_KEY, "x");
        assert!(matches!(
            pipeline.store(reserved).await,
            Err(MemoryError::Validation(ValidationError::ReservedMetadataKey(_)))
        ));

        let expiring = decision().with_expiry(Utc::now() + Duration::hours(1));
        assert!(matches!(
            pipeline.store(expiring).await,
            Err(MemoryError::Validation(ValidationError::ExpiryNotAllowed(_)))
        ));

        assert_eq!(backend.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_transient_write_failure_retried_once() {
        let dir = TempDir::new().unwrap();
        let inner = graph_backend(&dir).await;

        let flaky = Arc::new(FlakyBackend::new(Arc::clone(&inner), 1));
        let pipeline = StoragePipeline::new(flaky.clone(), None);
        assert!(pipeline.store(decision()).await.unwrap().is_stored());
        assert_eq!(inner.count().await.unwrap(), 1);

        let flaky = Arc::new(FlakyBackend::new(Arc::clone(&inner), 2));
        let pipeline = StoragePipeline::new(flaky, None);
        assert!(matches!(
            pipeline.store(decision()).await,
            Err(MemoryError::Backend(BackendError::Unavailable(_)))
        ));
        assert_eq!(inner.count().await.unwrap(), 1);
    }
}
