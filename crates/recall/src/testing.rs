//! Test utilities for recall - reviewer doubles, backend wrappers, fixtures
//!
//! Used by the unit tests in this crate and by the integration suites under
//! `tests/`.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::BackendError;
use crate::memory::ingestion::StorageRequest;
use crate::memory::query::MemoryQuery;
use crate::memory::types::{CHARS_PER_TOKEN, EntryId, MemoryEntry, MemoryType};
use crate::review::{ReviewCandidate, ReviewError, ReviewScore, Reviewer};
use crate::storage::{BackendCapabilities, CodeLink, DeleteTarget, MemoryBackend};

/// Reviewer that always returns the same score, unclamped, so tests can
/// also feed the panel out-of-range values.
#[derive(Debug, Clone)]
pub struct FixedReviewer {
    score: f32,
    calls: Arc<AtomicUsize>,
}

impl FixedReviewer {
    pub fn new(score: f32) -> Self {
        Self {
            score,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of candidates scored so far, shared across clones
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Reviewer for FixedReviewer {
    async fn score(&self, _candidate: &ReviewCandidate) -> Result<ReviewScore, ReviewError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ReviewScore {
            score: self.score,
            rationale: None,
        })
    }

    fn name(&self) -> &str {
        "fixed"
    }
}

/// Reviewer that always errors.
#[derive(Debug, Clone, Default)]
pub struct FailingReviewer;

impl FailingReviewer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Reviewer for FailingReviewer {
    async fn score(&self, _candidate: &ReviewCandidate) -> Result<ReviewScore, ReviewError> {
        Err(ReviewError::Api("reviewer unavailable".to_string()))
    }

    fn name(&self) -> &str {
        "failing"
    }
}

/// Reviewer that answers only after a delay.
#[derive(Debug, Clone)]
pub struct SlowReviewer {
    score: f32,
    delay: Duration,
}

impl SlowReviewer {
    pub fn new(score: f32, delay: Duration) -> Self {
        Self { score, delay }
    }
}

#[async_trait]
impl Reviewer for SlowReviewer {
    async fn score(&self, _candidate: &ReviewCandidate) -> Result<ReviewScore, ReviewError> {
        tokio::time::sleep(self.delay).await;
        Ok(ReviewScore::new(self.score))
    }

    fn name(&self) -> &str {
        "slow"
    }
}

/// Reviewer that panics inside `score`.
#[derive(Debug, Clone, Default)]
pub struct PanickingReviewer;

impl PanickingReviewer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Reviewer for PanickingReviewer {
    async fn score(&self, _candidate: &ReviewCandidate) -> Result<ReviewScore, ReviewError> {
        panic!("reviewer panicked on purpose");
    }

    fn name(&self) -> &str {
        "panicking"
    }
}

/// Backend wrapper whose next `failures` write/read/delete calls fail with a
/// transient error before delegating.
pub struct FlakyBackend {
    inner: Arc<dyn MemoryBackend>,
    remaining: AtomicUsize,
}

impl FlakyBackend {
    pub fn new(inner: Arc<dyn MemoryBackend>, failures: usize) -> Self {
        Self {
            inner,
            remaining: AtomicUsize::new(failures),
        }
    }

    fn trip(&self) -> Result<(), BackendError> {
        let tripped = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if tripped {
            Err(BackendError::Unavailable("database is locked".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl MemoryBackend for FlakyBackend {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn capabilities(&self) -> BackendCapabilities {
        self.inner.capabilities()
    }

    async fn write(&self, entry: &MemoryEntry) -> Result<EntryId, BackendError> {
        self.trip()?;
        self.inner.write(entry).await
    }

    async fn read(&self, query: &MemoryQuery) -> Result<Vec<MemoryEntry>, BackendError> {
        self.trip()?;
        self.inner.read(query).await
    }

    async fn delete(&self, target: &DeleteTarget) -> Result<usize, BackendError> {
        self.trip()?;
        self.inner.delete(target).await
    }

    async fn touch(&self, ids: &[EntryId], at: DateTime<Utc>) -> Result<(), BackendError> {
        self.inner.touch(ids, at).await
    }

    async fn get(&self, id: EntryId) -> Result<Option<MemoryEntry>, BackendError> {
        self.inner.get(id).await
    }

    async fn count(&self) -> Result<usize, BackendError> {
        self.inner.count().await
    }

    async fn schema_version(&self) -> Result<u32, BackendError> {
        self.inner.schema_version().await
    }

    async fn code_context(
        &self,
        ids: &[EntryId],
    ) -> Result<HashMap<EntryId, Vec<CodeLink>>, BackendError> {
        self.inner.code_context(ids).await
    }
}

/// A Semantic entry whose token estimate is exactly `tokens` (at least 1).
pub fn entry_with_tokens(session_id: &str, tokens: usize) -> MemoryEntry {
    let content = "a".repeat(tokens.saturating_sub(1) * CHARS_PER_TOKEN);
    MemoryEntry::new(MemoryType::Semantic, "x", content, session_id, "agent-test")
}

/// The canonical "worth remembering" decision.
pub fn redis_decision(session_id: &str) -> StorageRequest {
    StorageRequest::new(
        MemoryType::Episodic,
        "Chose Redis for session storage",
        "Redis gives native TTL expiry; Memcached lacks persistence. \
         Decided against Postgres because of write volume.",
        session_id,
        "agent-test",
    )
}

/// Small talk the heuristic reviewers should decline.
pub fn small_talk(session_id: &str) -> StorageRequest {
    StorageRequest::new(MemoryType::Episodic, "ack", "ok thanks", session_id, "agent-test")
}

/// A Working entry expiring `ttl` from now.
pub fn scratch(session_id: &str, content: &str, ttl: chrono::Duration) -> StorageRequest {
    StorageRequest::new(MemoryType::Working, "scratch", content, session_id, "agent-test")
        .with_expiry(Utc::now() + ttl)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_with_tokens_is_exact() {
        for tokens in [1, 2, 10, 37] {
            assert_eq!(entry_with_tokens("s", tokens).estimated_tokens(), tokens);
        }
    }

    #[tokio::test]
    async fn fixed_reviewer_counts_calls() {
        let reviewer = FixedReviewer::new(7.0);
        let clone = reviewer.clone();
        let entry = entry_with_tokens("s", 3);
        clone
            .score(&ReviewCandidate::from_entry(&entry))
            .await
            .unwrap();
        assert_eq!(reviewer.calls(), 1);
    }
}
