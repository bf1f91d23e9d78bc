//! Memory coordinator
//!
//! Owns the storage backend selected at startup and the two pipelines built
//! around it. This is the entry point callers use.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info};

use crate::config::{Config, RetrievalConfig};
use crate::error::{MemoryError, Result, ValidationError};
use crate::memory::ingestion::{StoragePipeline, StorageRequest, StorageResult};
use crate::memory::query::MemoryQuery;
use crate::memory::retrieval::{RetrievalPipeline, RetrievalRequest, RetrievalResult};
use crate::review::{ReviewPanel, Reviewer};
use crate::storage::{BackendCapabilities, DeleteTarget, MemoryBackend, open_backend, with_retry};

/// Coordinates storage and retrieval over one backend.
///
/// `store` and `retrieve` take `&self` and may run concurrently; share the
/// coordinator behind an `Arc`.
pub struct MemoryCoordinator {
    backend: Arc<dyn MemoryBackend>,
    storage: StoragePipeline,
    retrieval: RetrievalPipeline,
    defaults: RetrievalConfig,
}

impl MemoryCoordinator {
    /// Open the configured backend under `storage.data_dir` and build the
    /// pipelines. Creates or upgrades the schema.
    pub async fn open(config: &Config, reviewers: Vec<Arc<dyn Reviewer>>) -> Result<Self> {
        config.validate()?;
        let backend = open_backend(&config.storage).await?;
        info!(
            "Opened {} backend at {}",
            backend.name(),
            config.storage.data_dir.display()
        );
        Self::new(backend, config, reviewers)
    }

    /// Build a coordinator over an already-open backend.
    ///
    /// `reviewers` may be empty only when the quality gate is disabled.
    pub fn new(
        backend: Arc<dyn MemoryBackend>,
        config: &Config,
        reviewers: Vec<Arc<dyn Reviewer>>,
    ) -> Result<Self> {
        let panel = if config.quality_gate.enabled {
            let panel = ReviewPanel::new(reviewers, config.quality_gate.consensus())
                .map_err(|e| MemoryError::Config(e.to_string()))?;
            debug!("Quality gate enabled with {:?}", panel);
            Some(panel)
        } else {
            None
        };

        Ok(Self {
            storage: StoragePipeline::new(Arc::clone(&backend), panel),
            retrieval: RetrievalPipeline::new(
                Arc::clone(&backend),
                config.retrieval.max_code_links_per_entry,
            ),
            defaults: config.retrieval.clone(),
            backend,
        })
    }

    /// Validate, gate, and persist one entry.
    pub async fn store(&self, request: StorageRequest) -> Result<StorageResult> {
        self.storage.store(request).await
    }

    /// Filtered, ranked, budget-bounded read.
    pub async fn retrieve(&self, request: RetrievalRequest) -> Result<RetrievalResult> {
        self.retrieval.retrieve(request).await
    }

    /// `store` bounded by a caller deadline.
    ///
    /// On expiry the caller gets `Timeout` and the store future is dropped.
    /// Reviewer tasks already spawned run to their own timeout. A backend
    /// write already handed to a blocking thread still completes, so the entry
    /// may land even though the caller saw `Timeout`.
    pub async fn store_with_deadline(
        &self,
        request: StorageRequest,
        deadline: Duration,
    ) -> Result<StorageResult> {
        tokio::time::timeout(deadline, self.store(request))
            .await
            .map_err(|_| MemoryError::Timeout(deadline))?
    }

    /// `retrieve` bounded by a caller deadline.
    pub async fn retrieve_with_deadline(
        &self,
        request: RetrievalRequest,
        deadline: Duration,
    ) -> Result<RetrievalResult> {
        tokio::time::timeout(deadline, self.retrieve(request))
            .await
            .map_err(|_| MemoryError::Timeout(deadline))?
    }

    /// A request for `query` using the configured default token budget.
    pub fn request(&self, query: MemoryQuery) -> RetrievalRequest {
        RetrievalRequest::new(query, self.defaults.default_token_budget)
    }

    /// A query with the configured default limit.
    pub fn query(&self) -> MemoryQuery {
        MemoryQuery::new().with_limit(self.defaults.default_limit)
    }

    /// Delete every Working entry of `session_id`. Idempotent.
    pub async fn clear_working_memory(&self, session_id: &str) -> Result<usize> {
        if session_id.trim().is_empty() {
            return Err(ValidationError::EmptyField("session_id").into());
        }
        let target = DeleteTarget::WorkingMemory(session_id.to_string());
        let backend = &self.backend;
        let removed = with_retry("clear_working_memory", || backend.delete(&target)).await?;
        debug!("Cleared {} working entries for session {}", removed, session_id);
        Ok(removed)
    }

    /// Remove Working entries whose expiry has passed.
    pub async fn purge_expired(&self) -> Result<usize> {
        let target = DeleteTarget::ExpiredBefore(Utc::now());
        let backend = &self.backend;
        let removed = with_retry("purge_expired", || backend.delete(&target)).await?;
        if removed > 0 {
            info!("Purged {} expired working entries", removed);
        }
        Ok(removed)
    }

    /// Shared handle to the backend for out-of-band work such as importers.
    pub fn backend(&self) -> Arc<dyn MemoryBackend> {
        Arc::clone(&self.backend)
    }

    pub fn capabilities(&self) -> BackendCapabilities {
        self.backend.capabilities()
    }
}
