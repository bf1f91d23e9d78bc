//! Storage backends
//!
//! `MemoryBackend` is the seam every store implements. Optional features
//! are advertised through `BackendCapabilities` and must be checked by the
//! caller before use; the default trait methods return `Unsupported`.

pub mod filter;
pub mod graph;
pub mod lance;

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tracing::{info, warn};

use crate::config::{BackendKind, StorageConfig};
use crate::error::BackendError;
use crate::memory::query::MemoryQuery;
use crate::memory::types::{EntryId, MemoryEntry};

pub use filter::LanceFilter;
pub use graph::{
    CodeLink, CodeNode, CodeNodeKind, GraphBackend, NodeRef, RelationType, Relationship,
};
pub use lance::RelationalBackend;

/// Schema version written by this build. Older stores are upgraded in place.
pub const SCHEMA_VERSION: u32 = 1;

/// Delay before the single internal retry of a transient failure
const RETRY_DELAY: Duration = Duration::from_millis(25);

/// Optional features a backend supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BackendCapabilities {
    /// Relationship storage and bounded traversal (code-context enrichment)
    pub graph_traversal: bool,
    /// Content search evaluated natively inside the store
    pub full_text_search: bool,
}

/// What to remove in a `delete` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteTarget {
    /// One entry by id
    Entry(EntryId),
    /// Every entry of a session
    Session(String),
    /// Only the Working entries of a session
    WorkingMemory(String),
    /// Working entries whose expiry is at or before the given instant
    ExpiredBefore(DateTime<Utc>),
}

/// Storage capability set shared by all backends.
#[async_trait]
pub trait MemoryBackend: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &'static str;

    fn capabilities(&self) -> BackendCapabilities;

    /// Persist an entry. Writing an id that already exists is a no-op, so a
    /// retried write never duplicates.
    async fn write(&self, entry: &MemoryEntry) -> Result<EntryId, BackendError>;

    /// Entries matching `query`, in rank order, at most `query.limit`.
    /// Expired Working entries are never returned.
    async fn read(&self, query: &MemoryQuery) -> Result<Vec<MemoryEntry>, BackendError>;

    /// Remove entries; returns how many were deleted.
    async fn delete(&self, target: &DeleteTarget) -> Result<usize, BackendError>;

    /// Set `accessed_at` on the given entries.
    async fn touch(&self, ids: &[EntryId], at: DateTime<Utc>) -> Result<(), BackendError>;

    async fn get(&self, id: EntryId) -> Result<Option<MemoryEntry>, BackendError>;

    /// Total number of stored entries, expired or not
    async fn count(&self) -> Result<usize, BackendError>;

    /// Schema version recorded in the store
    async fn schema_version(&self) -> Result<u32, BackendError>;

    /// Code nodes one hop away from each entry, batched into one query.
    async fn code_context(
        &self,
        _ids: &[EntryId],
    ) -> Result<HashMap<EntryId, Vec<CodeLink>>, BackendError> {
        Err(unsupported(self.name(), "code_context"))
    }

    /// Entries directly linked to the file at `path`.
    async fn entries_linked_to_file(&self, _path: &str) -> Result<Vec<MemoryEntry>, BackendError> {
        Err(unsupported(self.name(), "entries_linked_to_file"))
    }

    /// Entries directly linked to a function named `name`.
    async fn entries_linked_to_function(
        &self,
        _name: &str,
    ) -> Result<Vec<MemoryEntry>, BackendError> {
        Err(unsupported(self.name(), "entries_linked_to_function"))
    }
}

/// Decode a stored microsecond timestamp.
pub(crate) fn micros_to_datetime(micros: i64, column: &str) -> Result<DateTime<Utc>, BackendError> {
    Utc.timestamp_micros(micros)
        .single()
        .ok_or_else(|| BackendError::Corrupt(format!("Invalid {column} timestamp: {micros}")))
}

fn unsupported(backend: &'static str, operation: &'static str) -> BackendError {
    BackendError::Unsupported { backend, operation }
}

/// Run a backend call, retrying once if it fails transiently.
pub(crate) async fn with_retry<T, F, Fut>(operation: &str, mut call: F) -> Result<T, BackendError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, BackendError>>,
{
    match call().await {
        Err(e) if e.is_transient() => {
            warn!("Transient backend failure during {}: {}, retrying once", operation, e);
            tokio::time::sleep(RETRY_DELAY).await;
            call().await
        }
        other => other,
    }
}

/// Open the backend selected by configuration, creating or upgrading its
/// schema before returning.
pub async fn open_backend(config: &StorageConfig) -> Result<Arc<dyn MemoryBackend>, BackendError> {
    std::fs::create_dir_all(&config.data_dir).map_err(|e| {
        BackendError::Storage(format!(
            "Failed to create data directory {}: {e}",
            config.data_dir.display()
        ))
    })?;

    let backend: Arc<dyn MemoryBackend> = match config.backend {
        BackendKind::Relational => {
            let path = config.data_dir.join("lance");
            info!("Opening relational backend at {}", path.display());
            Arc::new(RelationalBackend::open(&path).await?)
        }
        BackendKind::Graph => {
            let path = config.data_dir.join("graph.db");
            info!("Opening graph backend at {}", path.display());
            Arc::new(GraphBackend::open(&path, config.graph_readers).await?)
        }
    };

    Ok(backend)
}
