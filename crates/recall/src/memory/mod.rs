//! Memory types and pipelines
//!
//! Defines the memory model and the two pipelines that move entries
//! in and out of a storage backend.

pub mod ingestion;
pub mod query;
pub mod retrieval;
pub mod types;

pub use ingestion::{StoragePipeline, StorageRequest, StorageResult};
pub use query::{MemoryQuery, TimeRange, rank_order};
pub use retrieval::{RetrievalPipeline, RetrievalRequest, RetrievalResult};
pub use types::{
    CHARS_PER_TOKEN, CODE_CONTEXT_KEY, EntryId, MemoryEntry, MemoryType, estimate_tokens,
};
