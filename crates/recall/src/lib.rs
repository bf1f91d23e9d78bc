//! Recall - memory coordination engine for coding agents
//!
//! Stores typed memories behind a reviewer quality gate and retrieves them
//! ranked and packed into a token budget. Runs on a LanceDB table store or a
//! SQLite graph store that can also attach linked code context.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod memory;
pub mod review;
pub mod storage;
pub mod testing;

pub use config::Config;
pub use coordinator::MemoryCoordinator;
pub use error::{BackendError, MemoryError, Result, ValidationError};
pub use memory::{
    MemoryEntry, MemoryQuery, MemoryType, RetrievalRequest, RetrievalResult, StorageRequest,
    StorageResult, TimeRange,
};
pub use review::{Reviewer, ReviewCandidate, ReviewScore};
pub use storage::{BackendCapabilities, MemoryBackend};
