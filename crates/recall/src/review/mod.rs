//! Quality gate reviewers
//!
//! Reviewers score proposed entries; a panel of them reaches consensus on
//! whether an entry is worth keeping.

pub mod consensus;
pub mod heuristic;
pub mod prompts;
pub mod provider;
pub mod remote;
pub mod types;

pub use consensus::{ConsensusConfig, ReviewPanel, ReviewerOutcome, Verdict};
pub use heuristic::HeuristicReviewer;
pub use provider::Reviewer;
pub use remote::RemoteReviewer;
pub use types::{ReviewCandidate, ReviewError, ReviewLens, ReviewScore};
