//! Reviewer trait for the quality gate
//!
//! A reviewer scores one proposed entry. Implementations may be local rules
//! or a remote model; the gate treats them all the same way.

use async_trait::async_trait;

use crate::review::types::{ReviewCandidate, ReviewError, ReviewScore};

/// Trait for quality-gate reviewers (heuristic, remote API, test doubles)
#[async_trait]
pub trait Reviewer: Send + Sync {
    /// Score a candidate from 0.0 (discard) to 10.0 (essential).
    async fn score(&self, candidate: &ReviewCandidate) -> Result<ReviewScore, ReviewError>;

    /// Reviewer name for logging
    fn name(&self) -> &str;
}
