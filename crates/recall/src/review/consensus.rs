//! Multi-reviewer consensus
//!
//! Every reviewer scores a candidate in its own task under a per-reviewer
//! timeout. A reviewer that errors, panics, or times out contributes the
//! neutral score instead. The verdict is the mean.

use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::memory::types::MAX_IMPORTANCE;
use crate::review::provider::Reviewer;
use crate::review::types::{ReviewCandidate, ReviewError};

/// Tuning for the consensus step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConsensusConfig {
    /// Minimum mean score required to commit
    pub threshold: f32,
    /// Budget for each reviewer, enforced inside its task
    pub reviewer_timeout: Duration,
    /// Score contributed by a reviewer that failed to answer
    pub neutral_score: f32,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            threshold: 6.0,
            reviewer_timeout: Duration::from_millis(150),
            neutral_score: 5.0,
        }
    }
}

/// How one reviewer's contribution was obtained
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewerOutcome {
    pub reviewer: String,
    pub score: f32,
    /// Set when the reviewer failed and the neutral score was substituted
    pub failure: Option<String>,
}

impl ReviewerOutcome {
    pub fn is_fallback(&self) -> bool {
        self.failure.is_some()
    }
}

/// Result of running the panel over one candidate
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub mean: f32,
    pub threshold: f32,
    pub outcomes: Vec<ReviewerOutcome>,
}

impl Verdict {
    pub fn passed(&self) -> bool {
        self.mean >= self.threshold
    }

    /// Importance assigned to a committed entry
    pub fn importance(&self) -> u8 {
        self.mean.round().clamp(0.0, f32::from(MAX_IMPORTANCE)) as u8
    }

    /// Human-readable summary, e.g. for a `NotStored` result
    pub fn reason(&self) -> String {
        let mut reason = format!(
            "mean review score {:.2} {} threshold {:.2}",
            self.mean,
            if self.passed() { "meets" } else { "is below" },
            self.threshold
        );
        let parts: Vec<String> = self
            .outcomes
            .iter()
            .map(|o| {
                let mut part = format!("{}={:.1}", o.reviewer, o.score);
                if let Some(failure) = &o.failure {
                    let _ = write!(part, " (neutral: {failure})");
                }
                part
            })
            .collect();
        if !parts.is_empty() {
            let _ = write!(reason, " [{}]", parts.join(", "));
        }
        reason
    }
}

/// A fixed set of reviewers that vote on every gated candidate
#[derive(Clone)]
pub struct ReviewPanel {
    reviewers: Vec<Arc<dyn Reviewer>>,
    config: ConsensusConfig,
}

impl std::fmt::Debug for ReviewPanel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReviewPanel")
            .field(
                "reviewers",
                &self.reviewers.iter().map(|r| r.name()).collect::<Vec<_>>(),
            )
            .field("config", &self.config)
            .finish()
    }
}

impl ReviewPanel {
    /// Build a panel. At least one reviewer is required.
    pub fn new(
        reviewers: Vec<Arc<dyn Reviewer>>,
        config: ConsensusConfig,
    ) -> Result<Self, ReviewError> {
        if reviewers.is_empty() {
            return Err(ReviewError::Config(
                "quality gate needs at least one reviewer".to_string(),
            ));
        }
        Ok(Self { reviewers, config })
    }

    pub fn config(&self) -> &ConsensusConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.reviewers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reviewers.is_empty()
    }

    /// Score `candidate` with every reviewer concurrently.
    ///
    /// Each reviewer runs in a spawned task bounded by `reviewer_timeout`, so
    /// dropping this future leaves the tasks to finish on their own.
    pub async fn review(&self, candidate: &ReviewCandidate) -> Verdict {
        let candidate = Arc::new(candidate.clone());
        let timeout = self.config.reviewer_timeout;

        let handles: Vec<_> = self
            .reviewers
            .iter()
            .map(|reviewer| {
                let name = reviewer.name().to_string();
                let reviewer = Arc::clone(reviewer);
                let candidate = Arc::clone(&candidate);
                let handle = tokio::spawn(async move {
                    tokio::time::timeout(timeout, reviewer.score(&candidate)).await
                });
                (name, handle)
            })
            .collect();

        let mut outcomes = Vec::with_capacity(handles.len());
        for (reviewer, handle) in handles {
            let failure = match handle.await {
                Ok(Ok(Ok(score))) if !is_valid_score(score.score) => {
                    format!("score {} outside 0-{MAX_IMPORTANCE}", score.score)
                }
                Ok(Ok(Ok(score))) => {
                    debug!("Reviewer {} scored {:.1}", reviewer, score.score);
                    outcomes.push(ReviewerOutcome {
                        reviewer,
                        score: score.score,
                        failure: None,
                    });
                    continue;
                }
                Ok(Ok(Err(e))) => e.to_string(),
                Ok(Err(_)) => ReviewError::Timeout(timeout).to_string(),
                Err(e) if e.is_panic() => "reviewer panicked".to_string(),
                Err(e) => format!("reviewer task failed: {e}"),
            };
            warn!(
                "Reviewer {} failed, using neutral score {}: {}",
                reviewer, self.config.neutral_score, failure
            );
            outcomes.push(ReviewerOutcome {
                reviewer,
                score: self.config.neutral_score,
                failure: Some(failure),
            });
        }

        let mean = outcomes.iter().map(|o| o.score).sum::<f32>() / outcomes.len() as f32;
        Verdict {
            mean,
            threshold: self.config.threshold,
            outcomes,
        }
    }
}

/// Finite and within the 0-10 review scale
fn is_valid_score(score: f32) -> bool {
    score.is_finite() && (0.0..=f32::from(MAX_IMPORTANCE)).contains(&score)
}
