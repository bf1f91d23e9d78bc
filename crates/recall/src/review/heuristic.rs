//! Offline rule-based reviewer
//!
//! Scores a candidate from surface signals: length, concrete details such as
//! numbers and code identifiers, decision language, and type-specific cues.
//! Lets the quality gate run without any model.

use async_trait::async_trait;

use crate::memory::types::MemoryType;
use crate::review::provider::Reviewer;
use crate::review::types::{ReviewCandidate, ReviewError, ReviewLens, ReviewScore};

const BASE_SCORE: f32 = 5.0;

const SHORT_CONTENT_CHARS: usize = 20;
const MODERATE_CONTENT_CHARS: usize = 40;
const LONG_CONTENT_CHARS: usize = 4000;

const DECISION_WORDS: &[&str] = &[
    "chose",
    "decided",
    "because",
    "instead of",
    "rather than",
    "prefer",
    "must",
    "always",
    "never",
];

const FILLER_WORDS: &[&str] = &["ok", "okay", "thanks", "thank you", "lol", "hello", "hi", "sure"];

const TEMPORAL_WORDS: &[&str] = &[
    "today",
    "right now",
    "currently",
    "temporarily",
    "for now",
    "this morning",
];

const INTENT_WORDS: &[&str] = &["todo", "will ", "next", "plan", "remind", "follow up"];

/// Rule-based reviewer weighted by a lens
#[derive(Debug, Clone)]
pub struct HeuristicReviewer {
    lens: ReviewLens,
    name: String,
}

impl HeuristicReviewer {
    pub fn new(lens: ReviewLens) -> Self {
        Self {
            lens,
            name: format!("heuristic:{lens}"),
        }
    }

    pub fn lens(&self) -> ReviewLens {
        self.lens
    }

    /// Compute the score synchronously. Deterministic for a given candidate.
    pub fn evaluate(&self, candidate: &ReviewCandidate) -> ReviewScore {
        let content = candidate.content.trim();
        let text = format!("{} {}", candidate.title, content).to_lowercase();
        let mut score = BASE_SCORE;
        let mut notes = Vec::new();

        let chars = content.chars().count();
        if chars < SHORT_CONTENT_CHARS {
            score -= 2.0;
            notes.push("very short");
        } else if chars > LONG_CONTENT_CHARS {
            score -= 1.0;
            notes.push("very long");
        } else if chars >= MODERATE_CONTENT_CHARS {
            score += 1.0;
        }

        let is_filler = content
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .all(|w| FILLER_WORDS.iter().any(|f| f.split(' ').any(|p| p == w)));
        if is_filler {
            score -= 1.5;
            notes.push("small talk");
        }

        let specificity_weight = match self.lens {
            ReviewLens::Specificity => 2.0,
            _ => 1.0,
        };
        if content.chars().any(|c| c.is_ascii_digit()) {
            score += 0.5 * specificity_weight;
        }
        if has_code_token(content) {
            score += 1.0 * specificity_weight;
            notes.push("names code");
        }

        if contains_any(&text, DECISION_WORDS) {
            score += match self.lens {
                ReviewLens::Relevance => 2.0,
                _ => 1.5,
            };
            notes.push("records a decision");
        }

        score += type_bonus(candidate.memory_type, content, &text);

        if self.lens == ReviewLens::Durability && contains_any(&text, TEMPORAL_WORDS) {
            score -= 1.5;
            notes.push("transient");
        }

        let result = ReviewScore::new(score);
        if notes.is_empty() {
            result
        } else {
            result.with_rationale(notes.join(", "))
        }
    }
}

impl Default for HeuristicReviewer {
    fn default() -> Self {
        Self::new(ReviewLens::default())
    }
}

fn contains_any(text: &str, words: &[&str]) -> bool {
    words.iter().any(|w| {
        text.match_indices(w).any(|(i, _)| {
            let before = text[..i].chars().next_back();
            let after = text[i + w.len()..].chars().next();
            !before.is_some_and(char::is_alphanumeric)
                && (w.ends_with(' ') || !after.is_some_and(char::is_alphanumeric))
        })
    })
}

/// Paths, module paths, calls, snake_case or backticked identifiers
fn has_code_token(content: &str) -> bool {
    content.split_whitespace().any(|token| {
        token.contains("::")
            || token.contains('`')
            || token.contains("()")
            || (token.contains('/') && token.len() > 2)
            || (token.contains('_') && token.chars().any(char::is_alphabetic))
            || [".rs", ".toml", ".py", ".ts", ".go", ".json"]
                .iter()
                .any(|ext| token.trim_end_matches([',', '.', ';', ')']).ends_with(ext))
    })
}

fn type_bonus(memory_type: MemoryType, content: &str, text: &str) -> f32 {
    match memory_type {
        MemoryType::Procedural => {
            let has_steps = content.lines().filter(|l| !l.trim().is_empty()).count() > 1
                || content.contains("1.")
                || text.contains(" then ");
            if has_steps { 1.0 } else { 0.0 }
        }
        MemoryType::Prospective => {
            if contains_any(text, INTENT_WORDS) {
                1.0
            } else {
                0.0
            }
        }
        MemoryType::Semantic => 0.5,
        MemoryType::Episodic | MemoryType::Working => 0.0,
    }
}

#[async_trait]
impl Reviewer for HeuristicReviewer {
    async fn score(&self, candidate: &ReviewCandidate) -> Result<ReviewScore, ReviewError> {
        Ok(self.evaluate(candidate))
    }

    fn name(&self) -> &str {
        &self.name
    }
}
