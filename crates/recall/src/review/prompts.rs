//! Prompt for model-backed reviewers
//!
//! Placeholders: {lens}, {lens_guidance}, {memory_type}, {title}, {content}

use crate::review::types::{ReviewCandidate, ReviewLens};

pub const REVIEW_PROMPT: &str = r#"You are reviewing a proposed entry for a coding agent's long-term memory.
Judge it through the lens of {lens}: {lens_guidance}

Score from 0 to 10:
- 0-3: noise, small talk, or information with no future value
- 4-5: marginal; might help but is vague or short-lived
- 6-8: useful; a concrete decision, fact, or procedure worth keeping
- 9-10: essential; future work will go wrong without it

Memory type: {memory_type}
Title: {title}
Content:
{content}

Respond with ONLY a JSON object in this exact format:
{"score": 7, "rationale": "one short sentence"}"#;

fn lens_guidance(lens: ReviewLens) -> &'static str {
    match lens {
        ReviewLens::Relevance => {
            "will this matter to future work on the same project or by the same agent?"
        }
        ReviewLens::Durability => {
            "will this still be true and useful next week, or is it transient state?"
        }
        ReviewLens::Specificity => {
            "is this concrete enough (names, paths, reasons, steps) to act on later?"
        }
    }
}

/// Fill the review prompt for one candidate
pub fn review_prompt(lens: ReviewLens, candidate: &ReviewCandidate) -> String {
    fill(
        REVIEW_PROMPT,
        &[
            ("lens_guidance", lens_guidance(lens)),
            ("lens", lens.as_str()),
            ("memory_type", candidate.memory_type.as_str()),
            ("title", &candidate.title),
            ("content", &candidate.content),
        ],
    )
}

/// Substitute `{key}` placeholders in one pass over `template`.
///
/// Inserted values are never rescanned, and braces that do not name a key
/// are kept as written.
fn fill(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let tail = &rest[start + 1..];
        let hit = values
            .iter()
            .find(|(key, _)| tail.starts_with(key) && tail[key.len()..].starts_with('}'));
        match hit {
            Some((key, value)) => {
                out.push_str(value);
                rest = &tail[key.len() + 1..];
            }
            None => {
                out.push('{');
                rest = tail;
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::types::MemoryType;
    use std::collections::BTreeMap;

    #[test]
    fn test_review_prompt_fills_placeholders() {
        let candidate = ReviewCandidate {
            memory_type: MemoryType::Semantic,
            title: "Config lives in TOML".to_string(),
            content: "All settings load from recall.toml".to_string(),
            session_id: "s-1".to_string(),
            agent_id: "agent-1".to_string(),
            metadata: BTreeMap::new(),
        };
        let prompt = review_prompt(ReviewLens::Durability, &candidate);

        assert!(prompt.contains("lens of durability"));
        assert!(prompt.contains("Memory type: Semantic"));
        assert!(prompt.contains("All settings load from recall.toml"));
        assert!(!prompt.contains("{lens}"));
        assert!(!prompt.contains("{content}"));
        assert!(prompt.contains(r#"{"score": 7, "rationale": "one short sentence"}"#));
    }

    #[test]
    fn test_candidate_text_is_not_substituted() {
        let candidate = ReviewCandidate {
            memory_type: MemoryType::Procedural,
            title: "Template uses {content} and {lens}".to_string(),
            content: "Body mentions {title}".to_string(),
            session_id: "s-1".to_string(),
            agent_id: "agent-1".to_string(),
            metadata: BTreeMap::new(),
        };
        let prompt = review_prompt(ReviewLens::Relevance, &candidate);

        assert!(prompt.contains("Title: Template uses {content} and {lens}\n"));
        assert!(prompt.contains("Content:\nBody mentions {title}\n"));
        assert_eq!(prompt.matches("Body mentions").count(), 1);
    }
}
