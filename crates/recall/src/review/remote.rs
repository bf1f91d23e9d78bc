//! Remote reviewer using OpenAI-compatible APIs
//!
//! Sends the review prompt to any OpenAI-compatible chat-completions
//! endpoint and parses a `{"score", "rationale"}` JSON reply. The API key
//! comes from the environment variable named in configuration.

use std::env;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::RemoteReviewerConfig;
use crate::memory::types::MAX_IMPORTANCE;
use crate::review::prompts::review_prompt;
use crate::review::provider::Reviewer;
use crate::review::types::{ReviewCandidate, ReviewError, ReviewScore};

const MAX_RETRIES: u32 = 3;

/// Reviewer backed by an OpenAI-compatible HTTP API
#[derive(Debug)]
pub struct RemoteReviewer {
    client: Client,
    config: RemoteReviewerConfig,
    api_key: String,
    name: String,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<Message>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ReviewJson {
    score: f32,
    #[serde(default)]
    rationale: Option<String>,
}

impl RemoteReviewer {
    /// Create a reviewer, reading the API key from `config.api_key_env`.
    pub fn new(config: &RemoteReviewerConfig) -> Result<Self, ReviewError> {
        let api_key = env::var(&config.api_key_env).map_err(|_| {
            ReviewError::Config(format!("API key env var '{}' not set", config.api_key_env))
        })?;
        Self::with_api_key(config, api_key)
    }

    /// Create a reviewer with an explicit API key.
    pub fn with_api_key(
        config: &RemoteReviewerConfig,
        api_key: impl Into<String>,
    ) -> Result<Self, ReviewError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ReviewError::Api(e.to_string()))?;

        info!(
            "RemoteReviewer initialized with model: {}, lens: {}, api_url: {}",
            config.model, config.lens, config.api_url
        );

        Ok(Self {
            client,
            config: config.clone(),
            api_key: api_key.into(),
            name: format!("remote:{}", config.lens),
        })
    }

    /// Call the remote API with exponential backoff for rate limiting
    ///
    /// Makes up to 3 attempts with backoff delays of 1s, 2s on 429 or
    /// transport errors.
    async fn call_api(&self, prompt: &str) -> Result<String, ReviewError> {
        let request = ChatCompletionRequest {
            model: self.config.model.clone(),
            messages: vec![
                Message {
                    role: "system".to_string(),
                    content: "You score memory entries. Reply with JSON only.".to_string(),
                },
                Message {
                    role: "user".to_string(),
                    content: prompt.to_string(),
                },
            ],
            temperature: 0.0,
            max_tokens: 200,
        };

        let url = format!(
            "{}/chat/completions",
            self.config.api_url.trim_end_matches('/')
        );
        debug!("Calling remote reviewer at: {}", url);

        let mut last_error = None;
        let mut delay = Duration::from_secs(1);

        for attempt in 0..MAX_RETRIES {
            match self
                .client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&request)
                .send()
                .await
            {
                Ok(response) => {
                    let status = response.status();

                    if status == 429 {
                        warn!(
                            "Rate limited on attempt {}/{}, waiting {:?}",
                            attempt + 1,
                            MAX_RETRIES,
                            delay
                        );
                        last_error = Some("rate limited".to_string());
                        tokio::time::sleep(delay).await;
                        delay *= 2;
                        continue;
                    }

                    if !status.is_success() {
                        let error_text = response
                            .text()
                            .await
                            .unwrap_or_else(|_| "Unknown error".to_string());
                        return Err(ReviewError::Api(format!(
                            "API returned {status}: {error_text}"
                        )));
                    }

                    let completion: ChatCompletionResponse = response
                        .json()
                        .await
                        .map_err(|e| ReviewError::Parse(e.to_string()))?;

                    return completion
                        .choices
                        .into_iter()
                        .next()
                        .map(|c| c.message.content)
                        .ok_or_else(|| ReviewError::Api("Empty response".to_string()));
                }
                Err(e) => {
                    let err_msg = e.to_string();
                    last_error = Some(err_msg.clone());
                    if attempt < MAX_RETRIES - 1 {
                        warn!(
                            "Request failed on attempt {}/{}, retrying: {}",
                            attempt + 1,
                            MAX_RETRIES,
                            err_msg
                        );
                        tokio::time::sleep(delay).await;
                        delay *= 2;
                    }
                }
            }
        }

        Err(ReviewError::Api(format!(
            "Failed after {} attempts: {}",
            MAX_RETRIES,
            last_error.unwrap_or_else(|| "Unknown error".to_string())
        )))
    }
}

/// Parse the model's reply, tolerating a fenced code block around the JSON.
fn parse_review(response: &str) -> Result<ReviewScore, ReviewError> {
    let trimmed = response.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.trim_end().strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();

    let parsed: ReviewJson = serde_json::from_str(body)
        .map_err(|e| ReviewError::Parse(format!("Failed to parse review JSON: {e}")))?;

    let max = f32::from(MAX_IMPORTANCE);
    if !parsed.score.is_finite() || !(0.0..=max).contains(&parsed.score) {
        return Err(ReviewError::Parse(format!(
            "Score {} is outside 0-{max}",
            parsed.score
        )));
    }

    let score = ReviewScore::new(parsed.score);
    Ok(match parsed.rationale {
        Some(rationale) => score.with_rationale(rationale),
        None => score,
    })
}

#[async_trait]
impl Reviewer for RemoteReviewer {
    async fn score(&self, candidate: &ReviewCandidate) -> Result<ReviewScore, ReviewError> {
        let prompt = review_prompt(self.config.lens, candidate);
        let response = self.call_api(&prompt).await?;
        debug!("Review response: {}", response);
        parse_review(&response)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::types::MemoryType;
    use crate::review::types::ReviewLens;
    use std::collections::BTreeMap;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn create_test_config(api_url: String) -> RemoteReviewerConfig {
        RemoteReviewerConfig {
            lens: ReviewLens::Durability,
            api_url,
            api_key_env: "RECALL_TEST_UNSET_KEY".to_string(),
            model: "gpt-4o-mini".to_string(),
            timeout_secs: 30,
        }
    }

    fn candidate() -> ReviewCandidate {
        ReviewCandidate {
            memory_type: MemoryType::Episodic,
            title: "Chose Redis for session storage".to_string(),
            content: "Redis gives TTLs natively; Memcached lacks persistence.".to_string(),
            session_id: "s-1".to_string(),
            agent_id: "agent-1".to_string(),
            metadata: BTreeMap::new(),
        }
    }

    fn completion(content: &str) -> serde_json::Value {
        serde_json::json!({
            "choices": [{
                "message": { "content": content }
            }]
        })
    }

    #[test]
    fn test_remote_reviewer_new_missing_api_key() {
        let config = create_test_config("https://api.example.com/v1".to_string());
        let err = RemoteReviewer::new(&config).unwrap_err().to_string();
        assert!(err.contains("RECALL_TEST_UNSET_KEY"));
    }

    #[test]
    fn test_parse_review_variants() {
        let score = parse_review(r#"{"score": 7, "rationale": "durable decision"}"#).unwrap();
        assert_eq!(score.score, 7.0);
        assert_eq!(score.rationale.as_deref(), Some("durable decision"));

        let fenced = "```json\n{\"score\": 4.5}\n```";
        assert_eq!(parse_review(fenced).unwrap().score, 4.5);

        assert!(matches!(
            parse_review(r#"{"score": 42}"#),
            Err(ReviewError::Parse(_))
        ));
        assert!(matches!(
            parse_review("definitely keep this"),
            Err(ReviewError::Parse(_))
        ));
    }

    #[tokio::test]
    async fn test_remote_reviewer_scores_candidate() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("Authorization", "Bearer test-key"))
            .and(body_string_contains("durability"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(completion(r#"{"score": 8, "rationale": "architectural"}"#)),
            )
            .mount(&mock_server)
            .await;

        let config = create_test_config(mock_server.uri());
        let reviewer = RemoteReviewer::with_api_key(&config, "test-key").unwrap();

        let score = reviewer.score(&candidate()).await.unwrap();
        assert_eq!(score.score, 8.0);
        assert_eq!(reviewer.name(), "remote:durability");
    }

    #[tokio::test]
    async fn test_remote_reviewer_rate_limit_retry() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(1)
            .mount(&mock_server)
            .await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion(r#"{"score": 6}"#)))
            .mount(&mock_server)
            .await;

        let config = create_test_config(mock_server.uri());
        let reviewer = RemoteReviewer::with_api_key(&config, "test-key").unwrap();

        let start = std::time::Instant::now();
        let score = reviewer.score(&candidate()).await.unwrap();
        let elapsed = start.elapsed();

        assert_eq!(score.score, 6.0);
        // Should have waited at least 1 second for retry
        assert!(elapsed >= Duration::from_millis(900));
    }

    #[tokio::test]
    async fn test_remote_reviewer_api_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(500).set_body_string("Internal Server Error"))
            .mount(&mock_server)
            .await;

        let config = create_test_config(mock_server.uri());
        let reviewer = RemoteReviewer::with_api_key(&config, "test-key").unwrap();

        let err = reviewer.score(&candidate()).await.unwrap_err();
        assert!(matches!(err, ReviewError::Api(_)));
        assert!(err.to_string().contains("500"));
    }

    #[tokio::test]
    async fn test_remote_reviewer_invalid_json_response() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("keep it")))
            .mount(&mock_server)
            .await;

        let config = create_test_config(mock_server.uri());
        let reviewer = RemoteReviewer::with_api_key(&config, "test-key").unwrap();

        let err = reviewer.score(&candidate()).await.unwrap_err();
        assert!(err.to_string().contains("parse") || err.to_string().contains("JSON"));
    }
}
