//! Quality gate integration tests
//!
//! Drive the coordinator with real reviewers: the heuristic set from the
//! default configuration and a remote reviewer pointed at a mock server.

use std::sync::Arc;
use std::time::Duration;

use recall::config::{BackendKind, RemoteReviewerConfig};
use recall::review::{HeuristicReviewer, RemoteReviewer, ReviewLens};
use recall::storage::GraphBackend;
use recall::testing::{
    FailingReviewer, FixedReviewer, PanickingReviewer, SlowReviewer, redis_decision, small_talk,
};
use recall::{Config, MemoryCoordinator, Reviewer, StorageResult};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config(dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.storage.backend = BackendKind::Graph;
    config.storage.data_dir = dir.path().to_path_buf();
    config
}

async fn coordinator_with(
    config: &Config,
    reviewers: Vec<Arc<dyn Reviewer>>,
) -> MemoryCoordinator {
    let graph = GraphBackend::open(&config.storage.data_dir.join("graph.db"), 2)
        .await
        .unwrap();
    MemoryCoordinator::new(Arc::new(graph), config, reviewers).unwrap()
}

fn remote_reviewer(server: &MockServer) -> Arc<dyn Reviewer> {
    let config = RemoteReviewerConfig {
        lens: ReviewLens::Relevance,
        api_url: server.uri(),
        timeout_secs: 5,
        ..RemoteReviewerConfig::default()
    };
    Arc::new(RemoteReviewer::with_api_key(&config, "test-key").unwrap())
}

fn completion(content: &str) -> serde_json::Value {
    serde_json::json!({
        "choices": [{ "message": { "content": content } }]
    })
}

mod heuristic_gate_tests {
    use super::*;

    #[tokio::test]
    async fn test_default_reviewers_keep_decisions() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        let reviewers = config.build_reviewers().unwrap();
        let coordinator = coordinator_with(&config, reviewers).await;

        let result = coordinator.store(redis_decision("s-h")).await.unwrap();
        let id = result.entry_id().expect("decision should pass the gate");
        let stored = coordinator.backend().get(id).await.unwrap().unwrap();
        assert!(stored.importance.unwrap() >= 6);
    }

    #[tokio::test]
    async fn test_default_reviewers_decline_small_talk() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        let reviewers = config.build_reviewers().unwrap();
        let coordinator = coordinator_with(&config, reviewers).await;

        let result = coordinator.store(small_talk("s-h")).await.unwrap();
        match result {
            StorageResult::NotStored { score, reason, .. } => {
                assert!(score < 6.0);
                assert!(reason.contains("heuristic:relevance"));
                assert!(reason.contains("heuristic:durability"));
            }
            other => panic!("expected NotStored, got {other:?}"),
        }
        assert_eq!(coordinator.backend().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_specificity_reviewer_in_panel() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        let coordinator = coordinator_with(
            &config,
            vec![Arc::new(HeuristicReviewer::new(ReviewLens::Specificity))],
        )
        .await;

        assert!(
            coordinator
                .store(redis_decision("s-spec"))
                .await
                .unwrap()
                .is_stored()
        );
    }
}

mod remote_gate_tests {
    use super::*;

    #[tokio::test]
    async fn test_remote_score_joins_consensus() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(completion(r#"{"score": 9, "rationale": "architecture"}"#)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let mut config = test_config(&dir);
        config.quality_gate.reviewer_timeout_ms = 5_000;
        let coordinator = coordinator_with(
            &config,
            vec![remote_reviewer(&server), Arc::new(FixedReviewer::new(7.0))],
        )
        .await;

        let id = coordinator
            .store(redis_decision("s-r"))
            .await
            .unwrap()
            .entry_id()
            .unwrap();
        let stored = coordinator.backend().get(id).await.unwrap().unwrap();
        assert_eq!(stored.importance, Some(8));
    }

    #[tokio::test]
    async fn test_remote_failure_counts_as_neutral() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(500).set_body_string("upstream down"))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let mut config = test_config(&dir);
        config.quality_gate.reviewer_timeout_ms = 5_000;
        let coordinator = coordinator_with(
            &config,
            vec![remote_reviewer(&server), Arc::new(FixedReviewer::new(6.0))],
        )
        .await;

        // (5.0 neutral + 6.0) / 2 = 5.5
        match coordinator.store(redis_decision("s-r")).await.unwrap() {
            StorageResult::NotStored { score, reason, .. } => {
                assert_eq!(score, 5.5);
                assert!(reason.contains("remote:relevance=5.0 (neutral"));
            }
            other => panic!("expected NotStored, got {other:?}"),
        }
    }
}

mod resilience_tests {
    use super::*;

    #[tokio::test]
    async fn test_misbehaving_reviewers_do_not_fail_store() {
        let dir = TempDir::new().unwrap();
        let mut config = test_config(&dir);
        config.quality_gate.reviewer_timeout_ms = 50;
        let coordinator = coordinator_with(
            &config,
            vec![
                Arc::new(PanickingReviewer::new()),
                Arc::new(SlowReviewer::new(10.0, Duration::from_secs(5))),
                Arc::new(FailingReviewer::new()),
                Arc::new(FixedReviewer::new(10.0)),
            ],
        )
        .await;

        let started = std::time::Instant::now();
        let result = coordinator.store(redis_decision("s-x")).await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(2));

        // Three neutral fallbacks and one 10.0: (15 + 10) / 4 = 6.25
        let id = result.entry_id().unwrap();
        let stored = coordinator.backend().get(id).await.unwrap().unwrap();
        assert_eq!(stored.importance, Some(6));
    }

    #[tokio::test]
    async fn test_working_memory_never_reviewed() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        let reviewer = FixedReviewer::new(0.0);
        let coordinator = coordinator_with(&config, vec![Arc::new(reviewer.clone())]).await;

        let result = coordinator
            .store(recall::testing::scratch(
                "s-w",
                "ok",
                chrono::Duration::minutes(5),
            ))
            .await
            .unwrap();
        assert!(result.is_stored());
        assert_eq!(reviewer.calls(), 0);
    }
}
