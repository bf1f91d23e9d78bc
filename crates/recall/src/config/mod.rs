use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{MemoryError, Result};
use crate::review::{
    ConsensusConfig, HeuristicReviewer, RemoteReviewer, ReviewLens, Reviewer,
};

/// File name looked up in the working directory
const LOCAL_CONFIG_FILE: &str = "recall.toml";

/// Main configuration structure for Recall
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Backend selection and on-disk location
    #[serde(default)]
    pub storage: StorageConfig,
    /// Reviewer consensus settings
    #[serde(default)]
    pub quality_gate: QualityGateConfig,
    /// Retrieval defaults
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

/// Which storage backend to run on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// LanceDB tables, no relationship support
    #[default]
    Relational,
    /// SQLite node/edge store with code-context traversal
    Graph,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: BackendKind,
    /// Base directory for all storage data
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Read-only SQLite connections for the graph backend
    #[serde(default = "default_graph_readers")]
    pub graph_readers: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            data_dir: default_data_dir(),
            graph_readers: default_graph_readers(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".recall"))
        .unwrap_or_else(|| PathBuf::from(".recall"))
}

fn default_graph_readers() -> usize {
    4
}

/// Quality gate configuration
#[derive(Debug, Clone, Deserialize)]
pub struct QualityGateConfig {
    /// Gate non-Working entries through reviewer consensus
    #[serde(default = "default_gate_enabled")]
    pub enabled: bool,
    /// Minimum mean score (0-10) required to commit
    #[serde(default = "default_threshold")]
    pub threshold: f32,
    /// Per-reviewer budget in milliseconds
    #[serde(default = "default_reviewer_timeout_ms")]
    pub reviewer_timeout_ms: u64,
    /// Score substituted for a reviewer that fails or times out
    #[serde(default = "default_neutral_score")]
    pub neutral_score: f32,
    #[serde(default = "default_reviewers")]
    pub reviewers: Vec<ReviewerConfig>,
}

impl Default for QualityGateConfig {
    fn default() -> Self {
        Self {
            enabled: default_gate_enabled(),
            threshold: default_threshold(),
            reviewer_timeout_ms: default_reviewer_timeout_ms(),
            neutral_score: default_neutral_score(),
            reviewers: default_reviewers(),
        }
    }
}

impl QualityGateConfig {
    pub fn consensus(&self) -> ConsensusConfig {
        ConsensusConfig {
            threshold: self.threshold,
            reviewer_timeout: Duration::from_millis(self.reviewer_timeout_ms),
            neutral_score: self.neutral_score,
        }
    }
}

fn default_gate_enabled() -> bool {
    true
}

fn default_threshold() -> f32 {
    6.0
}

fn default_reviewer_timeout_ms() -> u64 {
    150
}

fn default_neutral_score() -> f32 {
    5.0
}

fn default_reviewers() -> Vec<ReviewerConfig> {
    vec![
        ReviewerConfig::Heuristic {
            lens: ReviewLens::Relevance,
        },
        ReviewerConfig::Heuristic {
            lens: ReviewLens::Durability,
        },
    ]
}

/// One configured reviewer
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ReviewerConfig {
    Heuristic {
        #[serde(default)]
        lens: ReviewLens,
    },
    Remote(RemoteReviewerConfig),
}

/// Remote API configuration for a reviewer
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RemoteReviewerConfig {
    #[serde(default)]
    pub lens: ReviewLens,
    /// API base URL; `/chat/completions` is appended
    #[serde(default = "default_remote_api_url")]
    pub api_url: String,
    /// Environment variable name for API key
    #[serde(default = "default_remote_api_key_env")]
    pub api_key_env: String,
    /// Model identifier for remote API
    #[serde(default = "default_remote_model")]
    pub model: String,
    /// Request timeout in seconds
    #[serde(default = "default_remote_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for RemoteReviewerConfig {
    fn default() -> Self {
        Self {
            lens: ReviewLens::default(),
            api_url: default_remote_api_url(),
            api_key_env: default_remote_api_key_env(),
            model: default_remote_model(),
            timeout_secs: default_remote_timeout_secs(),
        }
    }
}

fn default_remote_api_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_remote_api_key_env() -> String {
    "RECALL_REVIEWER_API_KEY".to_string()
}

fn default_remote_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_remote_timeout_secs() -> u64 {
    30
}

/// Retrieval defaults applied when a caller does not specify them
#[derive(Debug, Clone, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_limit")]
    pub default_limit: usize,
    #[serde(default = "default_token_budget")]
    pub default_token_budget: usize,
    /// Code links rendered per entry during enrichment
    #[serde(default = "default_max_code_links")]
    pub max_code_links_per_entry: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            default_token_budget: default_token_budget(),
            max_code_links_per_entry: default_max_code_links(),
        }
    }
}

fn default_limit() -> usize {
    50
}

fn default_token_budget() -> usize {
    2000
}

fn default_max_code_links() -> usize {
    5
}

impl Config {
    /// Load configuration.
    ///
    /// An explicit `path` must exist. Otherwise the first existing file of
    /// `~/.recall/config.toml`, `<config_dir>/recall/config.toml` and
    /// `./recall.toml` is used, falling back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let found = match path {
            Some(p) => {
                if !p.exists() {
                    return Err(MemoryError::Config(format!(
                        "Config file not found: {}",
                        p.display()
                    )));
                }
                Some(p.to_path_buf())
            }
            None => Self::search_paths().into_iter().find(|p| p.is_file()),
        };

        let config = match found {
            Some(p) => {
                info!("Loading config from {}", p.display());
                Self::from_file(&p)?
            }
            None => {
                debug!("No config file found, using defaults");
                Self::default()
            }
        };
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| MemoryError::Config(format!("{}: {e}", path.display())))
    }

    fn search_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".recall").join("config.toml"));
        }
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("recall").join("config.toml"));
        }
        paths.push(PathBuf::from(LOCAL_CONFIG_FILE));
        paths
    }

    pub fn validate(&self) -> Result<()> {
        let gate = &self.quality_gate;
        if !(0.0..=10.0).contains(&gate.threshold) {
            return Err(MemoryError::Config(format!(
                "quality_gate.threshold {} is outside 0-10",
                gate.threshold
            )));
        }
        if !(0.0..=10.0).contains(&gate.neutral_score) {
            return Err(MemoryError::Config(format!(
                "quality_gate.neutral_score {} is outside 0-10",
                gate.neutral_score
            )));
        }
        if gate.reviewer_timeout_ms == 0 {
            return Err(MemoryError::Config(
                "quality_gate.reviewer_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if gate.enabled && gate.reviewers.is_empty() {
            return Err(MemoryError::Config(
                "quality_gate is enabled but no reviewers are configured".to_string(),
            ));
        }
        if self.retrieval.default_token_budget == 0 {
            return Err(MemoryError::Config(
                "retrieval.default_token_budget must be at least 1".to_string(),
            ));
        }
        if !(1..=crate::memory::query::MAX_LIMIT).contains(&self.retrieval.default_limit) {
            return Err(MemoryError::Config(format!(
                "retrieval.default_limit {} is outside 1-{}",
                self.retrieval.default_limit,
                crate::memory::query::MAX_LIMIT
            )));
        }
        Ok(())
    }

    /// Instantiate the configured reviewers.
    pub fn build_reviewers(&self) -> Result<Vec<Arc<dyn Reviewer>>> {
        self.quality_gate
            .reviewers
            .iter()
            .map(|rc| -> Result<Arc<dyn Reviewer>> {
                match rc {
                    ReviewerConfig::Heuristic { lens } => {
                        Ok(Arc::new(HeuristicReviewer::new(*lens)))
                    }
                    ReviewerConfig::Remote(remote) => RemoteReviewer::new(remote)
                        .map(|r| Arc::new(r) as Arc<dyn Reviewer>)
                        .map_err(|e| MemoryError::Config(e.to_string())),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.storage.backend, BackendKind::Relational);
        assert!(config.storage.data_dir.ends_with(".recall"));
        assert_eq!(config.storage.graph_readers, 4);
        assert!(config.quality_gate.enabled);
        assert_eq!(config.quality_gate.threshold, 6.0);
        assert_eq!(config.quality_gate.reviewer_timeout_ms, 150);
        assert_eq!(config.quality_gate.neutral_score, 5.0);
        assert_eq!(config.quality_gate.reviewers.len(), 2);
        assert_eq!(config.retrieval.default_limit, 50);
        assert_eq!(config.retrieval.default_token_budget, 2000);
        assert_eq!(config.retrieval.max_code_links_per_entry, 5);
        config.validate().unwrap();
    }

    #[test]
    fn test_toml_deserialization() {
        let toml_str = r#"
[storage]
backend = "graph"
data_dir = "/tmp/recall"
graph_readers = 2

[quality_gate]
threshold = 7.5
reviewer_timeout_ms = 300

[[quality_gate.reviewers]]
kind = "heuristic"
lens = "specificity"

[[quality_gate.reviewers]]
kind = "remote"
lens = "durability"
api_url = "https://llm.internal/v1"
api_key_env = "MY_KEY"
model = "small-model"

[retrieval]
default_token_budget = 4000
"#;

        let config: Config = toml::from_str(toml_str).expect("Failed to parse TOML");

        assert_eq!(config.storage.backend, BackendKind::Graph);
        assert_eq!(config.storage.data_dir, PathBuf::from("/tmp/recall"));
        assert_eq!(config.storage.graph_readers, 2);

        assert_eq!(config.quality_gate.threshold, 7.5);
        assert_eq!(config.quality_gate.neutral_score, 5.0);
        assert_eq!(
            config.quality_gate.reviewers[0],
            ReviewerConfig::Heuristic {
                lens: ReviewLens::Specificity
            }
        );
        match &config.quality_gate.reviewers[1] {
            ReviewerConfig::Remote(remote) => {
                assert_eq!(remote.lens, ReviewLens::Durability);
                assert_eq!(remote.api_key_env, "MY_KEY");
                assert_eq!(remote.timeout_secs, 30);
            }
            other => panic!("expected remote reviewer, got {other:?}"),
        }

        assert_eq!(config.retrieval.default_token_budget, 4000);
        assert_eq!(config.retrieval.default_limit, 50);

        let consensus = config.quality_gate.consensus();
        assert_eq!(consensus.reviewer_timeout, Duration::from_millis(300));
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let result: std::result::Result<Config, _> = toml::from_str("[storage]\nbackend = \"redis\"");
        assert!(result.is_err());
    }

    #[test]
    fn test_validation_rules() {
        let mut config = Config::default();
        config.quality_gate.threshold = 11.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.quality_gate.reviewer_timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.quality_gate.reviewers.clear();
        assert!(config.validate().is_err());
        config.quality_gate.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_explicit_path() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[quality_gate]\nenabled = false").unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert!(!config.quality_gate.enabled);
    }

    #[test]
    fn test_load_missing_explicit_path() {
        let err = Config::load(Some(Path::new("/nonexistent/recall.toml"))).unwrap_err();
        assert!(matches!(err, MemoryError::Config(_)));
    }

    #[test]
    fn test_load_parse_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[storage\nbackend = ").unwrap();

        let err = Config::load(Some(file.path())).unwrap_err();
        assert!(matches!(err, MemoryError::Config(_)));
    }

    #[test]
    fn test_build_reviewers() {
        let config = Config::default();
        let reviewers = config.build_reviewers().unwrap();
        let names: Vec<_> = reviewers.iter().map(|r| r.name().to_string()).collect();
        assert_eq!(names, ["heuristic:relevance", "heuristic:durability"]);

        let mut config = Config::default();
        config.quality_gate.reviewers = vec![ReviewerConfig::Remote(RemoteReviewerConfig {
            api_key_env: "RECALL_TEST_MISSING_REVIEWER_KEY".to_string(),
            ..RemoteReviewerConfig::default()
        })];
        assert!(matches!(
            config.build_reviewers(),
            Err(MemoryError::Config(_))
        ));
    }
}
