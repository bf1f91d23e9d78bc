use clap::Parser;
use recall::config::BackendKind;
use recall::{MemoryBackend, MemoryCoordinator};

use crate::error::CliResult;
use crate::output::OutputFormat;

const CONFIG_TEMPLATE: &str = r#"[storage]
backend = "relational"          # or "graph"
# data_dir = "~/.recall"

[quality_gate]
enabled = true
threshold = 6.0
reviewer_timeout_ms = 150
neutral_score = 5.0

[[quality_gate.reviewers]]
kind = "heuristic"
lens = "relevance"

[[quality_gate.reviewers]]
kind = "heuristic"
lens = "durability"

# [[quality_gate.reviewers]]
# kind = "remote"
# lens = "specificity"
# api_url = "https://api.openai.com/v1"
# api_key_env = "RECALL_REVIEWER_API_KEY"
# model = "gpt-4o-mini"

[retrieval]
default_limit = 50
default_token_budget = 2000
max_code_links_per_entry = 5
"#;

#[derive(Parser)]
pub struct InitCommand {
    #[clap(long, help = "Print a commented config file template and exit")]
    pub print_config: bool,
}

impl InitCommand {
    pub fn wants_template(&self) -> bool {
        self.print_config
    }

    pub fn print_template() {
        print!("{CONFIG_TEMPLATE}");
    }

    /// Report the store that opening the coordinator created or upgraded.
    pub async fn execute(
        &self,
        coordinator: &MemoryCoordinator,
        backend_kind: BackendKind,
        data_dir: &std::path::Path,
        format: OutputFormat,
    ) -> CliResult<()> {
        let backend = coordinator.backend();
        let version = backend.schema_version().await?;
        let path = match backend_kind {
            BackendKind::Relational => data_dir.join("lance"),
            BackendKind::Graph => data_dir.join("graph.db"),
        };

        match format {
            OutputFormat::Json => {
                let output = serde_json::json!({
                    "backend": backend.name(),
                    "path": path.display().to_string(),
                    "schema_version": version,
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Table => {
                println!(
                    "Initialized {} store at {} (schema v{})",
                    backend.name(),
                    path.display(),
                    version
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_parses_as_config() {
        let config: recall::Config = toml::from_str(CONFIG_TEMPLATE).unwrap();
        config.validate().unwrap();
        assert_eq!(config.quality_gate.reviewers.len(), 2);
    }
}
