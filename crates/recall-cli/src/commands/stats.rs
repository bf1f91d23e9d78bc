use clap::Parser;
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use recall::memory::query::MAX_LIMIT;
use recall::{MemoryBackend, MemoryCoordinator, MemoryQuery, MemoryType};

use crate::error::CliResult;
use crate::output::OutputFormat;

#[derive(Parser)]
pub struct StatsCommand {
    #[clap(long, help = "Filter statistics to a specific session")]
    pub session: Option<String>,
}

impl StatsCommand {
    pub async fn execute(
        &self,
        coordinator: &MemoryCoordinator,
        format: OutputFormat,
    ) -> CliResult<()> {
        let backend = coordinator.backend();
        let total = backend.count().await?;
        let schema_version = backend.schema_version().await?;
        let capabilities = coordinator.capabilities();

        // Live (unexpired) entries per type, capped at the query limit
        let mut by_type = Vec::with_capacity(MemoryType::ALL.len());
        for memory_type in MemoryType::ALL {
            let mut query = MemoryQuery::new()
                .with_memory_type(memory_type)
                .with_limit(MAX_LIMIT);
            if let Some(session) = &self.session {
                query = query.with_session(session);
            }
            let entries = backend.read(&query).await?;
            let tokens: usize = entries.iter().map(|e| e.estimated_tokens()).sum();
            by_type.push((memory_type, entries.len(), tokens));
        }

        match format {
            OutputFormat::Json => {
                let output = serde_json::json!({
                    "backend": backend.name(),
                    "schema_version": schema_version,
                    "total_entries": total,
                    "capabilities": {
                        "graph_traversal": capabilities.graph_traversal,
                        "full_text_search": capabilities.full_text_search,
                    },
                    "by_type": by_type
                        .iter()
                        .map(|(t, count, tokens)| {
                            (t.as_str().to_lowercase(), serde_json::json!({
                                "count": count,
                                "estimated_tokens": tokens,
                            }))
                        })
                        .collect::<serde_json::Map<_, _>>(),
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Table => {
                println!("Recall Statistics");
                println!("======================\n");
                println!("Backend:        {} (schema v{})", backend.name(), schema_version);
                println!(
                    "Capabilities:   graph traversal {}, full-text search {}\n",
                    yes_no(capabilities.graph_traversal),
                    yes_no(capabilities.full_text_search)
                );

                let mut table = Table::new();
                table
                    .load_preset(UTF8_FULL_CONDENSED)
                    .set_content_arrangement(ContentArrangement::Dynamic)
                    .set_header(["Type", "Count", "Estimated Tokens"]);

                for (memory_type, count, tokens) in &by_type {
                    table.add_row([
                        memory_type.to_string(),
                        format_count(*count),
                        tokens.to_string(),
                    ]);
                }

                println!("{table}\n");
                println!("Total: {total} stored entries (including expired working memory)");
            }
        }

        Ok(())
    }
}

fn yes_no(flag: bool) -> &'static str {
    if flag { "yes" } else { "no" }
}

fn format_count(count: usize) -> String {
    if count >= MAX_LIMIT {
        format!("{count}+")
    } else {
        count.to_string()
    }
}
