use std::collections::BTreeMap;

use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use recall::memory::CODE_CONTEXT_KEY;
use recall::{
    MemoryBackend, MemoryCoordinator, MemoryEntry, MemoryType, StorageRequest, StorageResult,
};
use uuid::Uuid;

use crate::error::{CliError, CliResult};
use crate::output::{OutputFormat, format_timestamp, truncate_string};

#[derive(Parser)]
pub struct MemoryCommand {
    #[clap(subcommand)]
    pub command: MemorySubcommand,
}

#[derive(Subcommand)]
pub enum MemorySubcommand {
    #[clap(about = "Store a memory through the quality gate")]
    Store(StoreArgs),

    #[clap(about = "Search memories")]
    Search(SearchArgs),

    #[clap(about = "Show memory details")]
    Show(ShowArgs),

    #[clap(about = "Delete the working memory of a session")]
    ClearWorking(ClearWorkingArgs),

    #[clap(about = "Remove expired working memory")]
    Purge,
}

#[derive(Parser)]
pub struct StoreArgs {
    #[clap(help = "Short summary")]
    pub title: String,

    #[clap(help = "Memory content text")]
    pub content: String,

    #[clap(
        long,
        short,
        default_value = "semantic",
        help = "Memory type (episodic, semantic, procedural, prospective, working)"
    )]
    pub r#type: MemoryType,

    #[clap(long, short, help = "Owning session")]
    pub session: String,

    #[clap(long, short, default_value = "cli", help = "Creating agent")]
    pub agent: String,

    #[clap(long = "meta", value_parser = parse_key_value, help = "Metadata as key=value (repeatable)")]
    pub metadata: Vec<(String, String)>,

    #[clap(long, help = "Expire after this many minutes (working memory only)")]
    pub ttl_minutes: Option<i64>,
}

#[derive(Parser)]
pub struct SearchArgs {
    #[clap(help = "Case-insensitive text to look for in title and content")]
    pub text: Option<String>,

    #[clap(long, short, help = "Filter by memory type")]
    pub r#type: Option<MemoryType>,

    #[clap(long, help = "Filter to this session")]
    pub session: Option<String>,

    #[clap(long, help = "Filter to this agent")]
    pub agent: Option<String>,

    #[clap(long, help = "Minimum importance (0-10)")]
    pub min_importance: Option<u8>,

    #[clap(long, short, help = "Maximum number of entries")]
    pub limit: Option<usize>,

    #[clap(long, short, help = "Token budget for returned entries")]
    pub budget: Option<usize>,

    #[clap(long, help = "Attach linked code context (graph backend only)")]
    pub code_context: bool,
}

#[derive(Parser)]
pub struct ShowArgs {
    #[clap(help = "Memory ID (UUID format)")]
    pub id: String,
}

#[derive(Parser)]
pub struct ClearWorkingArgs {
    #[clap(help = "Session whose working memory is removed")]
    pub session: String,
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.to_string()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| format!("expected key=value, got '{s}'"))
}

impl MemoryCommand {
    pub async fn execute(
        &self,
        coordinator: &MemoryCoordinator,
        format: OutputFormat,
    ) -> CliResult<()> {
        match &self.command {
            MemorySubcommand::Store(args) => Self::store(coordinator, args, format).await,
            MemorySubcommand::Search(args) => Self::search(coordinator, args, format).await,
            MemorySubcommand::Show(args) => Self::show(coordinator, args, format).await,
            MemorySubcommand::ClearWorking(args) => {
                let removed = coordinator.clear_working_memory(&args.session).await?;
                Self::report_removed("working", removed, format)
            }
            MemorySubcommand::Purge => {
                let removed = coordinator.purge_expired().await?;
                Self::report_removed("expired", removed, format)
            }
        }
    }

    async fn store(
        coordinator: &MemoryCoordinator,
        args: &StoreArgs,
        format: OutputFormat,
    ) -> CliResult<()> {
        let metadata: BTreeMap<String, String> = args.metadata.iter().cloned().collect();
        let mut request = StorageRequest::new(
            args.r#type,
            &args.title,
            &args.content,
            &args.session,
            &args.agent,
        )
        .with_metadata_map(metadata);
        if let Some(minutes) = args.ttl_minutes {
            request = request.with_expiry(Utc::now() + Duration::minutes(minutes));
        }

        let result = coordinator.store(request).await?;

        match format {
            OutputFormat::Json => {
                let output = match &result {
                    StorageResult::Stored {
                        entry_id,
                        importance,
                    } => serde_json::json!({
                        "stored": true,
                        "id": entry_id.to_string(),
                        "importance": importance,
                    }),
                    StorageResult::NotStored {
                        score,
                        threshold,
                        reason,
                    } => serde_json::json!({
                        "stored": false,
                        "score": score,
                        "threshold": threshold,
                        "reason": reason,
                    }),
                };
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Table => match &result {
                StorageResult::Stored {
                    entry_id,
                    importance,
                } => {
                    let importance = importance
                        .map(|i| i.to_string())
                        .unwrap_or_else(|| "-".to_string());
                    println!("Stored {entry_id} (importance {importance})");
                }
                StorageResult::NotStored { reason, .. } => {
                    println!("Not stored: {reason}");
                }
            },
        }

        Ok(())
    }

    async fn search(
        coordinator: &MemoryCoordinator,
        args: &SearchArgs,
        format: OutputFormat,
    ) -> CliResult<()> {
        let mut query = coordinator.query();
        if let Some(text) = &args.text {
            query = query.with_content_search(text);
        }
        if let Some(memory_type) = args.r#type {
            query = query.with_memory_type(memory_type);
        }
        if let Some(session) = &args.session {
            query = query.with_session(session);
        }
        if let Some(agent) = &args.agent {
            query = query.with_agent(agent);
        }
        if let Some(min) = args.min_importance {
            query = query.with_min_importance(min);
        }
        if let Some(limit) = args.limit {
            query = query.with_limit(limit);
        }

        let mut request = coordinator.request(query);
        if let Some(budget) = args.budget {
            request.token_budget = budget;
        }
        request.include_code_context = args.code_context;

        let result = coordinator.retrieve(request).await?;

        match format {
            OutputFormat::Json => {
                let output = serde_json::json!({
                    "entries": result.entries.iter().map(entry_json).collect::<Vec<_>>(),
                    "truncated": result.truncated,
                    "tokens": result.total_tokens(),
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Table => {
                if result.entries.is_empty() {
                    println!("No memories found.");
                    return Ok(());
                }

                let mut table = Table::new();
                table
                    .load_preset(UTF8_FULL_CONDENSED)
                    .set_content_arrangement(ContentArrangement::Dynamic)
                    .set_header(["ID", "Type", "Title", "Importance", "Session", "Created"]);

                for entry in &result.entries {
                    table.add_row([
                        truncate_string(&entry.id.to_string(), 8),
                        entry.memory_type().to_string(),
                        truncate_string(&entry.title, 40),
                        entry
                            .importance
                            .map(|i| i.to_string())
                            .unwrap_or_else(|| "-".to_string()),
                        truncate_string(&entry.session_id, 16),
                        format_timestamp(&entry.created_at),
                    ]);
                }

                println!("{table}");
                println!(
                    "\nTotal: {} memories, ~{} tokens{}",
                    result.entries.len(),
                    result.total_tokens(),
                    if result.truncated {
                        " (truncated to budget)"
                    } else {
                        ""
                    }
                );
            }
        }

        Ok(())
    }

    async fn show(
        coordinator: &MemoryCoordinator,
        args: &ShowArgs,
        format: OutputFormat,
    ) -> CliResult<()> {
        let id = Uuid::parse_str(&args.id)
            .map_err(|e| CliError::Usage(format!("Invalid UUID format: {e}")))?;

        let entry = coordinator
            .backend()
            .get(id)
            .await?
            .ok_or_else(|| CliError::NotFound(args.id.clone()))?;

        match format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&entry_json(&entry))?);
            }
            OutputFormat::Table => {
                println!("ID:          {}", entry.id);
                println!("Type:        {}", entry.memory_type());
                println!("Title:       {}", entry.title);
                println!("Session:     {}", entry.session_id);
                println!("Agent:       {}", entry.agent_id);
                println!(
                    "Importance:  {}",
                    entry
                        .importance
                        .map(|i| i.to_string())
                        .unwrap_or_else(|| "-".to_string())
                );
                println!("Created:     {}", format_timestamp(&entry.created_at));
                println!("Accessed:    {}", format_timestamp(&entry.accessed_at));
                if let Some(expires_at) = entry.expires_at {
                    println!("Expires:     {}", format_timestamp(&expires_at));
                }
                for (key, value) in &entry.metadata {
                    println!("Meta:        {key} = {value}");
                }
                println!("\n{}", entry.content);
            }
        }

        Ok(())
    }

    fn report_removed(kind: &str, removed: usize, format: OutputFormat) -> CliResult<()> {
        match format {
            OutputFormat::Json => {
                println!("{}", serde_json::json!({ "removed": removed }));
            }
            OutputFormat::Table => println!("Removed {removed} {kind} entries"),
        }
        Ok(())
    }
}

fn entry_json(entry: &MemoryEntry) -> serde_json::Value {
    serde_json::json!({
        "id": entry.id.to_string(),
        "type": entry.memory_type().as_str(),
        "title": &entry.title,
        "content": &entry.content,
        "session_id": &entry.session_id,
        "agent_id": &entry.agent_id,
        "importance": entry.importance,
        "metadata": &entry.metadata,
        "code_context": entry.metadata.get(CODE_CONTEXT_KEY),
        "created_at": entry.created_at.to_rfc3339(),
        "accessed_at": entry.accessed_at.to_rfc3339(),
        "expires_at": entry.expires_at.map(|e| e.to_rfc3339()),
    })
}
