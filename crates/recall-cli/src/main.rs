use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use recall::config::BackendKind;
use recall::{Config, MemoryCoordinator};
use recall_cli::commands::{InitCommand, MemoryCommand, StatsCommand};
use recall_cli::error::CliResult;
use recall_cli::output::OutputFormat;

#[derive(Parser)]
#[command(name = "recall")]
#[command(about = "Recall - memory coordination engine for coding agents")]
#[command(version)]
pub struct Cli {
    #[clap(long, short, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[clap(long, short = 'd', global = true, help = "Path to data directory")]
    pub data_dir: Option<PathBuf>,

    #[clap(long, short = 'c', global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    #[clap(long, global = true, value_enum, help = "Storage backend to open")]
    pub backend: Option<BackendArg>,

    #[clap(long, global = true, help = "Commit without reviewer consensus")]
    pub no_gate: bool,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum BackendArg {
    Relational,
    Graph,
}

impl From<BackendArg> for BackendKind {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Relational => BackendKind::Relational,
            BackendArg::Graph => BackendKind::Graph,
        }
    }
}

#[derive(Subcommand)]
pub enum Command {
    #[clap(about = "Create or upgrade the store")]
    Init(InitCommand),

    #[clap(about = "Store and search memories")]
    Memory(MemoryCommand),

    #[clap(about = "Show storage statistics")]
    Stats(StatsCommand),
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(e.exit_code());
    }
}

async fn run() -> CliResult<()> {
    init_logging();

    let cli = Cli::parse();

    if let Command::Init(cmd) = &cli.command {
        if cmd.wants_template() {
            InitCommand::print_template();
            return Ok(());
        }
    }

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Table
    };

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(data_dir) = cli.data_dir {
        config.storage.data_dir = data_dir;
    }
    if let Some(backend) = cli.backend {
        config.storage.backend = backend.into();
    }
    if cli.no_gate {
        config.quality_gate.enabled = false;
    }

    let reviewers = if config.quality_gate.enabled {
        config.build_reviewers()?
    } else {
        Vec::new()
    };
    let coordinator = MemoryCoordinator::open(&config, reviewers).await?;

    match &cli.command {
        Command::Init(cmd) => {
            cmd.execute(
                &coordinator,
                config.storage.backend,
                &config.storage.data_dir,
                format,
            )
            .await
        }
        Command::Memory(cmd) => cmd.execute(&coordinator, format).await,
        Command::Stats(cmd) => cmd.execute(&coordinator, format).await,
    }
}

fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn,recall=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
