use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use vaultmate::app::AppContext;
use vaultmate::cli;
use vaultmate::config::AppConfig;

#[derive(Parser)]
#[command(
    name = "vaultmate",
    version,
    about = "Personal productivity assistant for a markdown vault"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP API, the Telegram bot, and the nudge scheduler
    Serve,
    /// Search the vault for a phrase
    Search {
        query: String,
        /// Maximum number of matching lines
        #[arg(long, default_value_t = vaultmate::vault::DEFAULT_SEARCH_LIMIT)]
        limit: usize,
    },
    /// Check the vault, commands, LLM backend, and bot configuration
    Doctor,
    /// Manage project and goal records
    Project {
        #[command(subcommand)]
        action: ProjectAction,
    },
    /// List the loaded slash commands
    Commands,
    /// Send a custom nudge through the throttle
    Nudge { message: String },
}

#[derive(Subcommand)]
enum ProjectAction {
    /// Create a project record
    Create {
        name: String,
        #[arg(long, default_value = "")]
        description: String,
        /// high, medium, or low
        #[arg(long, default_value = "medium")]
        priority: String,
    },
    /// Create a goal record
    Goal {
        name: String,
        #[arg(long, default_value = "")]
        description: String,
        /// Target date, e.g. 2025-12-31
        #[arg(long)]
        target: Option<String>,
        /// Add a habit tracking section
        #[arg(long)]
        habit: bool,
    },
    /// Set progress (0-100) on a project or goal
    Progress {
        name: String,
        progress: i64,
        #[arg(long, default_value = "")]
        notes: String,
    },
    /// List active projects and goals
    List {
        /// Only records not updated for this many days
        #[arg(long)]
        stalled: Option<i64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load()?;

    // stdout is reserved for command output.
    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Serve => {
            let ctx = AppContext::build(config)?;
            vaultmate::server::serve(ctx).await?;
        }
        Command::Search { query, limit } => {
            cli::search::search(&config, &query, limit)?;
        }
        Command::Doctor => {
            let ctx = AppContext::build(config)?;
            cli::doctor::doctor(&ctx).await?;
        }
        Command::Project { action } => {
            let vault = vaultmate::vault::Vault::new(config.resolved_vault_path());
            match action {
                ProjectAction::Create {
                    name,
                    description,
                    priority,
                } => cli::project::create(&vault, &name, &description, &priority)?,
                ProjectAction::Goal {
                    name,
                    description,
                    target,
                    habit,
                } => cli::project::goal(&vault, &name, &description, target.as_deref(), habit)?,
                ProjectAction::Progress {
                    name,
                    progress,
                    notes,
                } => cli::project::progress(&vault, &name, progress, &notes)?,
                ProjectAction::List { stalled } => cli::project::list(&vault, stalled)?,
            }
        }
        Command::Commands => {
            cli::list_commands(&config);
        }
        Command::Nudge { message } => {
            let ctx = AppContext::build(config)?;
            cli::nudge(&ctx, &message).await?;
        }
    }

    Ok(())
}
