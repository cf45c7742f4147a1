//! ticket-sync CLI
//!
//! Watches a Jira project and a GitHub repository, hands tickets in the
//! trigger status to a processor command and moves tickets to done once
//! their pull request merges.

#![allow(clippy::disallowed_macros)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ticket_sync::console;
use ticket_sync::{
    CommandProcessor, Credentials, GitHubClient, JiraClient, JsonFileStore, LifecycleStore,
    PrState, TicketMatcher, WatchConfig, Watcher,
};

#[derive(Parser)]
#[command(name = "ticket-sync")]
#[command(about = "Keep Jira tickets and GitHub pull requests in sync")]
#[command(version)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// TOML config file
    #[arg(long, global = true, env = "TICKET_SYNC_CONFIG")]
    config: Option<PathBuf>,

    #[command(flatten)]
    target: TargetArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Target repository and project, shared by every command.
#[derive(Args)]
struct TargetArgs {
    /// GitHub repository (owner/name)
    #[arg(long, global = true, env = "TICKET_SYNC_REPO")]
    repo: Option<String>,

    /// Jira project key
    #[arg(long, global = true, env = "JIRA_PROJECT_KEY")]
    project_key: Option<String>,

    /// Status marking a ticket ready for processing
    #[arg(long, global = true, env = "TRIGGER_STATUS")]
    trigger_status: Option<String>,

    /// Status to move tickets to once their PR merges
    #[arg(long, global = true, env = "DONE_STATUS")]
    done_status: Option<String>,

    /// PR tracker file (default: ~/.ticket-sync/pr_tracker.json)
    #[arg(long, global = true, env = "TICKET_SYNC_STORE")]
    store: Option<PathBuf>,
}

impl TargetArgs {
    fn apply(self, config: &mut WatchConfig) {
        if let Some(repo) = self.repo {
            config.repository = repo;
        }
        if let Some(project_key) = self.project_key {
            config.project_key = project_key;
        }
        if let Some(trigger_status) = self.trigger_status {
            config.trigger_status = trigger_status;
        }
        if let Some(done_status) = self.done_status {
            config.done_status = done_status;
        }
        if self.store.is_some() {
            config.store_path = self.store;
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Poll Jira and GitHub until interrupted
    Watch {
        /// Seconds between polls
        #[arg(long, env = "POLL_INTERVAL_SECS")]
        interval: Option<u64>,

        /// Maximum tickets fetched per poll
        #[arg(long, env = "SEARCH_LIMIT")]
        search_limit: Option<usize>,

        /// Maximum closed PRs fetched per poll
        #[arg(long, env = "PR_PAGE_SIZE")]
        pr_page_size: Option<usize>,
    },

    /// List pull requests with their correlated ticket
    ListPrs {
        #[arg(long, value_enum, default_value_t = PrState::Open)]
        state: PrState,
    },

    /// Inspect or prune tracked pull requests
    Tracker {
        #[command(subcommand)]
        action: TrackerCommand,
    },
}

#[derive(Subcommand)]
enum TrackerCommand {
    /// List tracked PRs (filtered by --repo when given)
    List {
        /// Only PRs with failed CI or unaddressed feedback
        #[arg(long)]
        attention: bool,
    },

    /// Remove merged and closed PRs
    Cleanup,

    /// Stop tracking one PR
    Remove {
        /// Repository (owner/name)
        #[arg(value_name = "REPO")]
        repository: String,
        number: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = WatchConfig::load(cli.config.as_deref())?;
    let repo_filter = cli.target.repo.clone();
    cli.target.apply(&mut config);

    match cli.command {
        Commands::Watch {
            interval,
            search_limit,
            pr_page_size,
        } => {
            if let Some(secs) = interval {
                config.poll_interval = Duration::from_secs(secs);
            }
            if let Some(limit) = search_limit {
                config.search_limit = limit;
            }
            if let Some(size) = pr_page_size {
                config.pr_page_size = size;
            }
            watch(config).await
        }
        Commands::ListPrs { state } => list_prs(&config, state).await,
        Commands::Tracker { action } => tracker(&config, repo_filter.as_deref(), action),
    }
}

/// Console lines go to stdout, so tracing output goes to stderr.
fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("ticket_sync=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ticket_sync=warn"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

async fn watch(config: WatchConfig) -> Result<()> {
    config.validate()?;
    let credentials = Credentials::from_env();
    tracing::debug!(?credentials, "Loaded credentials");

    let (owner, name) = config.owner_and_name()?;
    let (base_url, email, api_token) = credentials.jira()?;
    let jira = JiraClient::new(base_url, email, api_token)?.with_done_status(&config.done_status);
    let github = GitHubClient::new(credentials.github_token()?, owner, name)?
        .with_page_size(config.pr_page_size);

    let mut processor = CommandProcessor::from_command_line(credentials.processor_command()?)
        .context("TICKET_PROCESSOR_CMD is empty or has unbalanced quotes")?;
    if let Some(secs) = credentials.processor_timeout_secs {
        processor = processor.with_timeout(Duration::from_secs(secs));
    }

    let store = open_store(&config)?;

    console::watch_banner(
        &config.repository,
        config.poll_interval.as_secs(),
        &config.project_key,
        &config.trigger_status,
        &config.done_status,
    );

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received SIGINT, shutting down after the current poll");
            signal.cancel();
        }
    });

    let mut watcher = Watcher::new(
        config,
        Arc::new(jira),
        Arc::new(github),
        Arc::new(processor),
        Box::new(store),
    )?;
    watcher.run(shutdown).await;
    Ok(())
}

async fn list_prs(config: &WatchConfig, state: PrState) -> Result<()> {
    let (owner, name) = config.owner_and_name()?;
    if config.project_key.trim().is_empty() {
        anyhow::bail!("Missing required setting: project_key (--project-key or JIRA_PROJECT_KEY)");
    }
    let credentials = Credentials::from_env();
    let github = GitHubClient::new(credentials.github_token()?, owner, name)?
        .with_page_size(config.pr_page_size);
    let matcher = TicketMatcher::new(&config.project_key)
        .context("Invalid Jira project key")?;

    println!("Fetching {} PRs from {}...", state.as_str(), github.repo_path());
    println!();

    let prs = github.list_pulls(state).await?;
    if prs.is_empty() {
        println!("No PRs found.");
        return Ok(());
    }

    console::pr_table_header();
    for pr in &prs {
        println!("{}", console::pr_row(pr, &matcher));
    }
    println!();
    println!("Total: {} PRs", prs.len());
    Ok(())
}

fn tracker(config: &WatchConfig, repo: Option<&str>, action: TrackerCommand) -> Result<()> {
    let mut store = open_store(config)?;

    match action {
        TrackerCommand::List { attention } => {
            let records = if attention {
                store.list_needing_attention(repo)
            } else {
                store
                    .list_all()
                    .into_iter()
                    .filter(|pr| repo.is_none_or(|r| pr.repo == r))
                    .collect()
            };

            if records.is_empty() {
                println!("No tracked PRs.");
                return Ok(());
            }
            for pr in &records {
                println!("{}", console::tracked_row(pr));
            }
            println!();
            println!("Total: {} tracked PRs", records.len());
        }
        TrackerCommand::Cleanup => {
            let removed = store.cleanup_closed()?;
            console::line(
                console::Marker::Success,
                &format!("Removed {removed} merged/closed PRs"),
            );
        }
        TrackerCommand::Remove { repository, number } => {
            if store.remove(&repository, number)? {
                console::line(
                    console::Marker::Success,
                    &format!("Stopped tracking {repository}#{number}"),
                );
            } else {
                console::line(
                    console::Marker::Skipped,
                    &format!("{repository}#{number} is not tracked"),
                );
            }
        }
    }

    Ok(())
}

/// Open the file store. A corrupt file is an error, never a reset.
fn open_store(config: &WatchConfig) -> Result<JsonFileStore> {
    let path = config.resolved_store_path()?;
    JsonFileStore::open(&path).with_context(|| format!("Failed to open PR store {}", path.display()))
}
