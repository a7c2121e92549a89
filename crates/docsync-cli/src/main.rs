mod commands;
mod config;
mod logging;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use docsync::{
    FetcherSet, LocalWorkspaceFactory, RetryPolicy, StaticRegistry, SyncOptions,
    SyncOrchestrator, WorkspaceFactory,
};
use docsync_channel::{ChannelClient, ChannelFetcher};
use docsync_github::{GitHubApi, GitSnapshotPublisher, GitSparseCheckout, RepoFetcher};
use docsync_store::SyncStore;

use crate::config::{AppConfig, CheckoutStrategy};

#[derive(Parser)]
#[command(name = "docsync")]
#[command(about = "Sync documentation sources into a git snapshot repository")]
struct Cli {
    /// Config file (defaults to ~/.config/docsync/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch every source and commit the result to the snapshot repository
    Sync {
        /// Discard workspace content left by an earlier attempt of this run
        #[arg(long)]
        reset: bool,
        /// Fetch and filter only; make no commit
        #[arg(long)]
        no_push: bool,
        /// Only sync the source with this id
        #[arg(long)]
        source: Option<String>,
        /// Abort the run after this many seconds
        #[arg(long)]
        timeout: Option<u64>,
        /// Resume a previous run, replaying its completed steps
        #[arg(long)]
        run_id: Option<String>,
    },
    /// List configured sources
    Sources {
        /// Filter by type (repo, readme-only-repo, channel, custom)
        #[arg(long = "type")]
        source_type: Option<String>,
    },
    /// Show recorded source versions
    Versions {
        /// Only show versions of this source
        source_id: Option<String>,
    },
}

fn load_app_config(path: Option<PathBuf>) -> Result<AppConfig> {
    let path = path.or_else(config::config_path);
    let mut app = config::load_config(path.as_deref())?;
    app.apply_env(|name| std::env::var(name).ok());
    Ok(app)
}

fn open_store() -> Result<Arc<SyncStore>> {
    let path = config::db_path()?;
    let store = SyncStore::open(&path)
        .with_context(|| format!("failed to open database at {}", path.display()))?;
    Ok(Arc::new(store))
}

fn build_registry(app: &AppConfig) -> Result<Arc<StaticRegistry>> {
    let registry = StaticRegistry::new(app.sources()).context("invalid source configuration")?;
    Ok(Arc::new(registry))
}

fn build_fetchers(app: &AppConfig) -> FetcherSet {
    let api = GitHubApi::new(app.github_token.clone(), None);
    let mut repo = RepoFetcher::new(api);
    if app.fetch.checkout == CheckoutStrategy::Git {
        repo = repo.with_checkout(GitSparseCheckout::new(app.github_token.clone()));
    }

    let channel = ChannelFetcher::new(ChannelClient::new(app.youtube_api_key.clone()));

    FetcherSet::new().with_repo(repo).with_channel(channel)
}

fn build_orchestrator(app: &AppConfig, store: Arc<SyncStore>) -> Result<SyncOrchestrator> {
    let workspaces: Arc<dyn WorkspaceFactory> = match &app.fetch.workspace_dir {
        Some(dir) => Arc::new(LocalWorkspaceFactory::new(dir)),
        None => Arc::new(LocalWorkspaceFactory::in_temp_dir()),
    };

    let orchestrator = SyncOrchestrator::new(
        build_registry(app)?,
        Arc::new(build_fetchers(app)),
        Arc::new(GitSnapshotPublisher::new()),
        store.clone(),
        workspaces,
    )
    .with_checkpoints(store)
    .with_retry_policy(RetryPolicy {
        max_attempts: app.fetch.max_attempts.max(1),
        ..RetryPolicy::default()
    });

    Ok(orchestrator)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init()?;

    let app = load_app_config(cli.config)?;

    match cli.command {
        Command::Sync {
            reset,
            no_push,
            source,
            timeout,
            run_id,
        } => {
            let store = open_store()?;
            let orchestrator = build_orchestrator(&app, store)?;
            let options = SyncOptions {
                reset,
                push: !no_push,
                source_filter: source,
                run_id,
                timeout: timeout.or(app.fetch.timeout_secs).map(Duration::from_secs),
            };
            commands::sync::run(&orchestrator, &app.snapshot, options).await
        }
        Command::Sources { source_type } => {
            let registry = build_registry(&app)?;
            commands::sources::run(registry.as_ref(), source_type.as_deref())
        }
        Command::Versions { source_id } => {
            let store = open_store()?;
            commands::versions::run(&store, source_id.as_deref())
        }
    }
}
