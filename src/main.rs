//! sfmcli-rs: migrate data extension rows between two Marketing Cloud
//! environments.
//!
//! Data extensions are matched by name across environments, split into
//! pages sized from a sampled row, and transferred concurrently. Progress is
//! kept in a local SQLite database so interrupted runs resume, and the
//! target's async job results can be aggregated into an error report later.

#![warn(clippy::all)]

mod api;
mod auth;
mod cli;
mod config;
mod pipeline;
mod retry;
mod state;
mod types;

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::Command;
use config::{Config, Environments};
use pipeline::Pipeline;
use state::{PageStatus, SqliteStatusStore, StatusStore};

fn load_environments(config: &Config) -> anyhow::Result<Environments> {
    Environments::load(&config.environments_path)
}

async fn open_store(config: &Config) -> anyhow::Result<Arc<SqliteStatusStore>> {
    Ok(Arc::new(SqliteStatusStore::open(&config.db_path).await?))
}

async fn build_pipeline(config: &Config) -> anyhow::Result<Pipeline> {
    let client = api::http_client()?;
    Ok(Pipeline {
        api: Arc::new(api::HttpPlatformApi::new(client, config.retry)),
        store: open_store(config).await?,
        workers: config.workers,
        no_progress_bar: config.no_progress_bar,
    })
}

/// Ask for confirmation on stdin. Anything but `y` declines.
fn confirm(prompt: &str) -> anyhow::Result<bool> {
    print!("{prompt} [y/N] ");
    std::io::stdout().flush()?;

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(input.trim().eq_ignore_ascii_case("y"))
}

async fn run_populate(config: &Config, args: cli::PopulateArgs) -> anyhow::Result<()> {
    let environments = load_environments(config)?;
    let (origin, target) = environments.pair(&args.origin, &args.target)?;
    let ctx = build_pipeline(config).await?;

    let stats = pipeline::populate(&ctx, origin, target, args.update_only).await?;

    println!();
    println!("Data extensions linked: {}", stats.entries_linked);
    println!("Pages scheduled:        {}", stats.pages_scheduled);
    println!("Pages processed:        {}", stats.pages_processed);
    println!("Pages failed:           {}", stats.pages_failed);
    if stats.pages_failed > 0 {
        println!();
        println!("Run `sfmcli-rs status --failed` for details and `sfmcli-rs retry-failed` to retry.");
    }
    Ok(())
}

async fn run_report(config: &Config, args: cli::ReportArgs) -> anyhow::Result<()> {
    let environments = load_environments(config)?;
    let target = environments.get(&args.target)?;
    let ctx = build_pipeline(config).await?;

    let rows = pipeline::report::build_report(&ctx, target).await?;
    let output = config::expand_tilde(&args.output);
    pipeline::report::write_csv(&rows, &output)?;

    if rows.is_empty() {
        println!("No row errors reported for '{}'.", target.name);
    } else {
        println!("{}", pipeline::report::render_table(&rows));
    }
    println!("Report written to {}", output.display());
    Ok(())
}

async fn run_clean(config: &Config, args: cli::CleanArgs) -> anyhow::Result<()> {
    let environments = load_environments(config)?;
    let target = environments.get(&args.target)?;
    let ctx = build_pipeline(config).await?;

    let entries = ctx.store.entries_for_target(&target.name).await?;
    if entries.is_empty() {
        println!("No data extensions linked to '{}'.", target.name);
        return Ok(());
    }

    if !args.yes {
        println!(
            "This will delete ALL rows of {} data extension(s) in '{}':",
            entries.len(),
            target.name
        );
        for entry in &entries {
            println!("  {}", entry.name);
        }
        println!();
        if !confirm("Are you sure?")? {
            println!("Cancelled.");
            return Ok(());
        }
    }

    let summary = pipeline::clean::clean_target(&ctx, target).await?;
    println!("Cleared: {}", summary.cleared);
    if summary.failed > 0 {
        println!("Failed:  {}", summary.failed);
    }
    Ok(())
}

async fn run_retry_failed(config: &Config) -> anyhow::Result<()> {
    if !config.db_path.exists() {
        println!("No state database found at {}", config.db_path.display());
        return Ok(());
    }
    let store = open_store(config).await?;
    let reset = store.reset_failed().await?;
    println!("Reset {reset} failed page(s). They will be retried on the next populate.");
    Ok(())
}

async fn run_status(config: &Config, args: cli::StatusArgs) -> anyhow::Result<()> {
    let db_path: &Path = &config.db_path;
    if !db_path.exists() {
        println!("No state database found at {}", db_path.display());
        println!("Run populate first to create the database.");
        return Ok(());
    }

    let store = open_store(config).await?;
    let summary = store.summary().await?;

    println!("State Database: {}", store.path().display());
    println!();
    println!("Data extensions:");
    println!("  Total:     {}", summary.entries);
    println!("  Linked:    {}", summary.linked_entries);
    println!();
    println!("Pages:");
    println!("  New:       {}", summary.pages_new);
    println!("  Processed: {}", summary.pages_processed);
    println!("  Failed:    {}", summary.pages_failed);
    println!();

    if let Some(started) = &summary.last_run_started {
        println!(
            "Last run started:   {}",
            started.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }
    if let Some(completed) = &summary.last_run_completed {
        println!(
            "Last run completed: {}",
            completed.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }

    if args.failed && summary.pages_failed > 0 {
        println!();
        println!("Failed pages:");
        for page in store.pages_with_status(PageStatus::Failed).await? {
            println!(
                "  {} (attempts: {}) - {}",
                page.url,
                page.attempts,
                page.last_error.as_deref().unwrap_or("unknown error")
            );
        }
    }

    Ok(())
}

fn run_environments(config: &Config) -> anyhow::Result<()> {
    let environments = load_environments(config)?;
    println!("Environments: {}", config.environments_path.display());
    println!();
    for env in environments.iter() {
        let endpoints = api::Endpoints::for_environment(env);
        println!("{}", env.name);
        println!("  subdomain:  {}", env.subdomain);
        println!("  client_id:  {}", env.client_id);
        println!("  account_id: {}", env.account_id);
        println!("  catalog:    {}", env.catalog_url);
        println!("  rest:       {}", endpoints.rest_root);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();
    let config = Config::from_cli(&cli)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_filter())),
        )
        .init();
    tracing::debug!(?config, "Loaded configuration");

    match cli.command {
        Command::Populate(args) => run_populate(&config, args).await,
        Command::Report(args) => run_report(&config, args).await,
        Command::Clean(args) => run_clean(&config, args).await,
        Command::RetryFailed => run_retry_failed(&config).await,
        Command::Status(args) => run_status(&config, args).await,
        Command::Environments => run_environments(&config),
    }
}
