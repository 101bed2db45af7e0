mod config;
mod models;
mod pipeline;
mod scheduler;
mod scraper;
mod storage;

#[cfg(test)]
mod test_support;

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::config::AppConfig;
use crate::pipeline::Orchestrator;
use crate::scheduler::Scheduler;
use crate::scraper::http_client::HttpSessions;
use crate::storage::Repository;

#[derive(Parser)]
#[command(name = "ngx-news-engine", about = "Nigerian financial news ingestion engine", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Run one ingestion pass over every source and exit
    Run {
        /// Print the run summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run a pass now, then every configured interval, until Ctrl-C
    Schedule,

    /// Apply schema migrations without scraping
    Migrate,

    /// Show database statistics and recent runs
    Stats {
        /// How many recent runs to list
        #[arg(short, long, default_value_t = 10)]
        runs: usize,
    },

    /// Stop ingesting a source until resumed
    Pause { source: String },

    /// Resume ingesting a paused source
    Resume { source: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "ngx_news_engine=info,warn",
        1 => "ngx_news_engine=debug,info",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().compact().with_target(false))
        .with(EnvFilter::new(filter))
        .init();

    let config = AppConfig::load()?;

    match cli.command {
        Command::Run { json } => {
            let summary = build_orchestrator(&config)?.run_once().await;
            info!(
                "Pass took {}s",
                (summary.finished_at - summary.started_at).num_seconds()
            );
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                for s in &summary.sources {
                    println!(
                        "  {:<16} {:<8} found {:>5}  scraped {:>5}  {}",
                        s.source,
                        s.status,
                        s.articles_found,
                        s.articles_scraped,
                        s.error_message.as_deref().unwrap_or("")
                    );
                }
            }
        }

        Command::Schedule => {
            let orchestrator = Arc::new(build_orchestrator(&config)?);
            let scheduler = Scheduler::new(
                orchestrator,
                config.scheduler.interval(),
                config.scheduler.poll_tick(),
            );
            let (handle, shutdown) = scheduler.spawn();

            tokio::signal::ctrl_c().await?;
            info!("Ctrl-C received, stopping scheduler");
            shutdown.shutdown();
            handle.await?;
        }

        Command::Migrate => {
            Repository::open(&config.storage.db_path)?.run_migrations()?;
            println!("Migrations applied.");
        }

        Command::Stats { runs } => {
            let repo = open_repo(&config)?;
            let articles = repo.article_count()?;
            let topics = repo.topic_count()?;
            let sources = repo.list_sources()?;
            println!("─────────────────────────────────");
            println!("  NGX News — Database Stats");
            println!("─────────────────────────────────");
            println!("  Articles : {}", articles);
            println!("  Topics   : {}", topics);
            for s in &sources {
                println!(
                    "  {:<12} {} last run {}",
                    s.name,
                    if s.is_active { "active" } else { "paused" },
                    s.last_scraped_at.map(|d| d.to_string()).unwrap_or_else(|| "never".into())
                );
            }
            println!("─────────────────────────────────");
            for r in repo.recent_runs(runs)? {
                println!(
                    "  {} {:<12} {:<8} {:>4}/{:<4} {}",
                    r.started_at.format("%Y-%m-%d %H:%M"),
                    r.source_name,
                    r.status,
                    r.articles_scraped,
                    r.articles_found,
                    r.error_message.as_deref().unwrap_or("")
                );
            }
        }

        Command::Pause { source } => set_active(&config, &source, false)?,
        Command::Resume { source } => set_active(&config, &source, true)?,
    }

    Ok(())
}

fn open_repo(config: &AppConfig) -> Result<Arc<Repository>> {
    let repo = Repository::open(&config.storage.db_path)?;
    if config.storage.run_migrations {
        repo.run_migrations()?;
    }
    Ok(Arc::new(repo))
}

fn build_orchestrator(config: &AppConfig) -> Result<Orchestrator> {
    let repo = open_repo(config)?;
    let sessions = Arc::new(HttpSessions::new(config.scraper.clone()));
    Ok(Orchestrator::new(crate::scraper::registry(), sessions, repo))
}

fn set_active(config: &AppConfig, source: &str, active: bool) -> Result<()> {
    let Some(adapter) = crate::scraper::registry()
        .into_iter()
        .find(|a| a.name().eq_ignore_ascii_case(source))
    else {
        bail!("Unknown source {:?}", source);
    };
    open_repo(config)?.set_source_active(adapter.name(), adapter.base_url(), active)?;
    println!("{} {}.", adapter.name(), if active { "resumed" } else { "paused" });
    Ok(())
}
