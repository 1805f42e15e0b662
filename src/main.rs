//! StorePulse - App Store review intelligence tool
//!
//! Aggregates listings, reviews, and screenshots for a search keyword,
//! mines them for personas and insider language, and synthesizes cached
//! competitive analyses with an LLM.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::time::Duration;
use storepulse::catalog::{
    AppStoreCatalog, MetadataScraper, ReviewsClient, ScreenshotsClient, SearchClient,
};
use storepulse::cli::{self, Cli, Commands, OutputFormat};
use storepulse::config::Config;
use storepulse::llm::OpenRouterClient;
use storepulse::storage::Database;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Cli::parse_args();

    // Setup logging
    let filter = if args.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let config = Config::load_or_default(Path::new(&args.config))?;

    let db_path = match &args.db {
        Some(path) => PathBuf::from(path),
        None => default_db_path()?,
    };
    let db = Database::open(&db_path)?;

    let timeout = Duration::from_secs(config.pacing.http_timeout_secs);

    match args.command {
        Commands::Analyze(cmd) => {
            // LLM credential is a pre-flight condition, checked before any work
            let api_key = Config::require_api_key()?;
            let llm = OpenRouterClient::new(&config.llm.endpoint, &api_key, config.llm.max_retries);

            let catalog = AppStoreCatalog::new(
                SearchClient::new(timeout)?,
                ReviewsClient::new(
                    timeout,
                    Duration::from_millis(config.pacing.page_delay_ms),
                )?,
            );

            let opts = cli::AnalyzeOptions {
                keyword: cmd.keyword,
                limit: cmd.limit,
                country: cmd.country.unwrap_or_else(|| config.country.clone()),
                model: cmd
                    .model
                    .unwrap_or_else(|| config.llm.analysis_model.clone()),
                force: cmd.force,
                low_only: cmd.low_only,
            };

            let analysis = cli::analyze(&db, &catalog, &llm, &config, &opts).await?;

            match args.format {
                OutputFormat::Json => cli::print_analysis_json(&analysis)?,
                OutputFormat::Text => cli::print_analysis_text(&analysis),
            }
        }

        Commands::Screenshots(cmd) => {
            let api_key = Config::require_api_key()?;
            let llm = OpenRouterClient::new(&config.llm.endpoint, &api_key, config.llm.max_retries);

            let catalog = AppStoreCatalog::new(
                SearchClient::new(timeout)?,
                ReviewsClient::new(
                    timeout,
                    Duration::from_millis(config.pacing.page_delay_ms),
                )?,
            );
            let client = ScreenshotsClient::new(timeout)?;

            let country = cmd.country.unwrap_or_else(|| config.country.clone());
            cli::screenshots(
                &db,
                &catalog,
                &llm,
                &client,
                &config,
                &cmd.keyword,
                cmd.limit,
                &country,
                cmd.force,
            )
            .await?;
        }

        Commands::Aso(cmd) => {
            let api_key = Config::require_api_key()?;
            let llm = OpenRouterClient::new(&config.llm.endpoint, &api_key, config.llm.max_retries);

            let mut scraper = MetadataScraper::new(
                &config.country,
                timeout,
                Duration::from_millis(config.pacing.scrape_delay_ms),
                config.pacing.scrape_retries,
            )?;

            cli::aso(
                &db,
                &llm,
                &mut scraper,
                &config,
                &cmd.keyword,
                &cmd.app_id,
                cmd.force,
            )
            .await?;
        }

        Commands::Keywords(cmd) => {
            let api_key = Config::require_api_key()?;
            let llm = OpenRouterClient::new(&config.llm.endpoint, &api_key, config.llm.max_retries);

            let mut scraper = MetadataScraper::new(
                &config.country,
                timeout,
                Duration::from_millis(config.pacing.scrape_delay_ms),
                config.pacing.scrape_retries,
            )?;

            cli::keywords(&db, &llm, &mut scraper, &config, &cmd.keyword).await?;
        }

        Commands::History(cmd) => {
            cli::history(&db, &cmd.keyword)?;
        }

        Commands::Show(cmd) => {
            cli::show(&db, cmd.id, args.format)?;
        }

        Commands::Apps(cmd) => {
            cli::apps(&db, &cmd.keyword)?;
        }
    }

    Ok(())
}

/// Database location when no --db flag is given
fn default_db_path() -> Result<PathBuf> {
    let dir = dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("storepulse");
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create data directory {:?}", dir))?;
    Ok(dir.join("storepulse.db"))
}
