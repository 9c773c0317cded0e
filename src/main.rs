//! Lemma-Indexer main entry point
//!
//! This is the command-line interface for the Lemma-Indexer crawl-and-index backend.

use anyhow::{bail, Context};
use clap::Parser;
use lemma_indexer::config::{load_config_with_hash, Config};
use lemma_indexer::storage::open_shared;
use lemma_indexer::{IndexerError, IndexingController};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Lemma-Indexer: crawl sites and build a lemma index
///
/// Lemma-Indexer crawls the configured sites, reduces every page to lemma
/// counts and stores a page/lemma index in SQLite.
#[derive(Parser, Debug)]
#[command(name = "lemma-indexer")]
#[command(version)]
#[command(about = "Crawl sites and build a lemma index", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show what would be indexed without crawling
    #[arg(long, conflicts_with_all = ["stats", "page"])]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with_all = ["dry_run", "page"])]
    stats: bool,

    /// Fetch and re-index a single page
    #[arg(long, value_name = "URL", requires = "site_id")]
    page: Option<String>,

    /// Site the page belongs to
    #[arg(long, value_name = "ID", requires = "page")]
    site_id: Option<i64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if cli.dry_run {
        handle_dry_run(&config);
    } else if cli.stats {
        handle_stats(&config)?;
    } else if let (Some(url), Some(site_id)) = (cli.page.as_deref(), cli.site_id) {
        handle_page(config, url, site_id).await?;
    } else {
        handle_indexing(config).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("lemma_indexer=info,warn"),
            1 => EnvFilter::new("lemma_indexer=debug,info"),
            2 => EnvFilter::new("lemma_indexer=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: shows the effective configuration
fn handle_dry_run(config: &Config) {
    println!("=== Lemma-Indexer Dry Run ===\n");

    println!("Indexing:");
    println!("  Worker pool size: {}", config.indexing.pool_size);
    println!(
        "  Politeness delay: {}-{}ms",
        config.indexing.min_delay_ms, config.indexing.max_delay_ms
    );
    println!("  Max pages per site: {}", config.indexing.max_pages_per_site);
    println!("  Max depth: {}", config.indexing.max_depth);

    println!("\nFetcher:");
    println!("  User agent: {}", config.fetcher.user_agent);
    println!(
        "  Referrer: {}",
        config.fetcher.referrer.as_deref().unwrap_or("(none)")
    );
    println!("  Timeout: {}s", config.fetcher.timeout_secs);
    if config.fetcher.accept_invalid_certs {
        println!("  WARNING: TLS certificate validation disabled");
    }

    println!("\nLemmatizer:");
    println!("  Excluded tags: {}", config.lemmatizer.excluded_tags.join(", "));

    println!("\nDatabase: {}", config.storage.database_path);

    let domains = config.allowed_domains();
    println!("\nAllowed Domains ({}):", domains.len());
    for domain in &domains {
        println!("  - {}", domain);
    }

    println!("\nSites ({}):", config.sites.len());
    for site in &config.sites {
        match &site.name {
            Some(name) => println!("  - {} ({})", site.url, name),
            None => println!("  - {}", site.url),
        }
    }

    println!("\n✓ Configuration is valid");
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    use lemma_indexer::output::{load_statistics, print_statistics};
    use lemma_indexer::storage::SqliteStorage;

    println!("Database: {}\n", config.storage.database_path);

    let storage = SqliteStorage::new(Path::new(&config.storage.database_path))?;
    let stats = load_statistics(&storage)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the --page mode: re-indexes one page
async fn handle_page(config: Config, url: &str, site_id: i64) -> anyhow::Result<()> {
    let storage = open_shared(Path::new(&config.storage.database_path))?;
    let controller = IndexingController::new(config, storage)?;

    let page_id = controller.process_page(url, site_id).await?;
    println!("✓ Indexed {} as page {}", url, page_id);

    Ok(())
}

/// Handles the main indexing run, stopping it on Ctrl-C
async fn handle_indexing(config: Config) -> anyhow::Result<()> {
    if config.sites.is_empty() {
        bail!("no sites configured");
    }

    tracing::info!("Sites: {}", config.sites.len());

    let storage = open_shared(Path::new(&config.storage.database_path))?;
    let controller = IndexingController::new(config, storage)?;

    controller.start_indexing()?;

    tokio::select! {
        result = controller.wait() => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Interrupt received, stopping indexing");
            match controller.stop_indexing().await {
                Ok(()) => {}
                Err(IndexerError::Conflict(_)) => tracing::info!("Indexing had already finished"),
                Err(e) => return Err(e.into()),
            }
        }
    }

    tracing::info!("Indexing finished");
    Ok(())
}
