//! Catalog-Harvest main entry point
//!
//! This is the command-line interface for the catalog harvester.

use anyhow::{bail, Context};
use catalog_harvest::config::{load_config_with_hash, Config};
use catalog_harvest::harvest::{follow_events, HarvestEvent, HarvestOptions, Orchestrator};
use catalog_harvest::output::{
    default_export_path, export_session, import_session, load_session_report, load_statistics,
    print_run_summary, print_statistics, read_export, write_export, write_markdown_report,
    ExportFormat,
};
use catalog_harvest::query::QueryService;
use catalog_harvest::storage::{get_schema_version, open_storage, SqliteStorage, Storage};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Catalog-Harvest: a category and product harvester for retail catalogs
///
/// Walks the site's category tree, tells navigation pages from product
/// listings, extracts products from listings and stores everything in SQLite.
#[derive(Parser, Debug)]
#[command(name = "catalog-harvest")]
#[command(version)]
#[command(about = "A retail catalog harvester", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(short, long, value_name = "CONFIG", default_value = "harvest.toml")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the database and its schema
    Init,

    /// Run a harvest session
    Scrape {
        /// Maximum number of categories to visit
        #[arg(long)]
        limit: Option<usize>,

        /// Only visit the subtrees of these categories
        #[arg(long, num_args = 1..)]
        categories: Vec<String>,

        /// Run without the generative backend
        #[arg(long)]
        no_ai: bool,

        /// Fetch the sitemap even when a fresh cached copy exists
        #[arg(long)]
        refresh_sitemap: bool,
    },

    /// List recent sessions
    Sessions {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Export a session (the latest one by default)
    Export {
        session: Option<String>,

        #[arg(long, value_enum, default_value_t = FormatArg::Json)]
        format: FormatArg,

        /// Output file; defaults to the configured export directory
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Import an exported JSON document as a new session
    Import { file: PathBuf },

    /// Search products by name, brand or description
    Search {
        term: String,

        #[arg(long)]
        session: Option<String>,

        #[arg(long)]
        limit: Option<usize>,
    },

    /// Delete sessions older than the retention window
    Cleanup {
        #[arg(long, default_value_t = 30)]
        keep_days: u32,
    },

    /// List the categories of a session (the latest one by default)
    Categories {
        #[arg(long)]
        session: Option<String>,

        /// Show the category tree instead of a flat list
        #[arg(long)]
        hierarchy: bool,
    },

    /// Show database statistics
    Stats,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum FormatArg {
    Json,
    Markdown,
}

impl From<FormatArg> for ExportFormat {
    fn from(format: FormatArg) -> Self {
        match format {
            FormatArg::Json => ExportFormat::Json,
            FormatArg::Markdown => ExportFormat::Markdown,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            (cfg, hash)
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    match cli.command {
        Command::Init => handle_init(&config),
        Command::Scrape {
            limit,
            categories,
            no_ai,
            refresh_sitemap,
        } => {
            let options = HarvestOptions {
                limit: limit.or(config.scraper.max_categories),
                categories,
                refresh_sitemap,
            };
            handle_scrape(&config, &config_hash, options, !no_ai).await
        }
        Command::Sessions { limit } => handle_sessions(&config, limit),
        Command::Export {
            session,
            format,
            output,
        } => handle_export(&config, session, format.into(), output),
        Command::Import { file } => handle_import(&config, &file),
        Command::Search {
            term,
            session,
            limit,
        } => handle_search(&config, &term, session.as_deref(), limit),
        Command::Cleanup { keep_days } => handle_cleanup(&config, keep_days),
        Command::Categories { session, hierarchy } => handle_categories(&config, session, hierarchy),
        Command::Stats => handle_stats(&config),
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("catalog_harvest=info,warn"),
            1 => EnvFilter::new("catalog_harvest=debug,info"),
            2 => EnvFilter::new("catalog_harvest=trace,debug"),
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

fn open(config: &Config) -> anyhow::Result<SqliteStorage> {
    let path = Path::new(&config.output.database_path);
    open_storage(path).with_context(|| format!("Failed to open database {}", path.display()))
}

/// Explicit session id, or the most recent session
fn resolve_session(storage: &SqliteStorage, session: Option<String>) -> anyhow::Result<String> {
    if let Some(session) = session {
        return Ok(session);
    }
    match QueryService::new(storage).sessions(Some(1))?.into_iter().next() {
        Some(latest) => Ok(latest.session_id),
        None => bail!("No sessions in the database"),
    }
}

fn handle_init(config: &Config) -> anyhow::Result<()> {
    open(config)?;
    println!("✓ Database ready: {}", config.output.database_path);
    println!("  Schema version: {}", get_schema_version());
    Ok(())
}

/// Handles the main harvest operation
async fn handle_scrape(
    config: &Config,
    config_hash: &str,
    options: HarvestOptions,
    ai_enabled: bool,
) -> anyhow::Result<()> {
    let storage = open(config)?;
    let orchestrator =
        Orchestrator::from_config(config, storage, ai_enabled)?.with_config_hash(config_hash);

    tracing::info!(
        "Starting harvest of {} (AI: {}, limit: {:?}, filter: {:?})",
        config.site.base_url,
        if orchestrator.ai_enabled() { "on" } else { "off" },
        options.limit,
        options.categories
    );

    let events = orchestrator.subscribe();
    let progress = tokio::spawn(follow_events(events, |event| match event {
        HarvestEvent::NodeStarted {
            index,
            scheduled,
            name,
            ..
        } => println!("[{}/{}] {}", index + 1, scheduled, name),
        HarvestEvent::EntitiesExtracted {
            strategy,
            entities,
            fallback,
            ..
        } => println!(
            "      {} entities ({}{})",
            entities,
            strategy,
            if *fallback { ", fallback" } else { "" }
        ),
        HarvestEvent::NodeFailed { stage, error, .. } => {
            println!("      failed at {}: {}", stage, error)
        }
        _ => {}
    }));

    let result = orchestrator.run_session(&options).await;
    drop(orchestrator);
    let _ = progress.await;

    match result {
        Ok(summary) => {
            print_run_summary(&summary);
            Ok(())
        }
        Err(e) => {
            tracing::error!("Harvest failed: {}", e);
            Err(e.into())
        }
    }
}

fn handle_sessions(config: &Config, limit: usize) -> anyhow::Result<()> {
    let storage = open(config)?;
    let sessions = QueryService::new(&storage).sessions(Some(limit))?;

    if sessions.is_empty() {
        println!("No sessions recorded yet");
        return Ok(());
    }

    println!("=== Recent Sessions ===\n");
    for session in sessions {
        println!(
            "{}  {:<9}  started {}  {} categories, {} products",
            session.session_id,
            session.status.to_string(),
            session.start_time,
            session.total_categories,
            session.total_products
        );
    }
    Ok(())
}

fn handle_export(
    config: &Config,
    session: Option<String>,
    format: ExportFormat,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let storage = open(config)?;
    let session_id = resolve_session(&storage, session)?;
    let path = output.unwrap_or_else(|| {
        default_export_path(
            Path::new(&config.output.export_dir),
            &session_id,
            format,
            Utc::now(),
        )
    });

    match format {
        ExportFormat::Json => write_export(&export_session(&storage, &session_id)?, &path)?,
        ExportFormat::Markdown => {
            write_markdown_report(&load_session_report(&storage, &session_id)?, &path)?
        }
    }

    println!("✓ Exported session {} to: {}", session_id, path.display());
    Ok(())
}

fn handle_import(config: &Config, file: &Path) -> anyhow::Result<()> {
    let doc = read_export(file).with_context(|| format!("Failed to read {}", file.display()))?;
    let mut storage = open(config)?;
    let session_id = import_session(&mut storage, &doc, Utc::now())?;

    println!(
        "✓ Imported {} categories and {} products as session {}",
        doc.categories.len(),
        doc.products.len(),
        session_id
    );
    Ok(())
}

fn handle_search(
    config: &Config,
    term: &str,
    session: Option<&str>,
    limit: Option<usize>,
) -> anyhow::Result<()> {
    let storage = open(config)?;
    let products = QueryService::new(&storage).search(term, session, limit)?;

    println!("Found {} products matching '{}'\n", products.len(), term);
    for product in products {
        println!(
            "  {}  {}{}",
            product.name,
            product.price.as_deref().unwrap_or("-"),
            product
                .brand
                .as_deref()
                .map(|b| format!("  [{}]", b))
                .unwrap_or_default()
        );
        if let Some(url) = &product.product_url {
            println!("      {}", url);
        }
    }
    Ok(())
}

fn handle_cleanup(config: &Config, keep_days: u32) -> anyhow::Result<()> {
    let mut storage = open(config)?;
    let deleted = storage.purge_sessions_older_than(keep_days, Utc::now())?;
    println!(
        "✓ Removed {} sessions older than {} days",
        deleted, keep_days
    );
    Ok(())
}

fn handle_categories(
    config: &Config,
    session: Option<String>,
    hierarchy: bool,
) -> anyhow::Result<()> {
    let storage = open(config)?;
    let session_id = resolve_session(&storage, session)?;
    let query = QueryService::new(&storage);

    println!("=== Categories of {} ===\n", session_id);
    if hierarchy {
        for row in query.hierarchy(&session_id)? {
            println!(
                "{}{} [{}] ({} products)",
                "  ".repeat(row.level as usize),
                row.name,
                row.category_type,
                row.product_count
            );
        }
    } else {
        for category in query.categories(Some(&session_id))? {
            println!(
                "{:>6}  {:<20}  {}  {}",
                category.id,
                category.category_type.to_string(),
                category.name,
                category.url
            );
        }
    }
    Ok(())
}

/// Handles the stats command: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.output.database_path);
    let storage = open(config)?;
    let stats = load_statistics(&storage)?;
    print_statistics(&stats);
    Ok(())
}
