//! CLI commands implementation.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use console::style;

use crate::config::Config;
use crate::extract::ExtractionEngine;
use crate::ocr::{missing_tools, OcrBackend, TesseractBackend, REQUIRED_TOOLS};
use crate::repository::MysqlStore;
use crate::work_queue::FulltextWorker;

#[derive(Parser)]
#[command(name = "fulltext")]
#[command(about = "Extract searchable full text for files referenced by database rows")]
#[command(version)]
pub struct Cli {
    /// Config file (defaults to fulltext.{json,toml,yaml} in the standard locations)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Process rows until none with an empty full-text column remain (default)
    Run,

    /// Clear status placeholders so failed rows are retried, and remove the download directory
    Reset,

    /// Extract text from a local file without touching the database
    Extract {
        /// File to extract
        file: PathBuf,
    },

    /// Check that the external extraction tools are installed
    Check,
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => cmd_run(config_path).await,
        Commands::Reset => cmd_reset(config_path).await,
        Commands::Extract { file } => cmd_extract(config_path, &file).await,
        Commands::Check => cmd_check().await,
    }
}

async fn connect_worker(config: &Config) -> anyhow::Result<FulltextWorker> {
    let store = MysqlStore::connect(&config.database_url(), &config.host).await?;
    Ok(FulltextWorker::from_config(config, Arc::new(store))?)
}

async fn cmd_run(config_path: Option<&Path>) -> anyhow::Result<()> {
    let config = Config::load(config_path).await?;

    let missing = missing_tools();
    for (tool, package) in &missing {
        tracing::warn!("{} not found in PATH (install {})", tool, package);
    }

    let worker = connect_worker(&config).await?;
    let summary = worker.run().await?;

    println!(
        "{} {} processed in {} sweeps ({} text, {} empty, {} failed, {} not found)",
        style("✓").green(),
        summary.processed,
        summary.sweeps,
        summary.text,
        summary.empty,
        summary.extract_failed,
        summary.not_found
    );
    Ok(())
}

async fn cmd_reset(config_path: Option<&Path>) -> anyhow::Result<()> {
    let config = Config::load(config_path).await?;
    let worker = connect_worker(&config).await?;
    let summary = worker.reset().await?;

    println!(
        "{} Cleared {} placeholders in {} tables",
        style("✓").green(),
        summary.rows,
        summary.tables
    );
    println!(
        "  {} {}",
        style("Removed").dim(),
        worker.download_dir().display()
    );
    Ok(())
}

async fn cmd_extract(config_path: Option<&Path>, file: &Path) -> anyhow::Result<()> {
    if !file.exists() {
        anyhow::bail!("File not found: {}", file.display());
    }

    // A local extraction works without a config file.
    let engine = match Config::load(config_path).await {
        Ok(config) => ExtractionEngine::from_config(&config),
        Err(e) => {
            tracing::debug!("Using default extraction settings: {}", e);
            ExtractionEngine::new(Arc::new(TesseractBackend::default()))
        }
    };

    let path = file.to_path_buf();
    let result = tokio::task::spawn_blocking(move || engine.extract(&path)).await?;
    match result {
        Ok(text) => {
            println!("{}", text);
            Ok(())
        }
        Err(e) => {
            eprintln!("{} {}", style("✗").red(), e);
            Err(e.into())
        }
    }
}

async fn cmd_check() -> anyhow::Result<()> {
    println!("\n{}", style("Extraction Tool Status").bold());
    println!("{}", "-".repeat(50));

    let missing = missing_tools();
    for (tool, package) in REQUIRED_TOOLS {
        let status = if missing.iter().any(|(m, _)| m == tool) {
            style(format!("✗ not found (install {})", package)).red()
        } else {
            style("✓ found".to_string()).green()
        };
        println!("  {:<15} {}", tool, status);
    }

    let tesseract = TesseractBackend::default();
    if !tesseract.is_available() {
        println!("\n  {}", style(tesseract.availability_hint()).dim());
    }

    if missing.is_empty() {
        println!("\n{} All tools available", style("✓").green());
        Ok(())
    } else {
        anyhow::bail!("{} required tools missing", missing.len())
    }
}
