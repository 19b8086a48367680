mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use booker_client::{GoogleBooks, TikaExtractor};
use booker_core::provider::RateLimitedProvider;
use booker_core::traits::{Extractor, Provider};
use booker_core::writer::JsonStreamWriter;
use booker_core::{BookManager, ManagerConfig, util};

use config::Config;

#[derive(Parser)]
#[command(name = "booker", version, about = "Batch metadata enrichment for ebook files")]
struct Cli {
    /// Filepath to configuration file
    #[arg(short, long, default_value = "./booker.toml")]
    config: PathBuf,

    /// Directory path to scan
    #[arg(short, long, default_value = "./")]
    scan: String,

    /// Filepath to write JSON output to
    #[arg(short, long, default_value = "./books.json")]
    output: String,

    /// Filepath to previous JSON output to use as cache
    #[arg(long)]
    cache: Option<String>,

    /// Number of threads to use, set to 0 to automatically determine best count
    #[arg(short, long, default_value_t = 0)]
    threads: i64,

    /// Do a dry run (don't make any requests to providers)
    #[arg(long)]
    dry_run: bool,

    /// Retry failed books (must also specify --cache)
    #[arg(long)]
    retry: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if cli.retry && cli.cache.is_none() {
        bail!("--cache must be specified to retry failed files");
    }

    let config = Config::load(&cli.config)?;

    let output = util::absolutize(&cli.output).context("could not get absolute output path")?;
    if output.exists() {
        tracing::error!(path = %output.display(), "output filepath already exists, refusing to overwrite");
        return Ok(());
    }

    let writer = match JsonStreamWriter::create(&output) {
        Ok(writer) => Arc::new(writer),
        Err(err) => {
            tracing::error!(path = %output.display(), %err, "unable to open output path");
            return Ok(());
        }
    };

    let mut extractors: Vec<Arc<dyn Extractor>> = Vec::new();
    if config.tika.enable {
        extractors.push(Arc::new(TikaExtractor::new(
            &config.tika.host,
            config.tika.port,
        )?));
    }

    let mut providers: Vec<Arc<dyn Provider>> = Vec::new();
    if config.google.enable {
        let backend = GoogleBooks::new(&config.google.url, &config.google.api_key)?;
        providers.push(Arc::new(RateLimitedProvider::new(
            backend,
            config.google.milliseconds_per_request,
        )));
    }

    let manager_config = ManagerConfig {
        max_characters: config.advanced.max_characters_to_search_for_isbn,
        threads: cli.threads,
        ..Default::default()
    };
    let mut manager = BookManager::new(extractors, providers, manager_config)?;

    if let Some(cache) = &cli.cache {
        if let Err(err) = manager.import(cache, cli.retry).await {
            tracing::error!(%cache, %err, "book manager failed to import cache");
            return Ok(());
        }
    }

    manager.scan(&cli.scan, cli.dry_run, writer).await;
    manager.shutdown().await;

    Ok(())
}
