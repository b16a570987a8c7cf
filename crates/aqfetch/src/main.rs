use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use aqfetch_bucket::{BucketStore, MemoryBucketStore, S3BucketStore};
use aqfetch_core::config::{Config, Sources};
use aqfetch_core::measurand::CANONICAL_PARAMETERS;
use aqfetch_core::processor::{ProcessorRegistry, RunContext};
use aqfetch_core::storage::Storage;
use clap::{Args, Parser, Subcommand};
use comfy_table::{presets::UTF8_FULL, Table};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Air quality provider ingestion", long_about = None)]
struct Cli {
    /// Sources file (defaults to AQFETCH_SOURCES, then ./sources.toml)
    #[arg(long, global = true)]
    sources: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch, normalize and store one configured source
    Run(RunArgs),
    /// List configured sources
    Sources,
    /// Print the canonical parameter table
    Measurands,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Name of the `[[source]]` entry to run
    #[arg(long)]
    source: String,

    /// Log writes instead of performing them
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run(args) => run(cli.sources, args).await,
        Command::Sources => {
            let path = sources_path(cli.sources);
            let sources = Sources::load(&path)?;
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_header(vec!["name", "provider", "parameters", "measurement files"]);
            for source in &sources.sources {
                table.add_row(vec![
                    source.name.clone(),
                    source.provider.clone(),
                    source.parameters.len().to_string(),
                    source.files.measurements.len().to_string(),
                ]);
            }
            println!("{table}");
            Ok(())
        }
        Command::Measurands => {
            let mut table = Table::new();
            table.load_preset(UTF8_FULL).set_header(vec!["parameter", "unit"]);
            for (parameter, unit) in CANONICAL_PARAMETERS {
                table.add_row(vec![*parameter, *unit]);
            }
            println!("{table}");
            Ok(())
        }
    }
}

async fn run(sources_override: Option<PathBuf>, args: RunArgs) -> Result<()> {
    let config = Config::from_lookup(|name| {
        if args.dry_run && name == "AQFETCH_DRYRUN" {
            Some("true".to_string())
        } else {
            std::env::var(name).ok()
        }
    })
    .context("invalid configuration")?;
    let path = sources_override.unwrap_or_else(|| config.sources_path.clone());
    let sources = Sources::load(&path)?;
    let source = sources.find(&args.source)?;

    let bucket: Arc<dyn BucketStore> = match config.s3_config() {
        Some(s3) => Arc::new(
            S3BucketStore::new(s3)
                .await
                .context("failed to initialize bucket client")?,
        ),
        None => {
            warn!("no bucket configured, using an in-memory store");
            Arc::new(MemoryBucketStore::new())
        }
    };

    let storage = Storage::new(bucket.clone(), config.stack.clone()).with_dry_run(config.dry_run);
    let mut ctx = RunContext::new(storage)
        .with_bucket(bucket)
        .with_max_concurrency(config.max_concurrency);
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        ctx = ctx.with_base_dir(dir);
    }

    info!(source = %source.name, dry_run = config.dry_run, "running source");
    let summary = ProcessorRegistry::with_defaults().run(&ctx, source).await?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn sources_path(cli_override: Option<PathBuf>) -> PathBuf {
    cli_override
        .or_else(|| std::env::var_os("AQFETCH_SOURCES").map(PathBuf::from))
        .unwrap_or_else(|| Path::new("sources.toml").to_path_buf())
}
