use clap::Parser;
use database::PgPostRepository;
use etl_core::{CoreError, ErrorReporter, EtlConfig, Sector};
use pipeline::{PipelineDefinition, SectorOutcome, SectorPipeline};
use reddit_client::{RateLimitConfig, RateLimiter, RedditExtractor};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use transform::ArtifactWriter;

const DEFAULT_LOG_FILTER: &str =
    "sector_etl=info,pipeline=info,reddit_client=info,database=info,transform=info";

/// Pull Reddit posts per sector, clean their comments and load them into PostgreSQL.
#[derive(Debug, Parser)]
#[command(name = "sector-etl", version)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Only run these sectors; repeatable
    #[arg(long = "sector", value_name = "NAME")]
    sectors: Vec<String>,

    /// Print the pipeline definition and exit
    #[arg(long)]
    list: bool,
}

#[tokio::main]
async fn main() -> Result<(), CoreError> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    run(cli).await.map_err(|e| {
        ErrorReporter::default().report_error(&e);
        e
    })
}

async fn run(cli: Cli) -> Result<(), CoreError> {
    let config = EtlConfig::load(cli.config.as_deref())?;
    let sectors = select_sectors(&config, &cli.sectors)?;
    let definition = PipelineDefinition::new(sectors);

    if cli.list {
        println!("{}", definition.id);
        println!("tags: {}", definition.tags.join(", "));
        println!(
            "sectors: {}",
            definition
                .sectors
                .iter()
                .map(Sector::as_str)
                .collect::<Vec<_>>()
                .join(", ")
        );
        for task_id in definition.task_ids() {
            println!("  {}", task_id);
        }
        return Ok(());
    }

    tracing::info!(
        "Starting {} for sectors: {}",
        definition.id,
        definition
            .sectors
            .iter()
            .map(Sector::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    );

    let rate_limiter = Arc::new(RateLimiter::new(RateLimitConfig::reddit_oauth()));
    let extractor = RedditExtractor::new(config.reddit.clone(), rate_limiter);
    let repository = PgPostRepository::new(&config.database);
    let artifacts = ArtifactWriter::new(config.artifacts.dir.clone());

    let pipeline = SectorPipeline::new(extractor, repository, artifacts, config.reddit.search_limit);
    let summary = pipeline.run_all(&definition.sectors).await;

    for report in &summary.reports {
        match &report.outcome {
            SectorOutcome::Loaded(loaded) => tracing::info!(
                "{}: {} inserted, {} already present ({:?})",
                report.sector,
                loaded.inserted,
                loaded.skipped,
                report.elapsed
            ),
            SectorOutcome::Skipped => tracing::info!("{}: nothing to load", report.sector),
            SectorOutcome::LoadFailed { reason } => {
                tracing::error!("{}: load failed: {}", report.sector, reason)
            }
            SectorOutcome::Aborted { stage, error } => {
                tracing::error!("{}: aborted in {}: {}", report.sector, stage, error)
            }
        }
    }

    summary.into_result().map(|_| ())
}

/// Restricts the configured sectors to those named on the command line.
/// A sector named twice runs once.
fn select_sectors(config: &EtlConfig, requested: &[String]) -> Result<Vec<Sector>, CoreError> {
    if requested.is_empty() {
        return Ok(config.sectors.clone());
    }

    let mut selected: Vec<Sector> = Vec::with_capacity(requested.len());
    for name in requested {
        let sector = config
            .sectors
            .iter()
            .find(|sector| sector.as_str() == name)
            .ok_or_else(|| CoreError::InvalidInput {
                message: format!("sector '{}' is not configured", name),
            })?;
        if !selected.contains(sector) {
            selected.push(sector.clone());
        }
    }
    Ok(selected)
}
