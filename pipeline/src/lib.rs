use database::PostRepository;
use etl_core::{
    ArtifactError, CleanedDataset, CoreError, DocumentSet, ErrorExt, LoadReport, Sector,
    SectorState,
};
use futures::future::join_all;
use reddit_client::PostSource;
use std::fmt;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};
use transform::{transform, ArtifactWriter, TextCleaner, TransformOutcome};
use uuid::Uuid;

pub mod state;

#[cfg(test)]
mod tests;

pub use state::SectorStateMachine;

pub const PIPELINE_ID: &str = "etl_pipeline_multiple_sectors";
pub const PIPELINE_TAGS: [&str; 3] = ["reddit", "etl", "multiple_sectors"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Extract,
    CreateTable,
    Transform,
    Load,
}

impl Stage {
    pub const ALL: [Stage; 4] = [Stage::Extract, Stage::CreateTable, Stage::Transform, Stage::Load];

    pub fn task_id(self, sector: &Sector) -> String {
        let prefix = match self {
            Stage::Extract => "extract_data",
            Stage::CreateTable => "create_table",
            Stage::Transform => "process_data",
            Stage::Load => "insert_data",
        };
        format!("{}_{}", prefix, sector)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Extract => "extract",
            Stage::CreateTable => "create_table",
            Stage::Transform => "transform",
            Stage::Load => "load",
        };
        f.write_str(name)
    }
}

/// Static description of the job. There is no schedule; every run is
/// triggered by hand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineDefinition {
    pub id: &'static str,
    pub tags: Vec<&'static str>,
    pub sectors: Vec<Sector>,
}

impl PipelineDefinition {
    pub fn new(sectors: Vec<Sector>) -> Self {
        Self {
            id: PIPELINE_ID,
            tags: PIPELINE_TAGS.to_vec(),
            sectors,
        }
    }

    /// Task ids per sector, in execution order.
    pub fn task_ids(&self) -> Vec<String> {
        self.sectors
            .iter()
            .flat_map(|sector| Stage::ALL.iter().map(move |stage| stage.task_id(sector)))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SectorOutcome {
    Loaded(LoadReport),
    /// Nothing to transform; the load stage was a no-op.
    Skipped,
    LoadFailed { reason: String },
    Aborted { stage: Stage, error: String },
}

impl SectorOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            SectorOutcome::LoadFailed { .. } | SectorOutcome::Aborted { .. }
        )
    }
}

#[derive(Debug, Clone)]
pub struct SectorReport {
    pub sector: Sector,
    pub outcome: SectorOutcome,
    pub final_state: SectorState,
    pub artifact: Option<PathBuf>,
    pub elapsed: Duration,
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub reports: Vec<SectorReport>,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        !self.reports.iter().any(|report| report.outcome.is_failure())
    }

    pub fn failed_sectors(&self) -> Vec<String> {
        self.reports
            .iter()
            .filter(|report| report.outcome.is_failure())
            .map(|report| report.sector.to_string())
            .collect()
    }

    pub fn total_loaded(&self) -> LoadReport {
        self.reports
            .iter()
            .fold(LoadReport::default(), |total, report| match &report.outcome {
                SectorOutcome::Loaded(loaded) => LoadReport {
                    inserted: total.inserted + loaded.inserted,
                    skipped: total.skipped + loaded.skipped,
                },
                _ => total,
            })
    }

    /// `Err(PipelineFailed)` naming every failed sector, if any.
    pub fn into_result(self) -> Result<Self, CoreError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(CoreError::PipelineFailed {
                failed_sectors: self.failed_sectors(),
            })
        }
    }
}

pub struct SectorPipeline<S, R> {
    source: S,
    repository: R,
    cleaner: TextCleaner,
    artifacts: ArtifactWriter,
    search_limit: u32,
}

impl<S: PostSource, R: PostRepository> SectorPipeline<S, R> {
    pub fn new(source: S, repository: R, artifacts: ArtifactWriter, search_limit: u32) -> Self {
        Self {
            source,
            repository,
            cleaner: TextCleaner::standard(),
            artifacts,
            search_limit,
        }
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    /// Runs every sector concurrently. A failing sector never stops the others.
    pub async fn run_all(&self, sectors: &[Sector]) -> RunSummary {
        let run_id = Uuid::new_v4();
        let started = Instant::now();
        info!("Starting run {} of {} for {} sectors", run_id, PIPELINE_ID, sectors.len());

        let reports = join_all(sectors.iter().map(|sector| self.run_sector(sector))).await;
        let summary = RunSummary {
            run_id,
            reports,
            elapsed: started.elapsed(),
        };

        let totals = summary.total_loaded();
        if summary.is_success() {
            info!(
                "Run {} finished in {:?}: {} posts inserted, {} skipped",
                run_id, summary.elapsed, totals.inserted, totals.skipped
            );
        } else {
            error!(
                "Run {} finished with failed sectors: {}",
                run_id,
                summary.failed_sectors().join(", ")
            );
        }
        summary
    }

    pub async fn run_sector(&self, sector: &Sector) -> SectorReport {
        let started = Instant::now();
        let mut machine = SectorStateMachine::new(sector.clone());
        let mut artifact = None;

        let outcome = match self.run_stages(&mut machine, &mut artifact).await {
            Ok(outcome) => outcome,
            Err((stage, e)) => {
                e.log_error();
                error!("Sector {} aborted during {}: {}", sector, stage, e);
                SectorOutcome::Aborted {
                    stage,
                    error: e.to_string(),
                }
            }
        };

        SectorReport {
            sector: sector.clone(),
            outcome,
            final_state: machine.state(),
            artifact,
            elapsed: started.elapsed(),
        }
    }

    /// CSV writing is blocking file I/O, so it runs off the async workers.
    async fn write_artifact(&self, dataset: &CleanedDataset) -> Result<PathBuf, CoreError> {
        let writer = self.artifacts.clone();
        let path = writer.path_for(&dataset.sector);
        let dataset = dataset.clone();

        tokio::task::spawn_blocking(move || writer.write(&dataset))
            .await
            .map_err(|e| {
                CoreError::Artifact(ArtifactError::WriteFailed {
                    path: path.display().to_string(),
                    reason: format!("Task join error: {}", e),
                })
            })?
    }

    async fn run_stages(
        &self,
        machine: &mut SectorStateMachine,
        artifact: &mut Option<PathBuf>,
    ) -> Result<SectorOutcome, (Stage, CoreError)> {
        let sector = machine.sector().clone();
        let at = |stage: Stage| move |e: CoreError| (stage, e);

        let posts = self
            .source
            .fetch_posts_with_comments(&sector, self.search_limit)
            .await
            .map_err(at(Stage::Extract))?;
        let documents = DocumentSet::new(sector.clone(), posts);
        machine
            .advance(SectorState::Extracted)
            .map_err(at(Stage::Extract))?;

        self.repository
            .ensure_schema(&sector)
            .await
            .map_err(at(Stage::CreateTable))?;
        machine
            .advance(SectorState::SchemaReady)
            .map_err(at(Stage::CreateTable))?;

        let transformed = transform(&documents, &self.cleaner);
        if let TransformOutcome::Cleaned(dataset) = &transformed {
            *artifact = Some(self.write_artifact(dataset).await.map_err(at(Stage::Transform))?);
        }
        machine
            .advance(SectorState::Transformed)
            .map_err(at(Stage::Transform))?;

        let outcome = match transformed {
            TransformOutcome::Skipped(reason) => {
                warn!("Sector {}: nothing to load ({})", sector, reason);
                SectorOutcome::Skipped
            }
            TransformOutcome::Cleaned(dataset) => {
                match self.repository.upsert_posts(&dataset).await {
                    Ok(report) => SectorOutcome::Loaded(report),
                    Err(e) => {
                        e.log_error();
                        error!("Sector {}: load failed, nothing committed: {}", sector, e);
                        return Ok(SectorOutcome::LoadFailed {
                            reason: e.to_string(),
                        });
                    }
                }
            }
        };

        machine
            .advance(SectorState::Loaded)
            .map_err(at(Stage::Load))?;
        Ok(outcome)
    }
}
