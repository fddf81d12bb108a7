use etl_core::{ArtifactError, CleanedDataset, CoreError, Sector};
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info};

/// Writes the per-sector CSV of cleaned comment rows.
#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    dir: PathBuf,
}

impl ArtifactWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, sector: &Sector) -> PathBuf {
        self.dir.join(format!("cleaned_comments_{}.csv", sector))
    }

    /// Replaces any previous artifact for the sector. Returns the file path.
    pub fn write(&self, dataset: &CleanedDataset) -> Result<PathBuf, CoreError> {
        let path = self.path_for(&dataset.sector);
        let write_failed = |reason: String| ArtifactError::WriteFailed {
            path: path.display().to_string(),
            reason,
        };

        fs::create_dir_all(&self.dir).map_err(|e| write_failed(e.to_string()))?;

        let mut writer = csv::Writer::from_path(&path).map_err(ArtifactError::from)?;
        let mut rows = 0usize;
        for row in dataset.rows() {
            writer.serialize(&row).map_err(ArtifactError::from)?;
            rows += 1;
        }
        writer.flush().map_err(|e| write_failed(e.to_string()))?;

        debug!("Flushed {} rows to {}", rows, path.display());
        info!(
            "Wrote {} cleaned comments for sector {} to {}",
            rows,
            dataset.sector,
            path.display()
        );
        Ok(path)
    }
}
