//! Data categories, dependency planning and execution.
//!
//! A config names the categories to fetch. [`TaskRegistry::from_config`]
//! turns each requested category into a [`DataTask`], [`TaskPlan`] orders
//! them so every prerequisite runs in an earlier stage, and [`TaskEngine`]
//! executes the stages. Every category except the AOI reads the AOI file
//! written by the AOI task, so nothing is fetched for a category until
//! the geometry it needs exists.
//!
//! # Architecture
//!
//! - [`DataTask`] - Async trait each category implements
//! - [`TaskPlan`] - Topologically ordered stages
//! - [`TaskEngine`] - Stage-by-stage, semaphore-bounded execution
//! - [`RunSummary`] - Per-task status and item counts

mod aoi;
mod engine;
mod error;
mod flowlines;
mod forcing;
mod nid;
mod nlcd;
mod plan;
mod rasters;
mod registry;
mod soil;
mod streamflow;
mod topo;

pub use engine::{RunSummary, RunVerdict, TaskEngine, TaskOutcome};
pub use error::{PlanError, TaskError};
pub use plan::TaskPlan;
pub use registry::TaskRegistry;

use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::Config;
use crate::geometry::{FeatureCollection, read_feature_collection};
use crate::layout::FilePaths;
use crate::progress::ProgressReporter;
use crate::services::{FileRequest, Services};

/// Supported dataset types, declared in run order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DataCategory {
    /// Area of interest geometry.
    Aoi,
    /// NHDPlus V2 flowlines and their attributes.
    Flowlines,
    /// Climate forcing.
    Forcing,
    /// DEM and derived rasters.
    Topo,
    /// Soil properties.
    Soil,
    /// Land cover.
    Nlcd,
    /// Dam inventory.
    Nid,
    /// Streamflow observations.
    Streamflow,
    /// User-configured remote rasters.
    RemoteRasters,
}

impl DataCategory {
    /// Every category in declaration order.
    pub const ALL: [Self; 9] = [
        Self::Aoi,
        Self::Flowlines,
        Self::Forcing,
        Self::Topo,
        Self::Soil,
        Self::Nlcd,
        Self::Nid,
        Self::Streamflow,
        Self::RemoteRasters,
    ];

    /// Config key of the category.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Aoi => "aoi",
            Self::Flowlines => "flowlines",
            Self::Forcing => "forcing",
            Self::Topo => "topo",
            Self::Soil => "soil",
            Self::Nlcd => "nlcd",
            Self::Nid => "nid",
            Self::Streamflow => "streamflow",
            Self::RemoteRasters => "remote_rasters",
        }
    }

    /// Directory the category writes into.
    #[must_use]
    pub fn output_dir(self, paths: &FilePaths) -> PathBuf {
        match self {
            Self::Aoi | Self::RemoteRasters => paths.project.clone(),
            Self::Flowlines => paths.flowlines.path().to_path_buf(),
            Self::Forcing => paths.forcing.path().to_path_buf(),
            Self::Topo => paths.topo.path().to_path_buf(),
            Self::Soil => paths.soil.path().to_path_buf(),
            Self::Nlcd => paths.nlcd.path().to_path_buf(),
            Self::Nid => paths.nid.path().to_path_buf(),
            Self::Streamflow => paths.streamflow.path().to_path_buf(),
        }
    }
}

impl fmt::Display for DataCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a task needs: the config, the output layout, the service
/// clients and the progress display.
#[derive(Debug, Clone)]
pub struct TaskContext {
    /// Validated configuration.
    pub config: Config,
    /// Output layout derived from `config`.
    pub paths: FilePaths,
    /// Service clients.
    pub services: Services,
    /// Progress display.
    pub progress: ProgressReporter,
}

impl TaskContext {
    /// Creates a context; the layout is derived from `config`.
    #[must_use]
    pub fn new(config: Config, services: Services, progress: ProgressReporter) -> Self {
        let paths = FilePaths::from_config(&config);
        Self {
            config,
            paths,
            services,
            progress,
        }
    }

    /// Reads the AOI written by the AOI task.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::AoiMissing`] when the file does not exist and
    /// [`TaskError::Geometry`] when it cannot be read.
    pub async fn load_aoi(&self) -> Result<FeatureCollection, TaskError> {
        if !self.paths.aoi.exists() {
            return Err(TaskError::AoiMissing {
                path: self.paths.aoi.clone(),
            });
        }
        Ok(read_feature_collection(&self.paths.aoi).await?)
    }
}

/// Item counts of one task run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TaskReport {
    /// Files written by this run.
    pub written: usize,
    /// Outputs already present and left untouched.
    pub cached: usize,
    /// Items for which the service had nothing.
    pub no_data: usize,
    /// Items that failed.
    pub failed: usize,
    /// Every output path of the category, present or just written.
    pub files: Vec<PathBuf>,
}

impl TaskReport {
    /// Returns true when some item failed.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }

    /// Returns true when items failed and nothing else was produced.
    #[must_use]
    pub fn all_failed(&self) -> bool {
        self.failed > 0 && self.written + self.cached + self.no_data == 0
    }

    /// Records the outcome of one per-geometry item.
    ///
    /// Errors are logged with the geometry index and counted; they do not
    /// fail the task.
    pub(crate) fn record(
        &mut self,
        category: DataCategory,
        index: usize,
        what: &str,
        result: Result<Fetched, TaskError>,
    ) {
        match result {
            Ok(Fetched::Written(path)) => {
                debug!(%category, index, path = %path.display(), "written");
                self.written += 1;
                self.files.push(path);
            }
            Ok(Fetched::NoData) => {
                warn!(%category, index, what, "no data found for AOI index {index}");
                self.no_data += 1;
            }
            Err(error) => {
                warn!(%category, index, what, error = %error, "Failed to get {what} for AOI index {index}");
                self.failed += 1;
            }
        }
    }

    /// Counts `path` as cached when it exists; returns true in that case.
    pub(crate) fn skip_existing(&mut self, path: &Path) -> bool {
        if path.exists() {
            self.cached += 1;
            self.files.push(path.to_path_buf());
            true
        } else {
            false
        }
    }
}

/// What a successful per-geometry item produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Fetched {
    /// A file was written.
    Written(PathBuf),
    /// The service had no data; nothing was written.
    NoData,
}

/// Writes `value` as JSON, creating parent directories.
pub(crate) async fn write_json(path: &Path, value: &serde_json::Value) -> Result<(), TaskError> {
    if let Some(parent) = path.parent() {
        create_dir(parent).await?;
    }
    let bytes = serde_json::to_vec(value).map_err(|e| TaskError::io(path, e.into()))?;
    tokio::fs::write(path, bytes)
        .await
        .map_err(|e| TaskError::io(path, e))
}

/// Creates a category directory.
pub(crate) async fn create_dir(path: &Path) -> Result<(), TaskError> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|e| TaskError::io(path, e))
}

/// Downloads every request of geometry `index` into `dir`, skipping files
/// that already exist.
pub(crate) async fn download_requests(
    ctx: &TaskContext,
    dir: &Path,
    category: DataCategory,
    index: usize,
    requests: Vec<FileRequest>,
    report: &mut TaskReport,
) {
    for request in requests {
        let path = dir.join(&request.file_name);
        if report.skip_existing(&path) {
            continue;
        }
        let result = ctx
            .services
            .http()
            .download_to_path(&request.url, &path)
            .await
            .map(|_| Fetched::Written(path))
            .map_err(TaskError::from);
        report.record(category, index, &request.file_name, result);
    }
}

/// Final state of a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus {
    /// Every item succeeded.
    Succeeded,
    /// The task ran but some items failed.
    Partial,
    /// The task failed as a whole.
    Failed(String),
    /// Not run because a prerequisite did not complete.
    Skipped {
        /// The prerequisite that failed or was skipped.
        prerequisite: DataCategory,
    },
}

impl TaskStatus {
    /// Returns true when dependents may run.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Partial)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded => f.write_str("succeeded"),
            Self::Partial => f.write_str("partial"),
            Self::Failed(error) => write!(f, "failed: {error}"),
            Self::Skipped { prerequisite } => write!(f, "skipped ({prerequisite} did not complete)"),
        }
    }
}

/// One data category's fetch operation.
///
/// # Object Safety
///
/// Uses `async_trait` so the registry and engine can hold
/// `Arc<dyn DataTask>`.
#[async_trait]
pub trait DataTask: Send + Sync + fmt::Debug {
    /// Category produced by the task.
    fn category(&self) -> DataCategory;

    /// Categories that must complete first. Everything but the AOI needs
    /// the AOI.
    fn depends_on(&self) -> Vec<DataCategory> {
        if self.category() == DataCategory::Aoi {
            Vec::new()
        } else {
            vec![DataCategory::Aoi]
        }
    }

    /// Progress message, e.g. `Getting forcing from Daymet`.
    fn description(&self, ctx: &TaskContext) -> String;

    /// Fetches and writes the category's outputs.
    async fn run(&self, ctx: &TaskContext) -> Result<TaskReport, TaskError>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::test_support::mock_services;

    /// A context for a project under `dir` with `extra` config appended.
    pub(crate) fn context(dir: &Path, base_url: &str, extra: &str) -> TaskContext {
        let config = Config::from_yaml_str(&format!(
            "project:\n  name: demo\n  data_dir: {}\n{extra}",
            dir.display()
        ))
        .unwrap();
        TaskContext::new(config, mock_services(base_url), ProgressReporter::hidden())
    }

    /// Writes a one-square AOI (`-105.5..-105.0`, `39.5..40.0`) to the
    /// context's AOI path.
    pub(crate) fn write_square_aoi(ctx: &TaskContext) {
        let feature = crate::geometry::Feature::new(
            crate::geometry::BBox::new(-105.5, 39.5, -105.0, 40.0).to_polygon(),
            serde_json::Map::from_iter([("gage_id".to_string(), serde_json::json!("06730500"))]),
        );
        std::fs::create_dir_all(ctx.paths.aoi.parent().unwrap()).unwrap();
        std::fs::write(
            &ctx.paths.aoi,
            serde_json::to_string(&FeatureCollection::new(vec![feature])).unwrap(),
        )
        .unwrap();
    }

    #[test]
    fn test_categories_are_declared_in_run_order() {
        let mut sorted = DataCategory::ALL;
        sorted.sort();
        assert_eq!(sorted, DataCategory::ALL);
        assert_eq!(DataCategory::RemoteRasters.to_string(), "remote_rasters");
    }

    #[tokio::test]
    async fn test_load_aoi_requires_file() {
        let dir = TempDir::new().unwrap();
        let ctx = context(dir.path(), "http://localhost:1", "aoi:\n  nhdv2_ids: [1]\n");
        assert!(matches!(ctx.load_aoi().await, Err(TaskError::AoiMissing { .. })));
        write_square_aoi(&ctx);
        assert_eq!(ctx.load_aoi().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_write_json_creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("flowlines").join("streamcat_geom_0.json");
        write_json(&path, &serde_json::json!({"comid": [1]})).await.unwrap();
        let written: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(written["comid"][0], 1);
    }

    #[test]
    fn test_report_counts() {
        let mut report = TaskReport::default();
        report.record(DataCategory::Topo, 0, "DEM", Ok(Fetched::Written(PathBuf::from("a"))));
        report.record(DataCategory::Topo, 1, "DEM", Ok(Fetched::NoData));
        report.record(
            DataCategory::Topo,
            2,
            "DEM",
            Err(TaskError::MissingColumn { column: "x".into() }),
        );
        assert_eq!((report.written, report.no_data, report.failed), (1, 1, 1));
        assert!(report.has_failures());
        assert!(!report.all_failed());
        assert_eq!(report.files, vec![PathBuf::from("a")]);
    }

    #[test]
    fn test_status_completion() {
        assert!(TaskStatus::Partial.is_complete());
        assert!(!TaskStatus::Failed("x".into()).is_complete());
        assert!(
            !TaskStatus::Skipped {
                prerequisite: DataCategory::Aoi
            }
            .is_complete()
        );
    }
}
