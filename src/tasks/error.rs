//! Error types for planning and running data tasks.

use std::path::PathBuf;

use thiserror::Error;

use super::DataCategory;
use crate::download::DownloadError;
use crate::geometry::GeometryError;
use crate::services::ServiceError;
use crate::terrain::TerrainError;

/// Errors raised while ordering tasks.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlanError {
    /// Two tasks produce the same category.
    #[error("category {category} is registered twice")]
    Duplicate {
        /// Repeated category.
        category: DataCategory,
    },

    /// A task depends on a category nothing can produce.
    #[error("{task} depends on {prerequisite}, which no task provides")]
    UnknownPrerequisite {
        /// Dependent task.
        task: DataCategory,
        /// Missing category.
        prerequisite: DataCategory,
    },

    /// The dependency graph has a cycle.
    #[error("dependency cycle between {}", format_categories(.categories))]
    Cycle {
        /// Categories left unordered.
        categories: Vec<DataCategory>,
    },
}

fn format_categories(categories: &[DataCategory]) -> String {
    categories
        .iter()
        .map(|c| c.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Errors that fail a whole task.
///
/// Failures of a single geometry are logged and counted in the
/// [`TaskReport`](super::TaskReport) instead.
#[derive(Debug, Error)]
pub enum TaskError {
    /// A service request failed.
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// Reading or writing GeoJSON failed.
    #[error(transparent)]
    Geometry(#[from] GeometryError),

    /// Decoding or writing a raster failed.
    #[error(transparent)]
    Terrain(#[from] TerrainError),

    /// A file operation failed.
    #[error("IO error on {path}: {source}")]
    Io {
        /// Path involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The AOI file a category needs is not there.
    #[error("AOI file {path} is missing; the AOI must be fetched first")]
    AoiMissing {
        /// Expected location.
        path: PathBuf,
    },

    /// `streamflow.use_col` names an attribute the AOI does not have.
    #[error("Column {column} not found in the AOI file")]
    MissingColumn {
        /// Configured column.
        column: String,
    },

    /// The category is not configured.
    #[error("{category} is not configured")]
    NotConfigured {
        /// Category that was run.
        category: DataCategory,
    },

    /// The task panicked or was cancelled.
    #[error("{category} task aborted: {message}")]
    Aborted {
        /// Category of the task.
        category: DataCategory,
        /// Join error text.
        message: String,
    },
}

impl TaskError {
    /// Creates an IO error for `path`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<DownloadError> for TaskError {
    fn from(error: DownloadError) -> Self {
        Self::Service(ServiceError::from(error))
    }
}
