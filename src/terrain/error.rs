//! Error types for DEM reading and writing.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while handling DEM rasters.
#[derive(Debug, Error)]
pub enum TerrainError {
    /// A raster file could not be opened or created.
    #[error("IO error on {path}: {source}")]
    Io {
        /// Path involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// TIFF decoding or encoding failed.
    #[error("TIFF error: {0}")]
    Tiff(#[from] tiff::TiffError),

    /// The file lacks the tags needed to place it on the globe.
    #[error("invalid GeoTIFF {path}: {reason}")]
    InvalidGeoTiff {
        /// Offending file.
        path: PathBuf,
        /// What is missing.
        reason: String,
    },

    /// The sample format is not one a DEM can use.
    #[error("unsupported TIFF data type: {0}")]
    UnsupportedDataType(String),

    /// Grid dimensions and data disagree.
    #[error("invalid grid: {0}")]
    InvalidGrid(String),
}

impl TerrainError {
    /// Creates an IO error for `path`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates an invalid GeoTIFF error for `path`.
    pub fn invalid(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::InvalidGeoTiff {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
