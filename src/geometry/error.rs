//! Error types for geometry reading and checks.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while reading, checking or writing geometries.
#[derive(Debug, Error)]
pub enum GeometryError {
    /// The geometry file extension is not supported.
    #[error(
        "unsupported geometry file {path}: expected a .geojson or .json file (convert other formats to GeoJSON first)"
    )]
    UnsupportedFormat {
        /// Offending path.
        path: PathBuf,
    },

    /// A file could not be read or written.
    #[error("IO error on {path}: {source}")]
    Io {
        /// Path involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A document is not valid GeoJSON for the supported geometry types.
    #[error("invalid GeoJSON in {origin}: {source}")]
    Parse {
        /// File path or `service response`.
        origin: String,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },

    /// A feature that must be a polygon is not.
    #[error("Geometry file must contain polygons or multipolygons; feature {index} is {found}")]
    NotPolygonal {
        /// Feature index.
        index: usize,
        /// GeoJSON type that was found.
        found: &'static str,
    },

    /// A collection that must contain features is empty.
    #[error("no features in {origin}")]
    Empty {
        /// File path or service description.
        origin: String,
    },

    /// A feature has no geometry to derive a request area from.
    #[error("feature {index} has no geometry")]
    MissingGeometry {
        /// Feature index.
        index: usize,
    },
}

impl GeometryError {
    /// Creates an IO error for `path`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
