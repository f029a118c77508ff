//! Reading and writing GeoJSON files.

use std::path::Path;

use tracing::{debug, instrument};

use super::{FeatureCollection, GeometryError};

/// Reads a user AOI file.
///
/// Only `.geojson` and `.json` are accepted. Every feature must be a
/// polygon or multipolygon; single-part multipolygons are flattened.
///
/// # Errors
///
/// Returns [`GeometryError::UnsupportedFormat`] for other extensions, and
/// the errors of [`read_feature_collection`] and
/// [`FeatureCollection::require_polygons`].
#[instrument(level = "debug", skip_all, fields(path = %path.display()))]
pub async fn read_geometry_file(path: &Path) -> Result<FeatureCollection, GeometryError> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    if !matches!(extension.as_deref(), Some("geojson" | "json")) {
        return Err(GeometryError::UnsupportedFormat {
            path: path.to_path_buf(),
        });
    }

    let mut collection = read_feature_collection(path).await?;
    if collection.is_empty() {
        return Err(GeometryError::Empty {
            origin: path.display().to_string(),
        });
    }
    collection.require_polygons()?;
    collection.multi_to_single();
    debug!(features = collection.len(), "geometry file read");
    Ok(collection)
}

/// Reads any GeoJSON feature collection.
///
/// # Errors
///
/// Returns [`GeometryError::Io`] or [`GeometryError::Parse`].
pub async fn read_feature_collection(path: &Path) -> Result<FeatureCollection, GeometryError> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| GeometryError::io(path, e))?;
    serde_json::from_str(&text).map_err(|source| GeometryError::Parse {
        origin: path.display().to_string(),
        source,
    })
}

/// Writes a feature collection as GeoJSON, creating parent directories.
///
/// # Errors
///
/// Returns [`GeometryError::Io`] if the file cannot be written.
pub async fn write_feature_collection(
    collection: &FeatureCollection,
    path: &Path,
) -> Result<(), GeometryError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| GeometryError::io(parent, e))?;
    }
    let text = serde_json::to_string(collection).map_err(|source| GeometryError::Parse {
        origin: path.display().to_string(),
        source,
    })?;
    tokio::fs::write(path, text)
        .await
        .map_err(|e| GeometryError::io(path, e))
}
