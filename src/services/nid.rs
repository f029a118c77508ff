//! National Inventory of Dams.

use std::path::Path;

use tracing::{info, instrument};

use super::{ServiceError, build_url};
use crate::download::HttpClient;
use crate::geometry::{BBox, FeatureCollection};

const SERVICE: &str = "NID";

/// NID client: the national GeoPackage and the feature service.
#[derive(Debug, Clone, Copy)]
pub struct NidClient<'a> {
    http: &'a HttpClient,
    inventory: &'a str,
    features: &'a str,
}

impl<'a> NidClient<'a> {
    /// Creates a client.
    #[must_use]
    pub fn new(http: &'a HttpClient, inventory: &'a str, features: &'a str) -> Self {
        Self {
            http,
            inventory,
            features,
        }
    }

    /// Downloads the full national inventory to `dest` unless it exists.
    ///
    /// Returns the bytes written, or `None` when the file was already
    /// there.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Download`] if the download fails.
    #[instrument(level = "debug", skip(self), fields(dest = %dest.display()))]
    pub async fn stage_inventory(&self, dest: &Path) -> Result<Option<u64>, ServiceError> {
        if dest.exists() {
            return Ok(None);
        }
        let bytes = self.http.download_to_path(self.inventory, dest).await?;
        info!(bytes, "national dam inventory staged");
        Ok(Some(bytes))
    }

    /// URL of the dams whose location falls in `bbox`.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::InvalidRequest`] for a bad base URL.
    pub fn dams_in_box_url(&self, bbox: &BBox) -> Result<String, ServiceError> {
        build_url(
            SERVICE,
            self.features,
            &["query"],
            &[
                ("geometry", bbox.to_query()),
                ("geometryType", "esriGeometryEnvelope".to_string()),
                ("inSR", "4326".to_string()),
                ("outSR", "4326".to_string()),
                ("spatialRel", "esriSpatialRelIntersects".to_string()),
                ("outFields", "*".to_string()),
                ("returnGeometry", "true".to_string()),
                ("f", "geojson".to_string()),
            ],
        )
    }

    /// Dams in `bbox` as GeoJSON points.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] if the request fails or is not GeoJSON.
    pub async fn dams_in_box(&self, bbox: &BBox) -> Result<FeatureCollection, ServiceError> {
        let url = self.dams_in_box_url(bbox)?;
        Ok(FeatureCollection::from_value(self.http.get_json(&url).await?)?)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, ResponseTemplate};

    use super::*;
    use crate::test_support::mock_services;
    use crate::test_support::socket_guard::start_mock_server_or_skip;

    #[tokio::test]
    async fn test_stage_inventory_downloads_once() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/nid/gpkg"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/geopackage+sqlite3")
                    .set_body_bytes(b"SQLite format 3\0".to_vec()),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("full_nid_inventory.gpkg");
        let services = mock_services(&mock_server.uri());

        assert_eq!(services.nid().stage_inventory(&dest).await.unwrap(), Some(16));
        assert_eq!(services.nid().stage_inventory(&dest).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_dams_in_box_reads_points() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/nid/features/query"))
            .and(query_param("geometryType", "esriGeometryEnvelope"))
            .and(query_param("f", "geojson"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "type": "FeatureCollection",
                "features": [{
                    "type": "Feature",
                    "properties": {"federalId": "CO01234", "name": "Barker"},
                    "geometry": {"type": "Point", "coordinates": [-105.48, 39.96]}
                }]
            })))
            .mount(&mock_server)
            .await;

        let services = mock_services(&mock_server.uri());
        let dams = services
            .nid()
            .dams_in_box(&BBox::new(-106.0, 39.0, -105.0, 40.0))
            .await
            .unwrap();
        assert_eq!(dams.len(), 1);
        assert_eq!(dams.features[0].property_str("federalId").as_deref(), Some("CO01234"));
    }
}
