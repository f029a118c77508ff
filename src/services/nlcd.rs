//! NLCD rasters from the MRLC GeoServer WMS.

use std::path::Path;

use tracing::{debug, instrument};

use super::{ServiceError, build_url};
use crate::config::NlcdLayer;
use crate::download::HttpClient;
use crate::geometry::BBox;

const SERVICE: &str = "MRLC";

/// Native NLCD resolution in meters.
pub const NLCD_RESOLUTION_M: f64 = 30.0;

/// Largest GetMap image side; larger boxes come back coarser than 30 m.
pub const MAX_GETMAP_PIXELS: u64 = 8000;

/// WMS layer name of `layer` for `year`.
#[must_use]
pub fn layer_name(layer: NlcdLayer, year: u16) -> String {
    match layer {
        NlcdLayer::Cover => format!("NLCD_{year}_Land_Cover_L48"),
        NlcdLayer::Impervious => format!("NLCD_{year}_Impervious_L48"),
        NlcdLayer::Descriptor => format!("NLCD_{year}_Impervious_descriptor_L48"),
        NlcdLayer::Canopy => format!("nlcd_tcc_conus_{year}_v2021-4"),
    }
}

/// MRLC client.
#[derive(Debug, Clone, Copy)]
pub struct Mrlc<'a> {
    http: &'a HttpClient,
    base: &'a str,
}

impl<'a> Mrlc<'a> {
    /// Creates a client.
    #[must_use]
    pub fn new(http: &'a HttpClient, base: &'a str) -> Self {
        Self { http, base }
    }

    /// GeoTIFF `GetMap` URL of `layer` for `year` over `bbox`.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::InvalidRequest`] for a bad base URL.
    pub fn getmap_url(&self, bbox: &BBox, layer: NlcdLayer, year: u16) -> Result<String, ServiceError> {
        let (width_m, height_m) = bbox.size_m();
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let side = |meters: f64| ((meters / NLCD_RESOLUTION_M).ceil() as u64).clamp(1, MAX_GETMAP_PIXELS);
        // WMS 1.3.0 with EPSG:4326 takes the box in lat/lon axis order
        let wms_box = format!(
            "{:.6},{:.6},{:.6},{:.6}",
            bbox.south, bbox.west, bbox.north, bbox.east
        );
        build_url(
            SERVICE,
            self.base,
            &[],
            &[
                ("service", "WMS".to_string()),
                ("version", "1.3.0".to_string()),
                ("request", "GetMap".to_string()),
                ("layers", layer_name(layer, year)),
                ("styles", String::new()),
                ("crs", "EPSG:4326".to_string()),
                ("bbox", wms_box),
                ("width", side(width_m).to_string()),
                ("height", side(height_m).to_string()),
                ("format", "image/geotiff".to_string()),
            ],
        )
    }

    /// Downloads `layer` for `year` over `bbox` to `dest`.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] if the request fails.
    #[instrument(level = "debug", skip(self, bbox), fields(layer = layer.as_str(), year))]
    pub async fn get_layer(
        &self,
        bbox: &BBox,
        layer: NlcdLayer,
        year: u16,
        dest: &Path,
    ) -> Result<u64, ServiceError> {
        let url = self.getmap_url(bbox, layer, year)?;
        let bytes = self.http.download_to_path(&url, dest).await?;
        debug!(bytes, "NLCD layer written");
        Ok(bytes)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tempfile::TempDir;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, ResponseTemplate};

    use super::*;
    use crate::test_support::mock_services;
    use crate::test_support::socket_guard::start_mock_server_or_skip;

    #[test]
    fn test_layer_names() {
        assert_eq!(layer_name(NlcdLayer::Cover, 2019), "NLCD_2019_Land_Cover_L48");
        assert_eq!(layer_name(NlcdLayer::Canopy, 2016), "nlcd_tcc_conus_2016_v2021-4");
        assert_eq!(
            layer_name(NlcdLayer::Descriptor, 2021),
            "NLCD_2021_Impervious_descriptor_L48"
        );
    }

    #[test]
    fn test_getmap_url_uses_lat_lon_order() {
        let services = mock_services("http://localhost:1");
        let url = services
            .nlcd()
            .getmap_url(&BBox::new(-105.5, 39.5, -105.0, 40.0), NlcdLayer::Impervious, 2011)
            .unwrap();
        let url = url::Url::parse(&url).unwrap();
        let query: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(query["bbox"], "39.500000,-105.500000,40.000000,-105.000000");
        assert_eq!(query["layers"], "NLCD_2011_Impervious_L48");
        assert_eq!(query["styles"], "");
        // 0.5 degree of latitude at 30 m
        assert_eq!(query["height"], "1856");
    }

    #[test]
    fn test_getmap_size_is_capped() {
        let services = mock_services("http://localhost:1");
        let url = services
            .nlcd()
            .getmap_url(&BBox::new(-110.0, 35.0, -100.0, 45.0), NlcdLayer::Cover, 2021)
            .unwrap();
        assert!(url.contains("width=8000"), "got {url}");
        assert!(url.contains("height=8000"), "got {url}");
    }

    #[tokio::test]
    async fn test_get_layer_writes_geotiff() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/mrlc"))
            .and(query_param("request", "GetMap"))
            .and(query_param("layers", "NLCD_2021_Land_Cover_L48"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "image/geotiff")
                    .set_body_bytes(b"II*\0fake".to_vec()),
            )
            .mount(&mock_server)
            .await;

        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("nlcd_geom_0_cover_2021.tif");
        let services = mock_services(&mock_server.uri());
        let bytes = services
            .nlcd()
            .get_layer(&BBox::new(-105.1, 39.9, -105.0, 40.0), NlcdLayer::Cover, 2021, &dest)
            .await
            .unwrap();
        assert_eq!(bytes, 8);
        assert!(dest.exists());
    }
}
