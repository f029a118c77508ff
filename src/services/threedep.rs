//! 3DEP elevation ImageServer exports.

use std::path::Path;

use tracing::{debug, instrument};

use super::{ServiceError, build_url};
use crate::download::HttpClient;
use crate::geometry::BBox;

const SERVICE: &str = "3DEP";

/// Largest image side the ImageServer exports in one request.
pub const MAX_EXPORT_PIXELS: u64 = 8000;

/// A DEM export request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemExport {
    /// `exportImage` URL.
    pub url: String,
    /// Image width in pixels.
    pub width: u64,
    /// Image height in pixels.
    pub height: u64,
}

/// 3DEP client.
#[derive(Debug, Clone, Copy)]
pub struct ThreeDep<'a> {
    http: &'a HttpClient,
    base: &'a str,
}

impl<'a> ThreeDep<'a> {
    /// Creates a client.
    #[must_use]
    pub fn new(http: &'a HttpClient, base: &'a str) -> Self {
        Self { http, base }
    }

    /// Float32 GeoTIFF export of `bbox` in EPSG:4326 at roughly
    /// `resolution_m` meters per pixel.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::InvalidRequest`] when the image would exceed
    /// [`MAX_EXPORT_PIXELS`] on a side.
    pub fn export_request(&self, bbox: &BBox, resolution_m: u32) -> Result<DemExport, ServiceError> {
        let (width_m, height_m) = bbox.size_m();
        let res = f64::from(resolution_m.max(1));
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let (width, height) = (
            ((width_m / res).ceil() as u64).max(1),
            ((height_m / res).ceil() as u64).max(1),
        );
        if width > MAX_EXPORT_PIXELS || height > MAX_EXPORT_PIXELS {
            return Err(ServiceError::invalid_request(
                SERVICE,
                format!(
                    "{width}x{height} pixels at {resolution_m} m exceeds {MAX_EXPORT_PIXELS} per side; use a coarser resolution"
                ),
            ));
        }
        let url = build_url(
            SERVICE,
            self.base,
            &["exportImage"],
            &[
                ("bbox", bbox.to_query()),
                ("bboxSR", "4326".to_string()),
                ("imageSR", "4326".to_string()),
                ("size", format!("{width},{height}")),
                ("format", "tiff".to_string()),
                ("pixelType", "F32".to_string()),
                ("noDataInterpretation", "esriNoDataMatchAny".to_string()),
                ("interpolation", "RSP_BilinearInterpolation".to_string()),
                ("f", "image".to_string()),
            ],
        )?;
        Ok(DemExport { url, width, height })
    }

    /// Downloads the DEM of `bbox` to `dest`.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] if the request is too large or fails.
    #[instrument(level = "debug", skip(self), fields(dest = %dest.display()))]
    pub async fn export_dem(
        &self,
        bbox: &BBox,
        resolution_m: u32,
        dest: &Path,
    ) -> Result<u64, ServiceError> {
        let export = self.export_request(bbox, resolution_m)?;
        debug!(width = export.width, height = export.height, "exporting DEM");
        Ok(self.http.download_to_path(&export.url, dest).await?)
    }
}
