//! USGS WaterData GeoServer (WFS) queries.
//!
//! Features are requested as GeoJSON in EPSG:4326 either by attribute
//! (`byid`, batched into CQL `IN` filters) or by bounding box (`bybox`).

use tracing::{debug, instrument};

use super::{ServiceError, build_url};
use crate::download::HttpClient;
use crate::geometry::{BBox, FeatureCollection};

const SERVICE: &str = "WaterData";

/// Largest number of ids sent in one CQL filter.
pub const MAX_IDS_PER_REQUEST: usize = 100;

/// NHDPlus V2 catchment polygons, keyed by `featureid`.
pub const CATCHMENTS: &str = "catchmentsp";

/// GAGES-II basin polygons, keyed by `gage_id`.
pub const GAGES_BASINS: &str = "gagesii_basins";

/// NHDPlus V2 flowlines, keyed by `comid`.
pub const FLOWLINES: &str = "nhdflowline_network";

/// WBD layer holding HUCs with `level` digits; keyed by `huc{level}`.
#[must_use]
pub fn huc_layer(level: usize) -> String {
    format!("wbd{level:02}_20201006")
}

/// WFS client for one layer.
#[derive(Debug, Clone)]
pub struct WaterData<'a> {
    http: &'a HttpClient,
    base: &'a str,
    layer: String,
}

impl<'a> WaterData<'a> {
    /// Creates a client for `layer`.
    #[must_use]
    pub fn new(http: &'a HttpClient, base: &'a str, layer: &str) -> Self {
        Self {
            http,
            base,
            layer: layer.to_string(),
        }
    }

    fn common_query(&self) -> Vec<(&'static str, String)> {
        vec![
            ("service", "wfs".to_string()),
            ("version", "2.0.0".to_string()),
            ("request", "GetFeature".to_string()),
            ("typeNames", format!("wmadata:{}", self.layer)),
            ("outputFormat", "application/json".to_string()),
            ("srsName", "EPSG:4326".to_string()),
        ]
    }

    /// URL selecting the features whose `field` is one of `ids`.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::InvalidRequest`] for a bad base URL.
    pub fn byid_url(&self, field: &str, ids: &[String]) -> Result<String, ServiceError> {
        let quoted: Vec<String> = ids
            .iter()
            .map(|id| format!("'{}'", id.replace('\'', "''")))
            .collect();
        let mut query = self.common_query();
        query.push(("cql_filter", format!("{field} IN ({})", quoted.join(","))));
        build_url(SERVICE, self.base, &[], &query)
    }

    /// Features whose `field` matches one of `ids`, fetched in batches of
    /// [`MAX_IDS_PER_REQUEST`].
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] if a batch fails or is not GeoJSON.
    #[instrument(level = "debug", skip(self, ids), fields(layer = %self.layer, ids = ids.len()))]
    pub async fn byid(&self, field: &str, ids: &[String]) -> Result<FeatureCollection, ServiceError> {
        let mut collection = FeatureCollection::new(Vec::new());
        for batch in ids.chunks(MAX_IDS_PER_REQUEST) {
            let url = self.byid_url(field, batch)?;
            let value = self.http.get_json(&url).await?;
            collection.extend(FeatureCollection::from_value(value)?);
        }
        debug!(features = collection.len(), "WFS byid finished");
        Ok(collection)
    }

    /// URL selecting the features intersecting `bbox`.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::InvalidRequest`] for a bad base URL.
    pub fn bybox_url(&self, bbox: &BBox) -> Result<String, ServiceError> {
        let mut query = self.common_query();
        // The URN form of EPSG:4326 is latitude first
        query.push((
            "bbox",
            format!(
                "{:.6},{:.6},{:.6},{:.6},urn:ogc:def:crs:EPSG::4326",
                bbox.south, bbox.west, bbox.north, bbox.east
            ),
        ));
        build_url(SERVICE, self.base, &[], &query)
    }

    /// Features intersecting `bbox`.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] if the request fails or is not GeoJSON.
    #[instrument(level = "debug", skip(self), fields(layer = %self.layer))]
    pub async fn bybox(&self, bbox: &BBox) -> Result<FeatureCollection, ServiceError> {
        let url = self.bybox_url(bbox)?;
        let value = self.http.get_json(&url).await?;
        Ok(FeatureCollection::from_value(value)?)
    }
}
