//! Network Linked Data Index: upstream navigation and catchment
//! characteristics.

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, instrument};

use super::{ServiceError, build_url};
use crate::download::HttpClient;
use crate::geometry::FeatureCollection;

const SERVICE: &str = "NLDI";

/// Navigation distance in km; large enough to reach every headwater.
pub const NAVIGATION_DISTANCE_KM: u32 = 9999;

/// Upstream navigation modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    /// Follow the main stem only.
    UpstreamMain,
    /// Follow the main stem and every tributary.
    UpstreamTributaries,
}

impl Navigation {
    /// NLDI path code (`UM` or `UT`).
    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            Self::UpstreamMain => "UM",
            Self::UpstreamTributaries => "UT",
        }
    }

    /// Long name used in logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UpstreamMain => "upstreamMain",
            Self::UpstreamTributaries => "upstreamTributaries",
        }
    }
}

#[derive(Debug, Deserialize)]
struct CharacteristicsResponse {
    #[serde(default)]
    characteristics: Vec<Characteristic>,
}

#[derive(Debug, Deserialize)]
struct Characteristic {
    characteristic_id: String,
    characteristic_value: Option<Value>,
}

/// NLDI client.
#[derive(Debug, Clone, Copy)]
pub struct Nldi<'a> {
    http: &'a HttpClient,
    base: &'a str,
}

impl<'a> Nldi<'a> {
    /// Creates a client.
    #[must_use]
    pub fn new(http: &'a HttpClient, base: &'a str) -> Self {
        Self { http, base }
    }

    /// URL of the flowlines reached from `comid`.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::InvalidRequest`] for a bad base URL.
    pub fn navigate_url(&self, comid: &str, navigation: Navigation) -> Result<String, ServiceError> {
        build_url(
            SERVICE,
            self.base,
            &["comid", comid, "navigation", navigation.code(), "flowlines"],
            &[("distance", NAVIGATION_DISTANCE_KM.to_string())],
        )
    }

    /// COMIDs of the flowlines upstream of `comid`, including `comid`.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotFound`] when navigation returns nothing.
    #[instrument(level = "debug", skip(self), fields(navigation = navigation.as_str()))]
    pub async fn navigate(
        &self,
        comid: &str,
        navigation: Navigation,
    ) -> Result<Vec<String>, ServiceError> {
        let url = self.navigate_url(comid, navigation)?;
        let flowlines = FeatureCollection::from_value(self.http.get_json(&url).await?)?;
        let mut comids: Vec<String> = flowlines
            .features
            .iter()
            .filter_map(|f| f.property_str("nhdplus_comid"))
            .collect();
        comids.dedup();
        if comids.is_empty() {
            return Err(ServiceError::not_found(
                SERVICE,
                format!("flowlines upstream of COMID {comid}"),
            ));
        }
        debug!(count = comids.len(), "upstream flowlines found");
        Ok(comids)
    }

    /// URL of the local catchment characteristics of `comid`.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::InvalidRequest`] for a bad base URL.
    pub fn characteristics_url(&self, comid: &str, attrs: &[String]) -> Result<String, ServiceError> {
        build_url(
            SERVICE,
            self.base,
            &["comid", comid, "local"],
            &[("characteristicId", attrs.join(","))],
        )
    }

    /// Local characteristics per COMID: `{comid: {attr: value}}`.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] if any request fails.
    #[instrument(level = "debug", skip_all, fields(comids = comids.len()))]
    pub async fn characteristics(
        &self,
        comids: &[String],
        attrs: &[String],
    ) -> Result<Value, ServiceError> {
        let mut table = Map::new();
        for comid in comids {
            let url = self.characteristics_url(comid, attrs)?;
            let response: CharacteristicsResponse =
                serde_json::from_value(self.http.get_json(&url).await?)
                    .map_err(|e| ServiceError::unexpected(SERVICE, e.to_string()))?;
            let row: Map<String, Value> = response
                .characteristics
                .into_iter()
                .map(|c| (c.characteristic_id, c.characteristic_value.unwrap_or(Value::Null)))
                .collect();
            table.insert(comid.clone(), Value::Object(row));
        }
        Ok(Value::Object(table))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, ResponseTemplate};

    use super::*;
    use crate::test_support::mock_services;
    use crate::test_support::socket_guard::start_mock_server_or_skip;

    #[test]
    fn test_navigation_codes() {
        assert_eq!(Navigation::UpstreamMain.code(), "UM");
        assert_eq!(Navigation::UpstreamTributaries.as_str(), "upstreamTributaries");
    }

    #[tokio::test]
    async fn test_navigate_collects_comids() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/nldi/comid/1722317/navigation/UT/flowlines"))
            .and(query_param("distance", "9999"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "type": "FeatureCollection",
                "features": [
                    {"type": "Feature", "properties": {"nhdplus_comid": "1722317"},
                     "geometry": {"type": "LineString", "coordinates": [[0,0],[1,1]]}},
                    {"type": "Feature", "properties": {"nhdplus_comid": "1722319"},
                     "geometry": {"type": "LineString", "coordinates": [[1,1],[2,2]]}}
                ]
            })))
            .mount(&mock_server)
            .await;

        let services = mock_services(&mock_server.uri());
        let comids = services
            .nldi()
            .navigate("1722317", Navigation::UpstreamTributaries)
            .await
            .unwrap();
        assert_eq!(comids, vec!["1722317", "1722319"]);
    }

    #[tokio::test]
    async fn test_characteristics_keyed_by_comid() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/nldi/comid/11/local"))
            .and(query_param("characteristicId", "CAT_BFI,CAT_ELEV_MEAN"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "characteristics": [
                    {"characteristic_id": "CAT_BFI", "characteristic_value": 45.0, "percent_nodata": 0},
                    {"characteristic_id": "CAT_ELEV_MEAN", "characteristic_value": null}
                ]
            })))
            .mount(&mock_server)
            .await;

        let services = mock_services(&mock_server.uri());
        let attrs = vec!["CAT_BFI".to_string(), "CAT_ELEV_MEAN".to_string()];
        let table = services
            .nldi()
            .characteristics(&["11".to_string()], &attrs)
            .await
            .unwrap();
        assert_eq!(table["11"]["CAT_BFI"], json!(45.0));
        assert!(table["11"]["CAT_ELEV_MEAN"].is_null());
    }
}
