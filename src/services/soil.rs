//! Soil requests: SoilGrids, gNATSGO and POLARIS.
//!
//! - SoilGrids: one WCS `GetCoverage` GeoTIFF per `{layer}_{depth}`.
//! - gNATSGO: Planetary Computer STAC search for the tiles intersecting
//!   the request box, one signed asset URL per tile and variable.
//! - POLARIS: the 1x1 degree tiles covering the request box.

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, instrument};

use super::{FileRequest, ServiceEndpoints, ServiceError, build_url};
use crate::config::{Soil, SoilSource};
use crate::download::HttpClient;
use crate::geometry::{BBox, RequestArea};
use crate::layout::names;

const SOILGRIDS_LAYERS: &[&str] = &[
    "bdod", "cec", "cfvo", "clay", "nitrogen", "phh2o", "sand", "silt", "soc", "ocd", "ocs",
];

/// SoilGrids depth code (bottom of the interval in cm) and interval label.
const SOILGRIDS_DEPTHS: &[(&str, &str)] = &[
    ("5", "0-5cm"),
    ("15", "5-15cm"),
    ("30", "15-30cm"),
    ("60", "30-60cm"),
    ("100", "60-100cm"),
    ("200", "100-200cm"),
];

const POLARIS_VARIABLES: &[&str] = &[
    "silt", "sand", "clay", "bd", "theta_s", "theta_r", "ksat", "ph", "om", "lambda", "hb", "n",
    "alpha",
];

const POLARIS_DEPTHS: &[(u32, u32)] = &[(0, 5), (5, 15), (15, 30), (30, 60), (60, 100), (100, 200)];

const GNATSGO_COLLECTION: &str = "gnatsgo-rasters";

#[allow(clippy::expect_used)]
static SOILGRIDS_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([a-z0-9]+)_(\d+)$").expect("SoilGrids regex is valid") // Static pattern, safe to panic
});

#[allow(clippy::expect_used)]
static POLARIS_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([a-z_]+?)_(mean|mode|p5|p50|p95)_(\d+)_(\d+)$").expect("POLARIS regex is valid") // Static pattern, safe to panic
});

#[allow(clippy::expect_used)]
static GNATSGO_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z][a-z0-9_]*$").expect("gNATSGO regex is valid") // Static pattern, safe to panic
});

/// A parsed SoilGrids variable.
#[derive(Debug, Clone, PartialEq, Eq)]
struct SoilGridsVariable<'a> {
    layer: &'a str,
    interval: &'static str,
}

fn parse_soilgrids(name: &str) -> Option<SoilGridsVariable<'_>> {
    let caps = SOILGRIDS_NAME.captures(name)?;
    let layer = caps.get(1)?.as_str();
    let depth = caps.get(2)?.as_str();
    if !SOILGRIDS_LAYERS.contains(&layer) {
        return None;
    }
    let interval = if layer == "ocs" {
        (depth == "30").then_some("0-30cm")?
    } else {
        SOILGRIDS_DEPTHS
            .iter()
            .find(|(code, _)| *code == depth)
            .map(|(_, interval)| *interval)?
    };
    Some(SoilGridsVariable { layer, interval })
}

/// A parsed POLARIS variable.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PolarisVariable<'a> {
    property: &'a str,
    statistic: &'a str,
    top: u32,
    bottom: u32,
}

fn parse_polaris(name: &str) -> Option<PolarisVariable<'_>> {
    let caps = POLARIS_NAME.captures(name)?;
    let property = caps.get(1)?.as_str();
    let top = caps.get(3)?.as_str().parse().ok()?;
    let bottom = caps.get(4)?.as_str().parse().ok()?;
    if !POLARIS_VARIABLES.contains(&property) || !POLARIS_DEPTHS.contains(&(top, bottom)) {
        return None;
    }
    Some(PolarisVariable {
        property,
        statistic: caps.get(2)?.as_str(),
        top,
        bottom,
    })
}

/// Checks a soil variable name against the naming scheme of `source`.
///
/// # Errors
///
/// Returns a message naming the expected form when `variable` is invalid.
pub fn check_variable(source: SoilSource, variable: &str) -> Result<(), String> {
    let valid = match source {
        SoilSource::Soilgrids => parse_soilgrids(variable).is_some(),
        SoilSource::Polaris => parse_polaris(variable).is_some(),
        SoilSource::Gnatsgo => GNATSGO_NAME.is_match(variable),
    };
    if valid {
        return Ok(());
    }
    let expected = match source {
        SoilSource::Soilgrids => format!(
            "{{layer}}_{{depth}} with layer in {} and depth in 5, 15, 30, 60, 100, 200 (ocs only 30)",
            SOILGRIDS_LAYERS.join(", ")
        ),
        SoilSource::Polaris => format!(
            "{{property}}_{{mean|mode|p5|p50|p95}}_{{top}}_{{bottom}} with property in {} and depths 0_5, 5_15, 15_30, 30_60, 60_100, 100_200",
            POLARIS_VARIABLES.join(", ")
        ),
        SoilSource::Gnatsgo => "a lowercase gNATSGO raster name such as aws0_100".to_string(),
    };
    Err(format!(
        "{variable} is not a {} variable. Expected {expected}",
        source.display_name()
    ))
}

/// POLARIS tile names (`lat3940_lon-106-105`) covering `bbox`.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn polaris_tiles(bbox: &BBox) -> Vec<String> {
    let span = |lo: f64, hi: f64| {
        let start = lo.floor() as i32;
        let end = (hi.ceil() as i32).max(start + 1);
        start..end
    };
    let mut tiles = Vec::new();
    for lat in span(bbox.south, bbox.north) {
        for lon in span(bbox.west, bbox.east) {
            tiles.push(format!("lat{lat}{}_lon{lon}{}", lat + 1, lon + 1));
        }
    }
    tiles
}

#[derive(Debug, Deserialize)]
struct StacSearch {
    #[serde(default)]
    features: Vec<StacItem>,
}

#[derive(Debug, Deserialize)]
struct StacItem {
    id: String,
    #[serde(default)]
    assets: serde_json::Map<String, Value>,
}

/// Soil client.
#[derive(Debug, Clone, Copy)]
pub struct SoilClient<'a> {
    http: &'a HttpClient,
    endpoints: &'a ServiceEndpoints,
}

impl<'a> SoilClient<'a> {
    /// Creates a client.
    #[must_use]
    pub fn new(http: &'a HttpClient, endpoints: &'a ServiceEndpoints) -> Self {
        Self { http, endpoints }
    }

    /// Every file to download for geometry `index`.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::InvalidRequest`] for invalid names, and for
    /// gNATSGO the errors of the STAC search and signing requests.
    #[instrument(level = "debug", skip_all, fields(source = %soil.source, index))]
    pub async fn requests(
        &self,
        soil: &Soil,
        index: usize,
        area: &RequestArea,
    ) -> Result<Vec<FileRequest>, ServiceError> {
        match soil.source {
            SoilSource::Soilgrids => soil
                .variables
                .iter()
                .map(|v| self.soilgrids_request(v, index, &area.bbox))
                .collect(),
            SoilSource::Polaris => {
                let mut out = Vec::new();
                for v in &soil.variables {
                    out.extend(self.polaris_requests(v, index, &area.bbox)?);
                }
                Ok(out)
            }
            SoilSource::Gnatsgo => self.gnatsgo_requests(&soil.variables, index, &area.bbox).await,
        }
    }

    fn soilgrids_request(
        &self,
        variable: &str,
        index: usize,
        bbox: &BBox,
    ) -> Result<FileRequest, ServiceError> {
        let parsed = parse_soilgrids(variable).ok_or_else(|| {
            ServiceError::invalid_request("SoilGrids", format!("unknown variable {variable}"))
        })?;
        let crs = "http://www.opengis.net/def/crs/EPSG/0/4326";
        let query = [
            ("map", format!("/map/{}.map", parsed.layer)),
            ("SERVICE", "WCS".to_string()),
            ("VERSION", "2.0.1".to_string()),
            ("REQUEST", "GetCoverage".to_string()),
            ("COVERAGEID", format!("{}_{}_mean", parsed.layer, parsed.interval)),
            ("FORMAT", "image/tiff".to_string()),
            ("SUBSET", format!("long({:.6},{:.6})", bbox.west, bbox.east)),
            ("SUBSET", format!("lat({:.6},{:.6})", bbox.south, bbox.north)),
            ("SUBSETTINGCRS", crs.to_string()),
            ("OUTPUTCRS", crs.to_string()),
        ];
        Ok(FileRequest {
            url: build_url("SoilGrids", &self.endpoints.soilgrids, &[], &query)?,
            file_name: names::soil(SoilSource::Soilgrids, index, variable, None),
        })
    }

    fn polaris_requests(
        &self,
        variable: &str,
        index: usize,
        bbox: &BBox,
    ) -> Result<Vec<FileRequest>, ServiceError> {
        let parsed = parse_polaris(variable).ok_or_else(|| {
            ServiceError::invalid_request("POLARIS", format!("unknown variable {variable}"))
        })?;
        let depth = format!("{}_{}", parsed.top, parsed.bottom);
        polaris_tiles(bbox)
            .into_iter()
            .map(|tile| {
                let file = format!("{tile}.tif");
                Ok(FileRequest {
                    url: build_url(
                        "POLARIS",
                        &self.endpoints.polaris,
                        &[parsed.property, parsed.statistic, &depth, &file],
                        &[],
                    )?,
                    file_name: names::soil(SoilSource::Polaris, index, variable, Some(tile.as_str())),
                })
            })
            .collect()
    }

    async fn gnatsgo_requests(
        &self,
        variables: &[String],
        index: usize,
        bbox: &BBox,
    ) -> Result<Vec<FileRequest>, ServiceError> {
        let search_url = build_url(
            "gNATSGO",
            &self.endpoints.planetary_computer,
            &["stac", "v1", "search"],
            &[],
        )?;
        let body = json!({
            "collections": [GNATSGO_COLLECTION],
            "bbox": [bbox.west, bbox.south, bbox.east, bbox.north],
            "limit": 100,
        });
        let search: StacSearch = serde_json::from_value(self.http.post_json(&search_url, &body).await?)
            .map_err(|e| ServiceError::unexpected("gNATSGO", e.to_string()))?;
        debug!(items = search.features.len(), "STAC items found");

        let mut out = Vec::new();
        for variable in variables {
            let mut found = false;
            for item in &search.features {
                let Some(href) = item
                    .assets
                    .get(variable)
                    .and_then(|asset| asset.get("href"))
                    .and_then(Value::as_str)
                else {
                    continue;
                };
                found = true;
                out.push(FileRequest {
                    url: self.sign(href).await?,
                    file_name: names::soil(SoilSource::Gnatsgo, index, variable, Some(item.id.as_str())),
                });
            }
            if !found {
                return Err(ServiceError::not_found(
                    "gNATSGO",
                    format!("variable {variable} in {bbox}"),
                ));
            }
        }
        Ok(out)
    }

    /// Signs a Planetary Computer asset URL.
    async fn sign(&self, href: &str) -> Result<String, ServiceError> {
        let url = build_url(
            "gNATSGO",
            &self.endpoints.planetary_computer,
            &["sas", "v1", "sign"],
            &[("href", href.to_string())],
        )?;
        let signed = self.http.get_json(&url).await?;
        signed
            .get("href")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ServiceError::unexpected("gNATSGO", "signing response has no href"))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::Map;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, ResponseTemplate};

    use super::*;
    use crate::geometry::Feature;
    use crate::test_support::mock_services;
    use crate::test_support::socket_guard::start_mock_server_or_skip;

    fn soil(source: SoilSource, variables: &[&str]) -> Soil {
        Soil {
            source,
            variables: variables.iter().map(|v| (*v).to_string()).collect(),
            crop: true,
            geometry_buffer: 0.0,
        }
    }

    fn area(bbox: BBox) -> RequestArea {
        RequestArea::for_feature(&Feature::new(bbox.to_polygon(), Map::new()), 0, true, 0.0).unwrap()
    }

    #[test]
    fn test_soilgrids_names() {
        assert!(check_variable(SoilSource::Soilgrids, "clay_15").is_ok());
        assert!(check_variable(SoilSource::Soilgrids, "ocs_30").is_ok());
        assert!(check_variable(SoilSource::Soilgrids, "ocs_15").is_err());
        let msg = check_variable(SoilSource::Soilgrids, "clay_12").unwrap_err();
        assert!(msg.starts_with("clay_12 is not a SoilGrids variable"), "got {msg}");
    }

    #[test]
    fn test_polaris_names() {
        assert!(check_variable(SoilSource::Polaris, "theta_s_mean_0_5").is_ok());
        assert!(check_variable(SoilSource::Polaris, "ksat_p95_100_200").is_ok());
        assert!(check_variable(SoilSource::Polaris, "clay_mean_0_10").is_err());
        assert!(check_variable(SoilSource::Polaris, "mud_mean_0_5").is_err());
    }

    #[test]
    fn test_gnatsgo_names() {
        assert!(check_variable(SoilSource::Gnatsgo, "aws0_100").is_ok());
        assert!(check_variable(SoilSource::Gnatsgo, "AWS 0").is_err());
    }

    #[test]
    fn test_polaris_tiles_cover_box() {
        let tiles = polaris_tiles(&BBox::new(-105.5, 39.2, -104.5, 40.0));
        assert_eq!(
            tiles,
            ["lat3940_lon-106-105", "lat3940_lon-105-104"]
        );
    }

    #[tokio::test]
    async fn test_soilgrids_request_uses_depth_interval() {
        let services = mock_services("http://localhost:1");
        let reqs = services
            .soil()
            .requests(
                &soil(SoilSource::Soilgrids, &["sand_60"]),
                4,
                &area(BBox::new(-105.0, 39.0, -104.0, 40.0)),
            )
            .await
            .unwrap();
        assert_eq!(reqs[0].file_name, "soilgrids_geom_4_sand_60.tif");
        assert!(reqs[0].url.contains("COVERAGEID=sand_30-60cm_mean"), "{}", reqs[0].url);
        assert!(reqs[0].url.contains("map=%2Fmap%2Fsand.map"), "{}", reqs[0].url);
        assert_eq!(reqs[0].url.matches("SUBSET=").count(), 2);
    }

    #[tokio::test]
    async fn test_polaris_requests_per_tile() {
        let services = mock_services("http://localhost:1");
        let reqs = services
            .soil()
            .requests(
                &soil(SoilSource::Polaris, &["clay_mean_0_5"]),
                0,
                &area(BBox::new(-105.5, 39.2, -105.1, 39.8)),
            )
            .await
            .unwrap();
        assert_eq!(reqs.len(), 1);
        assert_eq!(reqs[0].file_name, "polaris_geom_0_clay_mean_0_5_lat3940_lon-106-105.tif");
        assert!(reqs[0].url.ends_with("/polaris/clay/mean/0_5/lat3940_lon-106-105.tif"));
    }

    #[tokio::test]
    async fn test_gnatsgo_searches_and_signs() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("POST"))
            .and(path("/pc/stac/v1/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "features": [
                    {"id": "tile_a", "assets": {"aws0_100": {"href": "https://blob/a.tif"}}},
                    {"id": "tile_b", "assets": {"tk0_100a": {"href": "https://blob/b.tif"}}}
                ]
            })))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/pc/sas/v1/sign"))
            .and(query_param("href", "https://blob/a.tif"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"href": "https://blob/a.tif?sig=1"})),
            )
            .mount(&mock_server)
            .await;

        let services = mock_services(&mock_server.uri());
        let reqs = services
            .soil()
            .requests(
                &soil(SoilSource::Gnatsgo, &["aws0_100"]),
                1,
                &area(BBox::new(-105.0, 39.0, -104.0, 40.0)),
            )
            .await
            .unwrap();
        assert_eq!(
            reqs,
            vec![FileRequest {
                url: "https://blob/a.tif?sig=1".to_string(),
                file_name: "gnatsgo_geom_1_aws0_100_tile_a.tif".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn test_gnatsgo_missing_variable_is_not_found() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("POST"))
            .and(path("/pc/stac/v1/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"features": []})))
            .mount(&mock_server)
            .await;

        let services = mock_services(&mock_server.uri());
        let err = services
            .soil()
            .requests(
                &soil(SoilSource::Gnatsgo, &["aws0_100"]),
                0,
                &area(BBox::new(0.0, 0.0, 1.0, 1.0)),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound { .. }));
    }
}
