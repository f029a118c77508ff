//! Clients for the external data services.
//!
//! Each client borrows the shared [`HttpClient`] and one base URL from
//! [`ServiceEndpoints`], so tests can point any of them at a mock server
//! through `settings.endpoints` in the config file. Clients only build
//! requests and shape responses; writing outputs is left to the tasks.
//!
//! # Example
//!
//! ```no_run
//! use hysetter_core::{BBox, RunSettings, Services};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let services = Services::from_settings(&RunSettings::default())?;
//! let sites = services
//!     .nwis()
//!     .site_info(&BBox::new(-105.3, 39.9, -105.1, 40.1), hysetter_core::config::Frequency::Daily)
//!     .await?;
//! println!("{} gauges", sites.len());
//! # Ok(())
//! # }
//! ```

pub mod climate;
mod error;
pub mod geoconnex;
pub mod nid;
pub mod nlcd;
pub mod nldi;
pub mod nwis;
pub mod rasters;
pub mod soil;
pub mod streamcat;
pub mod threedep;
pub mod waterdata;

pub use error::ServiceError;

use url::Url;

use crate::config::{EndpointOverrides, RunSettings};
use crate::download::{DownloadError, HttpClient};

/// One file to download: where from and its name in the output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRequest {
    /// Fully built request URL.
    pub url: String,
    /// Output file name, relative to the category directory.
    pub file_name: String,
}

/// Base URL of every external service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEndpoints {
    /// USGS WaterData GeoServer WFS.
    pub waterdata: String,
    /// GeoConnex reference features API.
    pub geoconnex: String,
    /// Network Linked Data Index.
    pub nldi: String,
    /// EPA StreamCat metrics API.
    pub streamcat: String,
    /// NWIS water services (site, dv, iv).
    pub nwis: String,
    /// National Inventory of Dams GeoPackage download.
    pub nid_inventory: String,
    /// National Inventory of Dams feature service layer.
    pub nid_features: String,
    /// 3DEP elevation ImageServer.
    pub threedep: String,
    /// Daymet THREDDS NetCDF subset service.
    pub daymet: String,
    /// gridMET THREDDS NetCDF subset service.
    pub gridmet: String,
    /// NLDAS-2 data rods time series service.
    pub nldas2: String,
    /// SoilGrids MapServer.
    pub soilgrids: String,
    /// Planetary Computer API root (STAC search and SAS signing).
    pub planetary_computer: String,
    /// POLARIS tile tree.
    pub polaris: String,
    /// MRLC GeoServer WMS.
    pub mrlc: String,
}

impl Default for ServiceEndpoints {
    fn default() -> Self {
        Self {
            waterdata: "https://api.water.usgs.gov/geoserver/wmadata/ows".to_string(),
            geoconnex: "https://reference.geoconnex.us".to_string(),
            nldi: "https://api.water.usgs.gov/nldi/linked-data".to_string(),
            streamcat: "https://api.epa.gov/StreamCat/streams/metrics".to_string(),
            nwis: "https://waterservices.usgs.gov/nwis".to_string(),
            nid_inventory: "https://nid.sec.usace.army.mil/api/nation/gpkg".to_string(),
            nid_features: "https://geospatial.sec.usace.army.mil/dls/rest/services/NID/National_Inventory_of_Dams_Public_Service/FeatureServer/0".to_string(),
            threedep: "https://elevation.nationalmap.gov/arcgis/rest/services/3DEPElevation/ImageServer".to_string(),
            daymet: "https://thredds.daac.ornl.gov/thredds/ncss/grid/ornldaac/2129".to_string(),
            gridmet: "https://thredds.northwestknowledge.net/thredds/ncss".to_string(),
            nldas2: "https://hydro1.gesdisc.eosdis.nasa.gov/daac-bin/access/timeseries.cgi".to_string(),
            soilgrids: "https://maps.isric.org/mapserv".to_string(),
            planetary_computer: "https://planetarycomputer.microsoft.com/api".to_string(),
            polaris: "http://hydrology.cee.duke.edu/POLARIS/PROPERTIES/v1.0".to_string(),
            mrlc: "https://www.mrlc.gov/geoserver/mrlc_download/wms".to_string(),
        }
    }
}

impl ServiceEndpoints {
    /// Defaults with the configured overrides applied.
    #[must_use]
    pub fn from_overrides(overrides: &EndpointOverrides) -> Self {
        let mut endpoints = Self::default();
        for (name, value) in overrides.entries() {
            let value = value.trim_end_matches('/').to_string();
            let slot = match name {
                "waterdata" => &mut endpoints.waterdata,
                "geoconnex" => &mut endpoints.geoconnex,
                "nldi" => &mut endpoints.nldi,
                "streamcat" => &mut endpoints.streamcat,
                "nwis" => &mut endpoints.nwis,
                "nid_inventory" => &mut endpoints.nid_inventory,
                "nid_features" => &mut endpoints.nid_features,
                "threedep" => &mut endpoints.threedep,
                "daymet" => &mut endpoints.daymet,
                "gridmet" => &mut endpoints.gridmet,
                "nldas2" => &mut endpoints.nldas2,
                "soilgrids" => &mut endpoints.soilgrids,
                "planetary_computer" => &mut endpoints.planetary_computer,
                "polaris" => &mut endpoints.polaris,
                "mrlc" => &mut endpoints.mrlc,
                _ => continue,
            };
            *slot = value;
        }
        endpoints
    }

    /// Every endpoint pointed at one base URL, for mock-server tests.
    #[must_use]
    pub fn all_at(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        let at = |path: &str| format!("{base}/{path}");
        Self {
            waterdata: at("wfs"),
            geoconnex: at("geoconnex"),
            nldi: at("nldi"),
            streamcat: at("streamcat"),
            nwis: at("nwis"),
            nid_inventory: at("nid/gpkg"),
            nid_features: at("nid/features"),
            threedep: at("3dep"),
            daymet: at("daymet"),
            gridmet: at("gridmet"),
            nldas2: at("nldas"),
            soilgrids: at("soilgrids"),
            planetary_computer: at("pc"),
            polaris: at("polaris"),
            mrlc: at("mrlc"),
        }
    }
}

/// The shared HTTP client plus the endpoints, handing out service clients.
#[derive(Debug, Clone)]
pub struct Services {
    http: HttpClient,
    endpoints: ServiceEndpoints,
}

impl Services {
    /// Creates the service set from a client and endpoints.
    #[must_use]
    pub fn new(http: HttpClient, endpoints: ServiceEndpoints) -> Self {
        Self { http, endpoints }
    }

    /// Builds the HTTP client and endpoints from resolved run settings.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Client`] if the HTTP client cannot be built.
    pub fn from_settings(settings: &RunSettings) -> Result<Self, DownloadError> {
        Ok(Self::new(
            HttpClient::new(settings)?,
            ServiceEndpoints::from_overrides(&settings.endpoints),
        ))
    }

    /// The shared HTTP client.
    #[must_use]
    pub fn http(&self) -> &HttpClient {
        &self.http
    }

    /// The endpoints in use.
    #[must_use]
    pub fn endpoints(&self) -> &ServiceEndpoints {
        &self.endpoints
    }

    /// WaterData WFS client for `layer`.
    #[must_use]
    pub fn waterdata(&self, layer: &str) -> waterdata::WaterData<'_> {
        waterdata::WaterData::new(&self.http, &self.endpoints.waterdata, layer)
    }

    /// GeoConnex reference features client.
    #[must_use]
    pub fn geoconnex(&self) -> geoconnex::GeoConnex<'_> {
        geoconnex::GeoConnex::new(&self.http, &self.endpoints.geoconnex)
    }

    /// NLDI client.
    #[must_use]
    pub fn nldi(&self) -> nldi::Nldi<'_> {
        nldi::Nldi::new(&self.http, &self.endpoints.nldi)
    }

    /// StreamCat client.
    #[must_use]
    pub fn streamcat(&self) -> streamcat::StreamCat<'_> {
        streamcat::StreamCat::new(&self.http, &self.endpoints.streamcat)
    }

    /// NWIS client.
    #[must_use]
    pub fn nwis(&self) -> nwis::Nwis<'_> {
        nwis::Nwis::new(&self.http, &self.endpoints.nwis)
    }

    /// National Inventory of Dams client.
    #[must_use]
    pub fn nid(&self) -> nid::NidClient<'_> {
        nid::NidClient::new(
            &self.http,
            &self.endpoints.nid_inventory,
            &self.endpoints.nid_features,
        )
    }

    /// 3DEP elevation client.
    #[must_use]
    pub fn threedep(&self) -> threedep::ThreeDep<'_> {
        threedep::ThreeDep::new(&self.http, &self.endpoints.threedep)
    }

    /// Soil clients.
    #[must_use]
    pub fn soil(&self) -> soil::SoilClient<'_> {
        soil::SoilClient::new(&self.http, &self.endpoints)
    }

    /// MRLC land cover client.
    #[must_use]
    pub fn nlcd(&self) -> nlcd::Mrlc<'_> {
        nlcd::Mrlc::new(&self.http, &self.endpoints.mrlc)
    }
}

/// Joins `segments` to `base` and appends `query`.
///
/// Query values are percent-encoded; existing query pairs on `base` are
/// kept.
pub(crate) fn build_url(
    service: &'static str,
    base: &str,
    segments: &[&str],
    query: &[(&str, String)],
) -> Result<String, ServiceError> {
    let mut url = Url::parse(base)
        .map_err(|e| ServiceError::invalid_request(service, format!("{base}: {e}")))?;
    if !segments.is_empty() {
        let mut path = url.path_segments_mut().map_err(|()| {
            ServiceError::invalid_request(service, format!("{base} cannot take a path"))
        })?;
        path.pop_if_empty();
        path.extend(segments);
    }
    if !query.is_empty() {
        url.query_pairs_mut()
            .extend_pairs(query.iter().map(|(k, v)| (*k, v.as_str())));
    }
    Ok(url.into())
}
