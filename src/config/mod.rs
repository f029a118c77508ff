//! Declarative project configuration.
//!
//! A config file names the project, the area of interest (AOI) and zero or
//! more data categories to fetch for it:
//!
//! ```yaml
//! project:
//!   name: Little Colorado
//!   data_dir: ./data
//! aoi:
//!   huc_ids: ["15020002"]
//!   nhdv2_flowlines: true
//! forcing:
//!   source: daymet
//!   start_date: 2020-01-01
//!   end_date: 2020-12-31
//! topo:
//!   resolution_m: 30
//!   derived_variables: [slope, aspect]
//! ```
//!
//! Only `project` and `aoi` are required. Parsing goes through
//! [`Config::from_yaml_str`], which normalizes and validates the result.

mod error;
mod settings;
mod validation;

pub use error::ConfigError;
pub use settings::{
    DEFAULT_CONCURRENCY, DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_MAX_RETRIES, DEFAULT_RATE_LIMIT_MS,
    DEFAULT_READ_TIMEOUT_SECS, EndpointOverrides, RunSettings, Settings,
};

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::services::nldi::Navigation;
use crate::terrain::DerivedVariable;

/// Years with published NLCD land cover, impervious and descriptor layers.
pub const NLCD_RELEASE_YEARS: [u16; 9] = [2001, 2004, 2006, 2008, 2011, 2013, 2016, 2019, 2021];

/// First and last years of the NLCD tree canopy product.
pub const NLCD_CANOPY_YEARS: std::ops::RangeInclusive<u16> = 2011..=2022;

/// Root of the YAML configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Project name and data directory.
    pub project: Project,
    /// Area of interest.
    pub aoi: Aoi,
    /// Climate forcing request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forcing: Option<Forcing>,
    /// Topography request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topo: Option<Topo>,
    /// Soil request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub soil: Option<Soil>,
    /// Land cover request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nlcd: Option<Nlcd>,
    /// Dam inventory request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nid: Option<Nid>,
    /// Streamflow request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub streamflow: Option<Streamflow>,
    /// Arbitrary remote rasters keyed by name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_rasters: Option<RemoteRasters>,
    /// Remove existing project data before fetching.
    #[serde(default)]
    pub overwrite: bool,
    /// Runtime knobs (concurrency, retries, timeouts, endpoints).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<Settings>,
}

/// Project information.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Project {
    /// Name of the project. Spaces become underscores in the directory name.
    pub name: String,
    /// Directory under which the project directory is created.
    pub data_dir: PathBuf,
}

/// Area of interest.
///
/// Exactly one of `huc_ids`, `nhdv2_ids`, `gagesii_basins`, `mainstem_main`,
/// `mainstem_tributaries` or `geometry_file` must be provided.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Aoi {
    /// WBD hydrologic unit codes; the level is the string length.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub huc_ids: Option<Vec<String>>,
    /// NHDPlus V2 catchment feature ids.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nhdv2_ids: Option<Vec<i64>>,
    /// GAGES-II basin ids.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gagesii_basins: Option<Vec<String>>,
    /// Mainstem id whose upstream main-stem catchments form the AOI.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mainstem_main: Option<i64>,
    /// Mainstem id whose upstream tributary catchments form the AOI.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mainstem_tributaries: Option<i64>,
    /// Local GeoJSON file with polygon features.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry_file: Option<PathBuf>,
    /// Fetch NHDPlus V2 flowlines within the AOI.
    #[serde(default)]
    pub nhdv2_flowlines: bool,
    /// StreamCat catchment metrics for the AOI flowlines.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub streamcat_attrs: Option<Vec<String>>,
    /// NLDI local catchment characteristics for the AOI flowlines.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nldi_attrs: Option<Vec<String>>,
}

/// The single AOI source selected by an [`Aoi`] block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AoiSource<'a> {
    /// WBD hydrologic units.
    Hucs(&'a [String]),
    /// NHDPlus V2 catchments.
    Catchments(&'a [i64]),
    /// GAGES-II basins.
    GagesBasins(&'a [String]),
    /// Catchments upstream of a mainstem outlet.
    Mainstem {
        /// Mainstem identifier in the GeoConnex reference.
        id: i64,
        /// Main stem only or all tributaries.
        navigation: Navigation,
    },
    /// User geometry file.
    GeometryFile(&'a Path),
}

impl Aoi {
    /// Returns the selected AOI source, or a validation error when zero or
    /// several sources are set.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] unless exactly one source is provided.
    pub fn source(&self) -> Result<AoiSource<'_>, ConfigError> {
        let mut sources = Vec::with_capacity(1);
        if let Some(ids) = self.huc_ids.as_deref().filter(|ids| !ids.is_empty()) {
            sources.push(AoiSource::Hucs(ids));
        }
        if let Some(ids) = self.nhdv2_ids.as_deref().filter(|ids| !ids.is_empty()) {
            sources.push(AoiSource::Catchments(ids));
        }
        if let Some(ids) = self.gagesii_basins.as_deref().filter(|ids| !ids.is_empty()) {
            sources.push(AoiSource::GagesBasins(ids));
        }
        if let Some(id) = self.mainstem_main {
            sources.push(AoiSource::Mainstem {
                id,
                navigation: Navigation::UpstreamMain,
            });
        }
        if let Some(id) = self.mainstem_tributaries {
            sources.push(AoiSource::Mainstem {
                id,
                navigation: Navigation::UpstreamTributaries,
            });
        }
        if let Some(path) = self
            .geometry_file
            .as_deref()
            .filter(|path| !path.as_os_str().is_empty())
        {
            sources.push(AoiSource::GeometryFile(path));
        }

        match sources.as_slice() {
            [only] => Ok(*only),
            _ => Err(ConfigError::invalid(
                "aoi",
                "Only one of `huc_ids`, `nhdv2_ids`, `gagesii_basins`, `mainstem_main`, \
                 `mainstem_tributaries`, or `geometry_file` must be provided.",
            )),
        }
    }

    /// Returns true when the AOI is built from a mainstem navigation.
    #[must_use]
    pub fn is_mainstem(&self) -> bool {
        self.mainstem_main.is_some() || self.mainstem_tributaries.is_some()
    }

    /// Requested StreamCat metrics (empty when none).
    #[must_use]
    pub fn streamcat(&self) -> &[String] {
        self.streamcat_attrs.as_deref().unwrap_or_default()
    }

    /// Requested NLDI characteristics (empty when none).
    #[must_use]
    pub fn nldi(&self) -> &[String] {
        self.nldi_attrs.as_deref().unwrap_or_default()
    }

    /// Returns true when flowlines or any flowline attribute is requested.
    #[must_use]
    pub fn wants_flowlines(&self) -> bool {
        self.nhdv2_flowlines || !self.streamcat().is_empty() || !self.nldi().is_empty()
    }
}

/// Climate forcing datasets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForcingSource {
    /// Daymet v4 daily surface weather, 1 km.
    Daymet,
    /// gridMET daily meteorology, 4 km.
    Gridmet,
    /// NLDAS-2 hourly forcing, 0.125 degree.
    Nldas2,
}

impl ForcingSource {
    /// Config and file-name label.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Daymet => "daymet",
            Self::Gridmet => "gridmet",
            Self::Nldas2 => "nldas2",
        }
    }

    /// Name shown in progress messages.
    #[must_use]
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Daymet => "Daymet",
            Self::Gridmet => "GridMet",
            Self::Nldas2 => "NLDAS2",
        }
    }
}

impl fmt::Display for ForcingSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Climate forcing request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Forcing {
    /// Dataset to query.
    pub source: ForcingSource,
    /// First day of the period (inclusive).
    #[serde(with = "date_format")]
    pub start_date: NaiveDate,
    /// Last day of the period (inclusive).
    #[serde(with = "date_format")]
    pub end_date: NaiveDate,
    /// Variables to fetch; all of the source's variables when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables: Option<Vec<String>>,
    /// Restrict to the AOI geometry instead of its bounding box.
    #[serde(default = "default_true")]
    pub crop: bool,
    /// Buffer in meters added around the AOI before requesting data.
    #[serde(default)]
    pub geometry_buffer: f64,
}

/// Topography request (3DEP DEM).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Topo {
    /// Target resolution in meters.
    pub resolution_m: u32,
    /// Derived rasters to compute from the DEM.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub derived_variables: Option<Vec<DerivedVariable>>,
    /// Mask DEM cells outside the AOI geometry.
    #[serde(default = "default_true")]
    pub crop: bool,
    /// Buffer in meters added around the AOI before requesting data.
    #[serde(default)]
    pub geometry_buffer: f64,
}

/// Soil datasets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SoilSource {
    /// ISRIC SoilGrids 250 m.
    Soilgrids,
    /// gridded National Soil Survey Geographic Database.
    Gnatsgo,
    /// POLARIS 30 m probabilistic soil properties.
    Polaris,
}

impl SoilSource {
    /// Config and file-name label.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Soilgrids => "soilgrids",
            Self::Gnatsgo => "gnatsgo",
            Self::Polaris => "polaris",
        }
    }

    /// Name shown in progress messages.
    #[must_use]
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Soilgrids => "SoilGrids",
            Self::Gnatsgo => "gNATSGO",
            Self::Polaris => "POLARIS",
        }
    }
}

impl fmt::Display for SoilSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Soil request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Soil {
    /// Dataset to query.
    pub source: SoilSource,
    /// Source-specific variable names.
    pub variables: Vec<String>,
    /// Restrict to the AOI geometry instead of its bounding box.
    #[serde(default = "default_true")]
    pub crop: bool,
    /// Buffer in meters added around the AOI before requesting data.
    #[serde(default)]
    pub geometry_buffer: f64,
}

/// NLCD product families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NlcdLayer {
    /// Land cover classes.
    Cover,
    /// Percent developed imperviousness.
    Impervious,
    /// Percent tree canopy.
    Canopy,
    /// Impervious surface descriptor.
    Descriptor,
}

impl NlcdLayer {
    /// File-name label.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cover => "cover",
            Self::Impervious => "impervious",
            Self::Canopy => "canopy",
            Self::Descriptor => "descriptor",
        }
    }
}

/// National Land Cover Database request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Nlcd {
    /// Land cover years.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover: Option<Vec<u16>>,
    /// Impervious years.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub impervious: Option<Vec<u16>>,
    /// Tree canopy years.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canopy: Option<Vec<u16>>,
    /// Impervious descriptor years.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub descriptor: Option<Vec<u16>>,
    /// Restrict to the AOI geometry instead of its bounding box.
    #[serde(default = "default_true")]
    pub crop: bool,
    /// Buffer in meters added around the AOI before requesting data.
    #[serde(default)]
    pub geometry_buffer: f64,
}

impl Nlcd {
    /// Most recent land cover release, used when no years are given.
    pub const DEFAULT_COVER_YEAR: u16 = 2021;

    /// Every `(layer, year)` pair to fetch, in layer order, each pair once.
    ///
    /// When no layer has years, the most recent land cover is requested.
    #[must_use]
    pub fn requested_layers(&self) -> Vec<(NlcdLayer, u16)> {
        let layers = [
            (NlcdLayer::Cover, &self.cover),
            (NlcdLayer::Impervious, &self.impervious),
            (NlcdLayer::Canopy, &self.canopy),
            (NlcdLayer::Descriptor, &self.descriptor),
        ];
        let mut requested: Vec<(NlcdLayer, u16)> = layers
            .iter()
            .filter_map(|(layer, years)| years.as_ref().map(|years| (*layer, years)))
            .flat_map(|(layer, years)| years.iter().map(move |year| (layer, *year)))
            .collect();
        if requested.is_empty() {
            requested.push((NlcdLayer::Cover, Self::DEFAULT_COVER_YEAR));
        }
        let mut seen = BTreeSet::new();
        requested.retain(|item| seen.insert(*item));
        requested
    }
}

/// National Inventory of Dams request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Nid {
    /// Also extract the dams that fall within each AOI geometry.
    pub within_aoi: bool,
}

/// Streamflow sampling frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    /// Daily values.
    Daily,
    /// Instantaneous values.
    Instantaneous,
}

impl Frequency {
    /// NWIS service code: `dv` or `iv`.
    #[must_use]
    pub fn service_code(self) -> &'static str {
        match self {
            Self::Daily => "dv",
            Self::Instantaneous => "iv",
        }
    }
}

/// NWIS streamflow request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Streamflow {
    /// First day of the period (inclusive).
    #[serde(with = "date_format")]
    pub start_date: NaiveDate,
    /// Last day of the period (inclusive).
    #[serde(with = "date_format")]
    pub end_date: NaiveDate,
    /// Daily or instantaneous values.
    pub frequency: Frequency,
    /// Fetch every station located inside each AOI geometry. Without
    /// `use_col` stations are always looked up per geometry, so this only
    /// records the selection mode.
    #[serde(default = "default_true")]
    pub within_aoi: bool,
    /// AOI attribute holding station ids; disables `within_aoi`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_col: Option<String>,
}

/// Remote rasters keyed by sanitized name.
///
/// Besides `crop` and `geometry_buffer`, every key of the block is a raster
/// name mapped to a URL (or URL template, see
/// [`crate::services::rasters`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RemoteRastersFile", into = "RemoteRastersFile")]
pub struct RemoteRasters {
    /// Restrict to the AOI geometry instead of its bounding box.
    pub crop: bool,
    /// Buffer in meters added around the AOI before requesting data.
    pub geometry_buffer: f64,
    /// Sanitized raster name to URL.
    pub rasters: BTreeMap<String, String>,
}

/// On-disk shape of [`RemoteRasters`].
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RemoteRastersFile {
    #[serde(default = "default_true")]
    crop: bool,
    #[serde(default)]
    geometry_buffer: f64,
    #[serde(flatten)]
    rasters: BTreeMap<String, serde_yaml::Value>,
}

impl TryFrom<RemoteRastersFile> for RemoteRasters {
    type Error = String;

    fn try_from(file: RemoteRastersFile) -> Result<Self, Self::Error> {
        let mut rasters = BTreeMap::new();
        for (name, value) in file.rasters {
            let serde_yaml::Value::String(url) = value else {
                return Err(format!(
                    "URL for remote raster `{name}` must be a string, got {}",
                    yaml_type_name(&value)
                ));
            };
            let sanitized = sanitize_raster_name(&name);
            if sanitized.is_empty() {
                return Err(format!("remote raster name `{name}` is empty after sanitizing"));
            }
            if rasters.insert(sanitized.clone(), url.trim().to_string()).is_some() {
                return Err(format!(
                    "remote raster name `{name}` collides with another raster named `{sanitized}`"
                ));
            }
        }
        Ok(Self {
            crop: file.crop,
            geometry_buffer: file.geometry_buffer,
            rasters,
        })
    }
}

impl From<RemoteRasters> for RemoteRastersFile {
    fn from(value: RemoteRasters) -> Self {
        Self {
            crop: value.crop,
            geometry_buffer: value.geometry_buffer,
            rasters: value
                .rasters
                .into_iter()
                .map(|(name, url)| (name, serde_yaml::Value::String(url)))
                .collect(),
        }
    }
}

/// Lowercases, trims and replaces spaces with underscores.
#[must_use]
pub fn sanitize_raster_name(name: &str) -> String {
    name.trim().to_lowercase().replace(' ', "_")
}

fn yaml_type_name(value: &serde_yaml::Value) -> &'static str {
    match value {
        serde_yaml::Value::Null => "null",
        serde_yaml::Value::Bool(_) => "a boolean",
        serde_yaml::Value::Number(_) => "a number",
        serde_yaml::Value::String(_) => "a string",
        serde_yaml::Value::Sequence(_) => "a list",
        serde_yaml::Value::Mapping(_) => "a mapping",
        serde_yaml::Value::Tagged(_) => "a tagged value",
    }
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Parses, normalizes and validates a YAML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed YAML or schema type
    /// mismatches and [`ConfigError::Invalid`] for rule violations.
    #[instrument(level = "debug", skip(text), fields(bytes = text.len()))]
    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yaml::from_str(text).map_err(ConfigError::parse)?;
        config.normalize();
        config.validate()?;
        debug!(project = %config.project.name, "config parsed");
        Ok(config)
    }

    /// Serializes the config to YAML.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Serialize`] if serialization fails.
    pub fn to_yaml_string(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(self).map_err(|source| ConfigError::Serialize { source })
    }

    /// Applies implied settings: `streamflow.use_col` turns `within_aoi` off.
    pub fn normalize(&mut self) {
        if let Some(streamflow) = self.streamflow.as_mut()
            && streamflow.use_col.is_some()
        {
            streamflow.within_aoi = false;
        }
    }

    /// Directory that holds every output of this project.
    #[must_use]
    pub fn project_dir(&self) -> PathBuf {
        self.project
            .data_dir
            .join(self.project.name.trim().replace(' ', "_"))
    }

    /// Names of the configured remote rasters.
    #[must_use]
    pub fn raster_names(&self) -> Vec<String> {
        self.remote_rasters
            .as_ref()
            .map(|rasters| rasters.rasters.keys().cloned().collect())
            .unwrap_or_default()
    }
}

/// Reads a configuration file and returns a validated [`Config`].
///
/// # Errors
///
/// Returns [`ConfigError::Read`] if the file cannot be read, otherwise the
/// errors of [`Config::from_yaml_str`].
#[instrument(level = "debug", skip_all, fields(path = %path.as_ref().display()))]
pub fn read_config(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|e| ConfigError::read(path, e))?;
    Config::from_yaml_str(&text)
}

/// Writes a [`Config`] as YAML.
///
/// # Errors
///
/// Returns [`ConfigError::Serialize`] or [`ConfigError::Write`].
pub fn write_config(config: &Config, path: impl AsRef<Path>) -> Result<(), ConfigError> {
    let path = path.as_ref();
    let text = config.to_yaml_string()?;
    std::fs::write(path, text).map_err(|e| ConfigError::write(path, e))
}

/// Dates accept `YYYY-MM-DD` and ISO datetimes; they are written as dates.
mod date_format {
    use chrono::{NaiveDate, NaiveDateTime};
    use serde::{Deserialize, Deserializer, Serializer};

    const DATE: &str = "%Y-%m-%d";
    const DATETIME_FORMATS: [&str; 3] = ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M"];

    pub fn serialize<S: Serializer>(date: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&date.format(DATE).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDate, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(raw.trim()).ok_or_else(|| {
            serde::de::Error::custom(format!(
                "invalid date `{raw}`, expected YYYY-MM-DD or YYYY-MM-DDTHH:MM:SS"
            ))
        })
    }

    pub(super) fn parse(raw: &str) -> Option<NaiveDate> {
        if let Ok(date) = NaiveDate::parse_from_str(raw, DATE) {
            return Some(date);
        }
        let raw = raw.trim_end_matches('Z');
        DATETIME_FORMATS
            .iter()
            .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
            .map(|datetime| datetime.date())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const MINIMAL: &str = r"
project:
  name: Test Project
  data_dir: /tmp/hysetter
aoi:
  huc_ids: ['1503']
";

    #[test]
    fn test_minimal_config_parses() {
        let config = Config::from_yaml_str(MINIMAL).unwrap();
        assert_eq!(config.project.name, "Test Project");
        assert!(!config.overwrite);
        assert!(config.forcing.is_none());
        assert_eq!(
            config.aoi.source().unwrap(),
            AoiSource::Hucs(&["1503".to_string()])
        );
    }

    #[test]
    fn test_project_dir_replaces_spaces() {
        let config = Config::from_yaml_str(MINIMAL).unwrap();
        assert_eq!(
            config.project_dir(),
            PathBuf::from("/tmp/hysetter/Test_Project")
        );
    }

    #[test]
    fn test_forcing_defaults_and_dates() {
        let text = format!(
            "{MINIMAL}forcing:\n  source: gridmet\n  start_date: 2020-01-01\n  end_date: '2020-01-05T00:00:00'\n"
        );
        let config = Config::from_yaml_str(&text).unwrap();
        let forcing = config.forcing.unwrap();
        assert_eq!(forcing.source, ForcingSource::Gridmet);
        assert!(forcing.crop);
        assert!(forcing.geometry_buffer.abs() < f64::EPSILON);
        assert_eq!(forcing.start_date, NaiveDate::from_ymd_opt(2020, 1, 1).unwrap());
        assert_eq!(forcing.end_date, NaiveDate::from_ymd_opt(2020, 1, 5).unwrap());
    }

    #[test]
    fn test_integer_geometry_buffer_accepted() {
        let text = format!("{MINIMAL}topo:\n  resolution_m: 30\n  geometry_buffer: 100\n");
        let config = Config::from_yaml_str(&text).unwrap();
        assert!((config.topo.unwrap().geometry_buffer - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_unknown_forcing_source_rejected() {
        let text = format!(
            "{MINIMAL}forcing:\n  source: prism\n  start_date: 2020-01-01\n  end_date: 2020-01-05\n"
        );
        let err = Config::from_yaml_str(&text).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }), "got {err:?}");
    }

    #[test]
    fn test_unknown_top_level_key_rejected() {
        let text = format!("{MINIMAL}landcover:\n  cover: [2019]\n");
        assert!(matches!(
            Config::from_yaml_str(&text),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_use_col_disables_within_aoi() {
        let text = format!(
            "{MINIMAL}streamflow:\n  start_date: 2020-01-01\n  end_date: 2020-02-01\n  frequency: daily\n  within_aoi: true\n  use_col: gage_id\n"
        );
        let config = Config::from_yaml_str(&text).unwrap();
        let streamflow = config.streamflow.unwrap();
        assert!(!streamflow.within_aoi);
        assert_eq!(streamflow.frequency.service_code(), "dv");
    }

    #[test]
    fn test_remote_raster_names_sanitized_and_urls_stripped() {
        let text = format!(
            "{MINIMAL}remote_rasters:\n  crop: false\n  'My Raster ': '  https://example.com/a.tif  '\n"
        );
        let config = Config::from_yaml_str(&text).unwrap();
        let rasters = config.remote_rasters.unwrap();
        assert!(!rasters.crop);
        assert_eq!(
            rasters.rasters.get("my_raster").map(String::as_str),
            Some("https://example.com/a.tif")
        );
    }

    #[test]
    fn test_remote_raster_non_string_url_rejected() {
        let text = format!("{MINIMAL}remote_rasters:\n  dem: 42\n");
        let err = Config::from_yaml_str(&text).unwrap_err();
        assert!(err.to_string().contains("must be a string"), "got {err}");
    }

    #[test]
    fn test_nlcd_default_layer_is_latest_cover() {
        let nlcd = Nlcd::default();
        assert_eq!(nlcd.requested_layers(), vec![(NlcdLayer::Cover, 2021)]);
    }

    #[test]
    fn test_nlcd_requested_layers_in_layer_order() {
        let nlcd = Nlcd {
            canopy: Some(vec![2016]),
            cover: Some(vec![2019, 2021]),
            ..Nlcd::default()
        };
        assert_eq!(
            nlcd.requested_layers(),
            vec![
                (NlcdLayer::Cover, 2019),
                (NlcdLayer::Cover, 2021),
                (NlcdLayer::Canopy, 2016)
            ]
        );
    }

    #[test]
    fn test_nlcd_repeated_years_requested_once() {
        let nlcd = Nlcd {
            cover: Some(vec![2019, 2021, 2019]),
            ..Nlcd::default()
        };
        assert_eq!(
            nlcd.requested_layers(),
            vec![(NlcdLayer::Cover, 2019), (NlcdLayer::Cover, 2021)]
        );
    }

    #[test]
    fn test_mainstem_tributaries_source() {
        let aoi = Aoi {
            mainstem_tributaries: Some(323_742),
            ..Aoi::default()
        };
        assert_eq!(
            aoi.source().unwrap(),
            AoiSource::Mainstem {
                id: 323_742,
                navigation: Navigation::UpstreamTributaries
            }
        );
        assert!(aoi.is_mainstem());
    }

    #[test]
    fn test_empty_list_does_not_count_as_source() {
        let aoi = Aoi {
            huc_ids: Some(Vec::new()),
            nhdv2_ids: Some(vec![1_234]),
            ..Aoi::default()
        };
        assert_eq!(aoi.source().unwrap(), AoiSource::Catchments(&[1_234]));
    }

    #[test]
    fn test_write_then_read_preserves_requests() {
        let dir = tempfile::TempDir::new().unwrap();
        let text = format!(
            "{MINIMAL}nid:\n  within_aoi: true\nremote_rasters:\n  slope: https://example.com/s.tif\n"
        );
        let config = Config::from_yaml_str(&text).unwrap();
        let path = dir.path().join("config.yml");
        write_config(&config, &path).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("data_dir: /tmp/hysetter"), "{written}");
        let reread = read_config(&path).unwrap();
        assert!(reread.nid.as_ref().unwrap().within_aoi);
        assert_eq!(reread.raster_names(), vec!["slope".to_string()]);
    }

    #[test]
    fn test_date_parse_accepts_zulu_datetime() {
        assert_eq!(
            date_format::parse("2021-03-04T10:00:00Z"),
            NaiveDate::from_ymd_opt(2021, 3, 4)
        );
        assert!(date_format::parse("03/04/2021").is_none());
    }
}
