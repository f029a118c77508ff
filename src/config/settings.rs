//! Runtime settings: the optional `settings:` block of a config file.
//!
//! File values are optional; [`RunSettings`] is the resolved form with
//! defaults filled in. Command-line overrides are applied on top by the
//! binary.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Default number of categories fetched concurrently.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Default number of attempts per HTTP request.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default minimum delay between requests to the same host.
pub const DEFAULT_RATE_LIMIT_MS: u64 = 250;

/// Default HTTP connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default HTTP read timeout (large rasters take a while).
pub const DEFAULT_READ_TIMEOUT_SECS: u64 = 300;

/// `settings:` block as written in the config file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Categories fetched concurrently once the AOI is available (1..=16).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,
    /// Attempts per HTTP request (1..=10).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    /// Minimum delay between requests to one host in ms (0 disables).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit_ms: Option<u64>,
    /// HTTP connect timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect_timeout_secs: Option<u64>,
    /// HTTP read timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_timeout_secs: Option<u64>,
    /// Base URL overrides for the external services.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoints: Option<EndpointOverrides>,
}

/// Base URL overrides, one per external service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EndpointOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub waterdata: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geoconnex: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nldi: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub streamcat: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nwis: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nid_inventory: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nid_features: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threedep: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daymet: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gridmet: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nldas2: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub soilgrids: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub planetary_computer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub polaris: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mrlc: Option<String>,
}

impl EndpointOverrides {
    /// Every `(name, value)` pair that is set.
    pub(crate) fn entries(&self) -> Vec<(&'static str, &str)> {
        [
            ("waterdata", &self.waterdata),
            ("geoconnex", &self.geoconnex),
            ("nldi", &self.nldi),
            ("streamcat", &self.streamcat),
            ("nwis", &self.nwis),
            ("nid_inventory", &self.nid_inventory),
            ("nid_features", &self.nid_features),
            ("threedep", &self.threedep),
            ("daymet", &self.daymet),
            ("gridmet", &self.gridmet),
            ("nldas2", &self.nldas2),
            ("soilgrids", &self.soilgrids),
            ("planetary_computer", &self.planetary_computer),
            ("polaris", &self.polaris),
            ("mrlc", &self.mrlc),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.as_deref().map(|value| (name, value)))
        .collect()
    }
}

impl Settings {
    /// Validates the ranges of every value that is set.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first out-of-range value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range("settings.concurrency", self.concurrency, 1, 16)?;
        check_range("settings.max_retries", self.max_retries, 1, 10)?;
        check_range("settings.rate_limit_ms", self.rate_limit_ms, 0, 60_000)?;
        check_range(
            "settings.connect_timeout_secs",
            self.connect_timeout_secs,
            1,
            3600,
        )?;
        check_range("settings.read_timeout_secs", self.read_timeout_secs, 1, 3600)?;
        if let Some(endpoints) = &self.endpoints {
            for (name, value) in endpoints.entries() {
                if url::Url::parse(value).is_err() {
                    return Err(ConfigError::invalid(
                        format!("settings.endpoints.{name}"),
                        format!("{value}. Expected an absolute URL"),
                    ));
                }
            }
        }
        Ok(())
    }
}

fn check_range<T>(field: &str, value: Option<T>, min: T, max: T) -> Result<(), ConfigError>
where
    T: PartialOrd + std::fmt::Display + Copy,
{
    let Some(value) = value else {
        return Ok(());
    };
    if value < min || value > max {
        return Err(ConfigError::invalid(
            field,
            format!("{value}. Expected range: {min}..={max}"),
        ));
    }
    Ok(())
}

/// Settings with every default resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSettings {
    /// Categories fetched concurrently.
    pub concurrency: usize,
    /// Attempts per HTTP request.
    pub max_retries: u32,
    /// Minimum delay between requests to one host (zero disables).
    pub rate_limit: Duration,
    /// HTTP connect timeout.
    pub connect_timeout: Duration,
    /// HTTP read timeout.
    pub read_timeout: Duration,
    /// Base URL overrides.
    pub endpoints: EndpointOverrides,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            max_retries: DEFAULT_MAX_RETRIES,
            rate_limit: Duration::from_millis(DEFAULT_RATE_LIMIT_MS),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            read_timeout: Duration::from_secs(DEFAULT_READ_TIMEOUT_SECS),
            endpoints: EndpointOverrides::default(),
        }
    }
}

impl RunSettings {
    /// Resolves file settings against the built-in defaults.
    #[must_use]
    pub fn from_settings(settings: Option<&Settings>) -> Self {
        let defaults = Self::default();
        let Some(settings) = settings else {
            return defaults;
        };
        Self {
            concurrency: settings.concurrency.unwrap_or(defaults.concurrency),
            max_retries: settings.max_retries.unwrap_or(defaults.max_retries),
            rate_limit: settings
                .rate_limit_ms
                .map_or(defaults.rate_limit, Duration::from_millis),
            connect_timeout: settings
                .connect_timeout_secs
                .map_or(defaults.connect_timeout, Duration::from_secs),
            read_timeout: settings
                .read_timeout_secs
                .map_or(defaults.read_timeout, Duration::from_secs),
            endpoints: settings.endpoints.clone().unwrap_or_default(),
        }
    }
}
