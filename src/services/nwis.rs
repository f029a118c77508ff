//! NWIS water services: gauge discovery and streamflow.
//!
//! Site discovery uses the RDB (tab separated) site service; streamflow
//! comes from the daily (`dv`) or instantaneous (`iv`) JSON services for
//! discharge (`00060`).

use chrono::NaiveDate;
use serde_json::Value;
use tracing::{debug, instrument};

use super::{ServiceError, build_url};
use crate::config::Frequency;
use crate::download::HttpClient;
use crate::geometry::BBox;

const SERVICE: &str = "NWIS";

/// Discharge parameter code.
pub const DISCHARGE: &str = "00060";

/// Largest number of sites per streamflow request.
pub const MAX_SITES_PER_REQUEST: usize = 100;

/// A stream gauge.
#[derive(Debug, Clone, PartialEq)]
pub struct Site {
    /// Site number, zero padded.
    pub site_no: String,
    /// Station name.
    pub name: String,
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lon: f64,
}

/// Pads numeric site numbers shorter than eight digits with leading zeros.
///
/// Ids read from numeric AOI columns lose the leading zero (`1031500` for
/// `01031500`).
#[must_use]
pub fn normalize_site_id(raw: &str) -> String {
    let id = raw.trim();
    let id = id.strip_suffix(".0").unwrap_or(id);
    if !id.is_empty() && id.len() < 8 && id.bytes().all(|b| b.is_ascii_digit()) {
        format!("{id:0>8}")
    } else {
        id.to_string()
    }
}

/// Parses an RDB site listing into sites with valid coordinates.
///
/// # Errors
///
/// Returns [`ServiceError::UnexpectedResponse`] when the header lacks the
/// site number or coordinate columns.
pub fn parse_site_rdb(text: &str) -> Result<Vec<Site>, ServiceError> {
    let mut lines = text.lines().filter(|l| !l.starts_with('#') && !l.trim().is_empty());
    let Some(header) = lines.next() else {
        return Ok(Vec::new());
    };
    let columns: Vec<&str> = header.split('\t').collect();
    let position = |name: &str| {
        columns
            .iter()
            .position(|c| *c == name)
            .ok_or_else(|| ServiceError::unexpected(SERVICE, format!("RDB has no `{name}` column")))
    };
    let site_col = position("site_no")?;
    let lat_col = position("dec_lat_va")?;
    let lon_col = position("dec_long_va")?;
    let name_col = columns.iter().position(|c| *c == "station_nm");

    // The line after the header holds column widths (`5s 15s ...`)
    let sites = lines
        .skip(1)
        .filter_map(|line| {
            let fields: Vec<&str> = line.split('\t').collect();
            let lat = fields.get(lat_col)?.trim().parse::<f64>().ok()?;
            let lon = fields.get(lon_col)?.trim().parse::<f64>().ok()?;
            Some(Site {
                site_no: normalize_site_id(fields.get(site_col)?),
                name: name_col
                    .and_then(|i| fields.get(i))
                    .map(|s| s.trim().to_string())
                    .unwrap_or_default(),
                lat,
                lon,
            })
        })
        .collect();
    Ok(sites)
}

/// Number of time series in a (merged) streamflow document.
#[must_use]
pub fn series_count(document: &Value) -> usize {
    document
        .pointer("/value/timeSeries")
        .and_then(Value::as_array)
        .map_or(0, Vec::len)
}

/// NWIS client.
#[derive(Debug, Clone, Copy)]
pub struct Nwis<'a> {
    http: &'a HttpClient,
    base: &'a str,
}

impl<'a> Nwis<'a> {
    /// Creates a client.
    #[must_use]
    pub fn new(http: &'a HttpClient, base: &'a str) -> Self {
        Self { http, base }
    }

    /// URL listing discharge gauges in `bbox` with `frequency` data.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::InvalidRequest`] for a bad base URL.
    pub fn site_info_url(&self, bbox: &BBox, frequency: Frequency) -> Result<String, ServiceError> {
        let code = frequency.service_code();
        build_url(
            SERVICE,
            self.base,
            &["site", ""],
            &[
                ("format", "rdb".to_string()),
                ("bBox", bbox.to_query()),
                ("parameterCd", DISCHARGE.to_string()),
                ("outputDataTypeCd", code.to_string()),
                ("hasDataTypeCd", code.to_string()),
                ("siteStatus", "all".to_string()),
            ],
        )
    }

    /// Discharge gauges inside `bbox`; NWIS answers 404 when there are
    /// none, which is returned as an empty list.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] for other failures.
    #[instrument(level = "debug", skip(self))]
    pub async fn site_info(&self, bbox: &BBox, frequency: Frequency) -> Result<Vec<Site>, ServiceError> {
        let url = self.site_info_url(bbox, frequency)?;
        let text = match self.http.get_text(&url).await {
            Ok(text) => text,
            Err(e) if e.status() == Some(404) => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let sites = parse_site_rdb(&text)?;
        debug!(count = sites.len(), "gauges found");
        Ok(sites)
    }

    /// URL of discharge for `sites` over a period.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::InvalidRequest`] for a bad base URL.
    pub fn streamflow_url(
        &self,
        sites: &[String],
        start: NaiveDate,
        end: NaiveDate,
        frequency: Frequency,
    ) -> Result<String, ServiceError> {
        build_url(
            SERVICE,
            self.base,
            &[frequency.service_code(), ""],
            &[
                ("format", "json".to_string()),
                ("sites", sites.join(",")),
                ("startDT", start.format("%Y-%m-%d").to_string()),
                ("endDT", end.format("%Y-%m-%d").to_string()),
                ("parameterCd", DISCHARGE.to_string()),
                ("siteStatus", "all".to_string()),
            ],
        )
    }

    /// Discharge for `sites`, requested in chunks of
    /// [`MAX_SITES_PER_REQUEST`] and merged into one WaterML-JSON document.
    ///
    /// Chunks NWIS answers with 404 contribute nothing. Returns `None` when
    /// no chunk produced a document.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] for other failures.
    #[instrument(level = "debug", skip(self, sites), fields(sites = sites.len()))]
    pub async fn streamflow(
        &self,
        sites: &[String],
        start: NaiveDate,
        end: NaiveDate,
        frequency: Frequency,
    ) -> Result<Option<Value>, ServiceError> {
        let mut merged: Option<Value> = None;
        for chunk in sites.chunks(MAX_SITES_PER_REQUEST) {
            let url = self.streamflow_url(chunk, start, end, frequency)?;
            let document = match self.http.get_json(&url).await {
                Ok(document) => document,
                Err(e) if e.status() == Some(404) => continue,
                Err(e) => return Err(e.into()),
            };
            merged = Some(match merged {
                None => document,
                Some(mut acc) => {
                    append_series(&mut acc, document)?;
                    acc
                }
            });
        }
        Ok(merged)
    }
}

fn append_series(acc: &mut Value, mut document: Value) -> Result<(), ServiceError> {
    let incoming = match document.pointer_mut("/value/timeSeries").map(Value::take) {
        Some(Value::Array(series)) => series,
        _ => return Err(ServiceError::unexpected(SERVICE, "missing value.timeSeries")),
    };
    match acc.pointer_mut("/value/timeSeries") {
        Some(Value::Array(series)) => {
            series.extend(incoming);
            Ok(())
        }
        _ => Err(ServiceError::unexpected(SERVICE, "missing value.timeSeries")),
    }
}
