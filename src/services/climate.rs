//! Climate forcing requests: Daymet, gridMET and NLDAS-2.
//!
//! Daymet and gridMET are subset server side by the THREDDS NetCDF
//! subset service, one NetCDF file per variable (and per year for
//! Daymet). NLDAS-2 comes from the data rods service as one CSV time
//! series per variable at the request-area center.

use chrono::{Datelike, NaiveDate};

use super::{FileRequest, ServiceEndpoints, ServiceError, build_url};
use crate::config::{Forcing, ForcingSource};
use crate::geometry::{BBox, RequestArea};
use crate::layout::names;

/// Daymet v4 daily variables.
const DAYMET_VARIABLES: &[&str] = &["dayl", "prcp", "srad", "swe", "tmax", "tmin", "vp"];

/// gridMET short names and the variable names inside the aggregated
/// NetCDF files.
const GRIDMET_VARIABLES: &[(&str, &str)] = &[
    ("pr", "precipitation_amount"),
    ("rmax", "daily_maximum_relative_humidity"),
    ("rmin", "daily_minimum_relative_humidity"),
    ("sph", "daily_mean_specific_humidity"),
    ("srad", "daily_mean_shortwave_radiation_at_surface"),
    ("th", "daily_mean_wind_direction"),
    ("tmmn", "daily_minimum_temperature"),
    ("tmmx", "daily_maximum_temperature"),
    ("vs", "daily_mean_wind_speed"),
    ("bi", "daily_mean_burning_index_g"),
    ("fm100", "dead_fuel_moisture_100hr"),
    ("fm1000", "dead_fuel_moisture_1000hr"),
    ("erc", "daily_mean_energy_release_component-g"),
    ("etr", "daily_mean_reference_evapotranspiration_alfalfa"),
    ("pet", "daily_mean_reference_evapotranspiration_grass"),
    ("vpd", "daily_mean_vapor_pressure_deficit"),
];

/// NLDAS-2 short names and the data rods field names.
const NLDAS_VARIABLES: &[(&str, &str)] = &[
    ("prcp", "Rainf"),
    ("pet", "PotEvap"),
    ("temp", "Tair"),
    ("wind_u", "Wind_E"),
    ("wind_v", "Wind_N"),
    ("rlds", "LWdown"),
    ("rsds", "SWdown"),
    ("humidity", "Qair"),
    ("psurf", "PSurf"),
];

/// Variable names a forcing source accepts, in default request order.
#[must_use]
pub fn variable_catalog(source: ForcingSource) -> Vec<&'static str> {
    let table = match source {
        ForcingSource::Daymet => return DAYMET_VARIABLES.to_vec(),
        ForcingSource::Gridmet => GRIDMET_VARIABLES,
        ForcingSource::Nldas2 => NLDAS_VARIABLES,
    };
    table.iter().map(|(short, _)| *short).collect()
}

fn lookup(table: &[(&str, &'static str)], name: &str) -> Option<&'static str> {
    table.iter().find(|(short, _)| *short == name).map(|(_, long)| *long)
}

/// Every file to download for geometry `index`.
///
/// # Errors
///
/// Returns [`ServiceError::InvalidRequest`] for an unknown variable or a
/// bad base URL.
pub fn requests(
    endpoints: &ServiceEndpoints,
    forcing: &Forcing,
    index: usize,
    area: &RequestArea,
) -> Result<Vec<FileRequest>, ServiceError> {
    let variables: Vec<&str> = match &forcing.variables {
        Some(vars) => vars.iter().map(String::as_str).collect(),
        None => variable_catalog(forcing.source),
    };
    let mut out = Vec::new();
    for variable in variables {
        match forcing.source {
            ForcingSource::Daymet => {
                for year in forcing.start_date.year()..=forcing.end_date.year() {
                    out.push(daymet_request(endpoints, forcing, index, &area.bbox, variable, year)?);
                }
            }
            ForcingSource::Gridmet => {
                out.push(gridmet_request(endpoints, forcing, index, &area.bbox, variable)?);
            }
            ForcingSource::Nldas2 => {
                out.push(nldas_request(endpoints, forcing, index, &area.bbox, variable)?);
            }
        }
    }
    Ok(out)
}

fn ncss_box(bbox: &BBox) -> [(&'static str, String); 4] {
    [
        ("north", format!("{:.6}", bbox.north)),
        ("west", format!("{:.6}", bbox.west)),
        ("east", format!("{:.6}", bbox.east)),
        ("south", format!("{:.6}", bbox.south)),
    ]
}

fn daymet_request(
    endpoints: &ServiceEndpoints,
    forcing: &Forcing,
    index: usize,
    bbox: &BBox,
    variable: &str,
    year: i32,
) -> Result<FileRequest, ServiceError> {
    let first = NaiveDate::from_ymd_opt(year, 1, 1).unwrap_or(forcing.start_date);
    let last = NaiveDate::from_ymd_opt(year, 12, 31).unwrap_or(forcing.end_date);
    let start = forcing.start_date.max(first);
    let end = forcing.end_date.min(last);
    let mut query = vec![("var", variable.to_string())];
    query.extend(ncss_box(bbox));
    query.extend([
        ("horizStride", "1".to_string()),
        ("time_start", format!("{}T12:00:00Z", start.format("%Y-%m-%d"))),
        ("time_end", format!("{}T12:00:00Z", end.format("%Y-%m-%d"))),
        ("timeStride", "1".to_string()),
        ("accept", "netcdf".to_string()),
    ]);
    let dataset = format!("daymet_v4_daily_na_{variable}_{year}.nc");
    Ok(FileRequest {
        url: build_url("Daymet", &endpoints.daymet, &[&dataset], &query)?,
        file_name: names::forcing(ForcingSource::Daymet, index, variable, Some(year), "nc"),
    })
}

fn gridmet_request(
    endpoints: &ServiceEndpoints,
    forcing: &Forcing,
    index: usize,
    bbox: &BBox,
    variable: &str,
) -> Result<FileRequest, ServiceError> {
    let long_name = lookup(GRIDMET_VARIABLES, variable).ok_or_else(|| {
        ServiceError::invalid_request("gridMET", format!("unknown variable {variable}"))
    })?;
    let mut query = vec![("var", long_name.to_string())];
    query.extend(ncss_box(bbox));
    query.extend([
        ("horizStride", "1".to_string()),
        ("time_start", format!("{}T00:00:00Z", forcing.start_date.format("%Y-%m-%d"))),
        ("time_end", format!("{}T00:00:00Z", forcing.end_date.format("%Y-%m-%d"))),
        ("timeStride", "1".to_string()),
        ("disableLLSubset", "on".to_string()),
        ("disableProjSubset", "on".to_string()),
        ("accept", "netcdf".to_string()),
    ]);
    let dataset = format!("agg_met_{variable}_1979_CurrentYear_CONUS.nc");
    Ok(FileRequest {
        url: build_url("gridMET", &endpoints.gridmet, &[&dataset], &query)?,
        file_name: names::forcing(ForcingSource::Gridmet, index, variable, None, "nc"),
    })
}

fn nldas_request(
    endpoints: &ServiceEndpoints,
    forcing: &Forcing,
    index: usize,
    bbox: &BBox,
    variable: &str,
) -> Result<FileRequest, ServiceError> {
    let field = lookup(NLDAS_VARIABLES, variable).ok_or_else(|| {
        ServiceError::invalid_request("NLDAS-2", format!("unknown variable {variable}"))
    })?;
    let center = bbox.center();
    let query = [
        ("variable", format!("NLDAS2:NLDAS_FORA0125_H_v2.0:{field}")),
        ("type", "asc2".to_string()),
        ("location", format!("GEOM:POINT({:.4}, {:.4})", center.lon, center.lat)),
        ("startDate", format!("{}T00", forcing.start_date.format("%Y-%m-%d"))),
        ("endDate", format!("{}T23", forcing.end_date.format("%Y-%m-%d"))),
    ];
    Ok(FileRequest {
        url: build_url("NLDAS-2", &endpoints.nldas2, &[], &query)?,
        file_name: names::forcing(ForcingSource::Nldas2, index, variable, None, "csv"),
    })
}
