//! Schema rules that serde alone cannot express.

use chrono::NaiveDate;

use super::{
    Aoi, AoiSource, Config, ConfigError, Forcing, NLCD_CANOPY_YEARS, NLCD_RELEASE_YEARS, Nlcd,
    RemoteRasters, Soil, Streamflow, Topo,
};
use crate::services::{climate, soil};

/// HUC string lengths that map to a WBD level.
const HUC_LENGTHS: [usize; 6] = [2, 4, 6, 8, 10, 12];

impl Config {
    /// Validates every section of the config.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for the first violated rule.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.project.name.trim().is_empty() {
            return Err(ConfigError::invalid("project.name", "must not be blank"));
        }
        if self.project.data_dir.as_os_str().is_empty() {
            return Err(ConfigError::invalid("project.data_dir", "must not be empty"));
        }
        validate_aoi(&self.aoi)?;
        if let Some(forcing) = &self.forcing {
            validate_forcing(forcing)?;
        }
        if let Some(topo) = &self.topo {
            validate_topo(topo)?;
        }
        if let Some(soil) = &self.soil {
            validate_soil(soil)?;
        }
        if let Some(nlcd) = &self.nlcd {
            validate_nlcd(nlcd)?;
        }
        if let Some(streamflow) = &self.streamflow {
            validate_streamflow(streamflow)?;
        }
        if let Some(rasters) = &self.remote_rasters {
            validate_rasters(rasters)?;
        }
        if let Some(settings) = &self.settings {
            settings.validate()?;
        }
        Ok(())
    }
}

fn validate_aoi(aoi: &Aoi) -> Result<(), ConfigError> {
    if let AoiSource::Hucs(ids) = aoi.source()? {
        for id in ids {
            if !HUC_LENGTHS.contains(&id.len()) || !id.chars().all(|c| c.is_ascii_digit()) {
                return Err(ConfigError::invalid(
                    "aoi.huc_ids",
                    format!("{id}. Expected digit strings of length 2, 4, 6, 8, 10, or 12"),
                ));
            }
        }
    }
    for (field, names) in [
        ("aoi.streamcat_attrs", aoi.streamcat()),
        ("aoi.nldi_attrs", aoi.nldi()),
    ] {
        if names.iter().any(|name| name.trim().is_empty()) {
            return Err(ConfigError::invalid(field, "attribute names must not be blank"));
        }
    }
    Ok(())
}

fn validate_buffer(field: &str, buffer: f64) -> Result<(), ConfigError> {
    if !buffer.is_finite() || buffer < 0.0 {
        return Err(ConfigError::invalid(
            field,
            format!("{buffer}. Expected a finite value >= 0"),
        ));
    }
    Ok(())
}

fn validate_period(section: &str, start: NaiveDate, end: NaiveDate) -> Result<(), ConfigError> {
    if start > end {
        return Err(ConfigError::invalid(
            format!("{section}.start_date"),
            format!("{start} is after end_date {end}"),
        ));
    }
    Ok(())
}

fn validate_forcing(forcing: &Forcing) -> Result<(), ConfigError> {
    validate_buffer("forcing.geometry_buffer", forcing.geometry_buffer)?;
    validate_period("forcing", forcing.start_date, forcing.end_date)?;
    if let Some(variables) = &forcing.variables {
        if variables.is_empty() {
            return Err(ConfigError::invalid(
                "forcing.variables",
                "must list at least one variable when present",
            ));
        }
        let catalog = climate::variable_catalog(forcing.source);
        if let Some(unknown) = variables.iter().find(|v| !catalog.contains(&v.as_str())) {
            return Err(ConfigError::invalid(
                "forcing.variables",
                format!(
                    "{unknown} is not a {} variable. Expected one of: {}",
                    forcing.source.display_name(),
                    catalog.join(", ")
                ),
            ));
        }
    }
    Ok(())
}

fn validate_topo(topo: &Topo) -> Result<(), ConfigError> {
    validate_buffer("topo.geometry_buffer", topo.geometry_buffer)?;
    if topo.resolution_m == 0 {
        return Err(ConfigError::invalid(
            "topo.resolution_m",
            "0. Expected a positive resolution in meters",
        ));
    }
    Ok(())
}

fn validate_soil(soil_cfg: &Soil) -> Result<(), ConfigError> {
    validate_buffer("soil.geometry_buffer", soil_cfg.geometry_buffer)?;
    if soil_cfg.variables.is_empty() {
        return Err(ConfigError::invalid(
            "soil.variables",
            "must list at least one variable",
        ));
    }
    for variable in &soil_cfg.variables {
        soil::check_variable(soil_cfg.source, variable)
            .map_err(|message| ConfigError::invalid("soil.variables", message))?;
    }
    Ok(())
}

fn validate_nlcd(nlcd: &Nlcd) -> Result<(), ConfigError> {
    validate_buffer("nlcd.geometry_buffer", nlcd.geometry_buffer)?;
    for (field, years) in [
        ("nlcd.cover", &nlcd.cover),
        ("nlcd.impervious", &nlcd.impervious),
        ("nlcd.descriptor", &nlcd.descriptor),
    ] {
        if let Some(year) = years
            .iter()
            .flatten()
            .find(|year| !NLCD_RELEASE_YEARS.contains(year))
        {
            return Err(ConfigError::invalid(
                field,
                format!(
                    "{year}. Expected one of: {}",
                    NLCD_RELEASE_YEARS.map(|y| y.to_string()).join(", ")
                ),
            ));
        }
    }
    if let Some(year) = nlcd
        .canopy
        .iter()
        .flatten()
        .find(|year| !NLCD_CANOPY_YEARS.contains(year))
    {
        return Err(ConfigError::invalid(
            "nlcd.canopy",
            format!(
                "{year}. Expected range: {}..={}",
                NLCD_CANOPY_YEARS.start(),
                NLCD_CANOPY_YEARS.end()
            ),
        ));
    }
    Ok(())
}

fn validate_streamflow(streamflow: &Streamflow) -> Result<(), ConfigError> {
    validate_period("streamflow", streamflow.start_date, streamflow.end_date)?;
    if let Some(column) = &streamflow.use_col
        && column.trim().is_empty()
    {
        return Err(ConfigError::invalid(
            "streamflow.use_col",
            "must name an AOI attribute",
        ));
    }
    Ok(())
}

fn validate_rasters(rasters: &RemoteRasters) -> Result<(), ConfigError> {
    validate_buffer("remote_rasters.geometry_buffer", rasters.geometry_buffer)?;
    for (name, url) in &rasters.rasters {
        let sample = crate::services::rasters::fill_template(url, &crate::BBox::new(0.0, 0.0, 1.0, 1.0));
        if url::Url::parse(&sample).is_err() {
            return Err(ConfigError::invalid(
                format!("remote_rasters.{name}"),
                format!("{url}. Expected an absolute URL"),
            ));
        }
    }
    Ok(())
}
