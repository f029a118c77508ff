//! Project directory layout and per-geometry file names.
//!
//! Every output lands at a path that depends only on the config and the
//! AOI feature index, so a rerun can tell finished work from missing work
//! by checking whether the file exists.
//!
//! ```text
//! <data_dir>/<project_name>/
//!   aoi.geojson
//!   nhdv2_flowlines/aoi_geom_0.geojson, streamcat_geom_0.json, nldi_geom_0.json
//!   forcing/daymet_geom_0_prcp_2020.nc
//!   topo/topo_geom_0.tif, topo_geom_0_slope.tif
//!   soil/soilgrids_geom_0_clay_5.tif
//!   nlcd/nlcd_geom_0_cover_2021.tif
//!   nid/full_nid_inventory.gpkg, nid_geom_0.geojson
//!   streamflow/streamflow_geom_0.json
//!   <raster_name>/<raster_name>_geom_0.tif
//! ```

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{info, instrument};

use crate::config::{Config, ForcingSource, NlcdLayer, SoilSource};
use crate::terrain::DerivedVariable;

/// Directory holding the remote rasters when none are configured.
const DEFAULT_RASTER_DIR: &str = "rasters";

/// A category's output directory. File names inside it come from
/// [`names`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputDir {
    path: PathBuf,
}

impl OutputDir {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of `name` inside the directory.
    #[must_use]
    pub fn join(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }
}

/// Every output location of a project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePaths {
    /// `<data_dir>/<name with spaces replaced>`.
    pub project: PathBuf,
    /// AOI feature collection.
    pub aoi: PathBuf,
    /// Per-geometry flowlines and their attributes.
    pub flowlines: OutputDir,
    /// Flowlines of a mainstem AOI.
    pub mainstem_flowlines: PathBuf,
    /// StreamCat metrics of a mainstem AOI.
    pub mainstem_streamcat: PathBuf,
    /// NLDI characteristics of a mainstem AOI.
    pub mainstem_nldi: PathBuf,
    /// Climate forcing.
    pub forcing: OutputDir,
    /// DEM and derived rasters.
    pub topo: OutputDir,
    /// Soil rasters.
    pub soil: OutputDir,
    /// Land cover rasters.
    pub nlcd: OutputDir,
    /// Dam inventory and per-geometry dams.
    pub nid: OutputDir,
    /// Streamflow observations.
    pub streamflow: OutputDir,
    /// One directory per remote raster name.
    pub remote_rasters: BTreeMap<String, OutputDir>,
}

impl FilePaths {
    /// Derives the layout from a config.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let project = config.project_dir();
        let names = config.raster_names();
        let remote_rasters = if names.is_empty() {
            BTreeMap::from([(
                DEFAULT_RASTER_DIR.to_string(),
                OutputDir::new(project.join(DEFAULT_RASTER_DIR)),
            )])
        } else {
            names
                .into_iter()
                .map(|name| {
                    let dir = OutputDir::new(project.join(&name));
                    (name, dir)
                })
                .collect()
        };
        Self {
            aoi: project.join("aoi.geojson"),
            flowlines: OutputDir::new(project.join("nhdv2_flowlines")),
            mainstem_flowlines: project.join("flowlines.geojson"),
            mainstem_streamcat: project.join("streamcat_attrs.json"),
            mainstem_nldi: project.join("nldi_attrs.json"),
            forcing: OutputDir::new(project.join("forcing")),
            topo: OutputDir::new(project.join("topo")),
            soil: OutputDir::new(project.join("soil")),
            nlcd: OutputDir::new(project.join("nlcd")),
            nid: OutputDir::new(project.join("nid")),
            streamflow: OutputDir::new(project.join("streamflow")),
            remote_rasters,
            project,
        }
    }

    /// Removes the whole project tree.
    ///
    /// # Errors
    ///
    /// Returns the underlying IO error.
    #[instrument(level = "debug", skip(self), fields(project = %self.project.display()))]
    pub fn rm_tree(&self) -> io::Result<()> {
        if self.project.exists() {
            info!(project = %self.project.display(), "removing existing project data");
        }
        remove_dir_if_exists(&self.project)
    }
}

fn remove_dir_if_exists(path: &Path) -> io::Result<()> {
    match std::fs::remove_dir_all(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// File names of every per-geometry output.
pub mod names {
    use super::{DerivedVariable, ForcingSource, NlcdLayer, SoilSource};

    /// Full national dam inventory, as served.
    pub const NID_INVENTORY: &str = "full_nid_inventory.gpkg";

    /// Streamflow of the stations listed in an AOI attribute column.
    pub const STREAMFLOW_BY_COLUMN: &str = "streamflow.json";

    /// Flowlines within geometry `i`.
    #[must_use]
    pub fn flowlines(i: usize) -> String {
        format!("aoi_geom_{i}.geojson")
    }

    /// StreamCat metrics for the flowlines of geometry `i`.
    #[must_use]
    pub fn streamcat(i: usize) -> String {
        format!("streamcat_geom_{i}.json")
    }

    /// NLDI characteristics for the flowlines of geometry `i`.
    #[must_use]
    pub fn nldi(i: usize) -> String {
        format!("nldi_geom_{i}.json")
    }

    /// Forcing variable of geometry `i`; `year` is set for per-year files.
    #[must_use]
    pub fn forcing(
        source: ForcingSource,
        i: usize,
        variable: &str,
        year: Option<i32>,
        extension: &str,
    ) -> String {
        match year {
            Some(year) => format!("{source}_geom_{i}_{variable}_{year}.{extension}"),
            None => format!("{source}_geom_{i}_{variable}.{extension}"),
        }
    }

    /// DEM of geometry `i`.
    #[must_use]
    pub fn topo(i: usize) -> String {
        format!("topo_geom_{i}.tif")
    }

    /// Derived raster of geometry `i`.
    #[must_use]
    pub fn topo_derived(i: usize, variable: DerivedVariable) -> String {
        format!("topo_geom_{i}_{}.tif", variable.as_str())
    }

    /// Soil variable of geometry `i`; `tile` is set for tiled sources.
    #[must_use]
    pub fn soil(source: SoilSource, i: usize, variable: &str, tile: Option<&str>) -> String {
        match tile {
            Some(tile) => format!("{source}_geom_{i}_{variable}_{tile}.tif"),
            None => format!("{source}_geom_{i}_{variable}.tif"),
        }
    }

    /// Land cover layer of geometry `i`.
    #[must_use]
    pub fn nlcd(i: usize, layer: NlcdLayer, year: u16) -> String {
        format!("nlcd_geom_{i}_{}_{year}.tif", layer.as_str())
    }

    /// Dams within geometry `i`.
    #[must_use]
    pub fn nid(i: usize) -> String {
        format!("nid_geom_{i}.geojson")
    }

    /// Streamflow of the stations within geometry `i`.
    #[must_use]
    pub fn streamflow(i: usize) -> String {
        format!("streamflow_geom_{i}.json")
    }

    /// Remote raster clipped to geometry `i`.
    #[must_use]
    pub fn raster(name: &str, i: usize) -> String {
        format!("{name}_geom_{i}.tif")
    }

    /// Remote raster fetched once (no bounding-box placeholder).
    #[must_use]
    pub fn raster_whole(name: &str) -> String {
        format!("{name}.tif")
    }
}
