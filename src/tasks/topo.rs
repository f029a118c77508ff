//! 3DEP DEM per AOI geometry and the rasters derived from it.
//!
//! The DEM is exported as a float GeoTIFF, masked to the geometry when
//! `crop` is set, then slope, aspect or curvature are computed from the
//! masked grid. Raster work runs on the blocking pool.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use super::{DataCategory, DataTask, Fetched, TaskContext, TaskError, TaskReport, create_dir};
use crate::config::Topo;
use crate::geometry::{Feature, RequestArea};
use crate::layout::names;
use crate::terrain::{DerivedVariable, read_geotiff, write_geotiff};

/// DEM and derived rasters for every AOI geometry.
#[derive(Debug, Default)]
pub(crate) struct TopoTask;

#[async_trait]
impl DataTask for TopoTask {
    fn category(&self) -> DataCategory {
        DataCategory::Topo
    }

    fn description(&self, _ctx: &TaskContext) -> String {
        "Getting DEM from 3DEP".to_string()
    }

    #[instrument(level = "debug", skip_all)]
    async fn run(&self, ctx: &TaskContext) -> Result<TaskReport, TaskError> {
        let topo = ctx.config.topo.as_ref().ok_or(TaskError::NotConfigured {
            category: DataCategory::Topo,
        })?;
        let geometries = ctx.load_aoi().await?;
        let dir = ctx.paths.topo.path();
        create_dir(dir).await?;

        let description = self.description(ctx);
        info!(geometries = geometries.len(), resolution_m = topo.resolution_m, "{description}");
        let progress = ctx.progress.start(description, geometries.len());
        let mut report = TaskReport::default();

        for (index, feature) in geometries.features.iter().enumerate() {
            fetch_geometry(ctx, topo, dir, index, feature, &mut report).await;
            progress.inc();
        }
        progress.finish();
        Ok(report)
    }
}

async fn fetch_geometry(
    ctx: &TaskContext,
    topo: &Topo,
    dir: &Path,
    index: usize,
    feature: &Feature,
    report: &mut TaskReport,
) {
    let dem_path = dir.join(names::topo(index));
    let mut missing = Vec::new();
    for variable in topo.derived_variables.iter().flatten() {
        let path = dir.join(names::topo_derived(index, *variable));
        if !report.skip_existing(&path) {
            missing.push((*variable, path));
        }
    }
    let dem_cached = report.skip_existing(&dem_path);
    if dem_cached && missing.is_empty() {
        return;
    }

    let area = match RequestArea::for_feature(feature, index, topo.crop, topo.geometry_buffer) {
        Ok(area) => area,
        Err(error) => {
            report.record(DataCategory::Topo, index, "DEM", Err(error.into()));
            return;
        }
    };

    if !dem_cached {
        let exported = ctx
            .services
            .threedep()
            .export_dem(&area.bbox, topo.resolution_m, &dem_path)
            .await;
        if let Err(error) = exported {
            report.record(DataCategory::Topo, index, "DEM", Err(error.into()));
            return;
        }
    }

    let mask = (topo.crop && !dem_cached).then_some(area);
    let processed = process_dem(dem_path.clone(), mask, missing).await;
    match processed {
        Ok(derived) => {
            if !dem_cached {
                report.record(DataCategory::Topo, index, "DEM", Ok(Fetched::Written(dem_path)));
            }
            for path in derived {
                report.record(DataCategory::Topo, index, "derived variable", Ok(Fetched::Written(path)));
            }
        }
        Err(error) => {
            if !dem_cached {
                // A DEM that was never masked must not look finished on rerun.
                if let Err(e) = tokio::fs::remove_file(&dem_path).await {
                    warn!(path = %dem_path.display(), error = %e, "could not remove unprocessed DEM");
                }
            }
            report.record(DataCategory::Topo, index, "DEM", Err(error));
        }
    }
}

/// Masks the DEM in place when `mask` is set and writes each missing
/// derived raster. Returns the derived paths written.
async fn process_dem(
    dem_path: PathBuf,
    mask: Option<RequestArea>,
    missing: Vec<(DerivedVariable, PathBuf)>,
) -> Result<Vec<PathBuf>, TaskError> {
    if mask.is_none() && missing.is_empty() {
        return Ok(Vec::new());
    }
    tokio::task::spawn_blocking(move || {
        let mut dem = read_geotiff(&dem_path)?;
        if let Some(area) = mask {
            let masked = dem.mask_outside(&area);
            debug!(masked, path = %dem_path.display(), "masked DEM cells outside the geometry");
            write_geotiff(&dem, &dem_path)?;
        }
        let mut written = Vec::with_capacity(missing.len());
        for (variable, path) in missing {
            write_geotiff(&dem.derive(variable), &path)?;
            written.push(path);
        }
        Ok(written)
    })
    .await
    .map_err(|e| TaskError::Aborted {
        category: DataCategory::Topo,
        message: e.to_string(),
    })?
}
