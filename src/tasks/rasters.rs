//! User-configured remote rasters.
//!
//! A URL template with bounding-box placeholders is filled in and fetched
//! once per AOI geometry; a plain URL is fetched once into
//! `<name>/<name>.tif`.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{info, instrument};

use super::{DataCategory, DataTask, Fetched, TaskContext, TaskError, TaskReport, create_dir};
use crate::config::RemoteRasters;
use crate::geometry::{FeatureCollection, RequestArea};
use crate::layout::names;
use crate::services::rasters::{fill_template, has_placeholders};

/// Every configured raster for every AOI geometry.
#[derive(Debug, Default)]
pub(crate) struct RemoteRastersTask;

#[async_trait]
impl DataTask for RemoteRastersTask {
    fn category(&self) -> DataCategory {
        DataCategory::RemoteRasters
    }

    fn description(&self, ctx: &TaskContext) -> String {
        let names = ctx.config.raster_names();
        format!("Getting raster data for {}", names.join(", "))
    }

    #[instrument(level = "debug", skip_all)]
    async fn run(&self, ctx: &TaskContext) -> Result<TaskReport, TaskError> {
        let rasters = ctx.config.remote_rasters.as_ref().ok_or(TaskError::NotConfigured {
            category: DataCategory::RemoteRasters,
        })?;
        let geometries = ctx.load_aoi().await?;
        info!(rasters = rasters.rasters.len(), geometries = geometries.len(), "{}", self.description(ctx));

        let mut report = TaskReport::default();
        for (name, url) in &rasters.rasters {
            fetch_raster(ctx, rasters, &geometries, name, url, &mut report).await?;
        }
        Ok(report)
    }
}

async fn fetch_raster(
    ctx: &TaskContext,
    rasters: &RemoteRasters,
    geometries: &FeatureCollection,
    name: &str,
    url: &str,
    report: &mut TaskReport,
) -> Result<(), TaskError> {
    let dir: PathBuf = ctx
        .paths
        .remote_rasters
        .get(name)
        .map_or_else(|| ctx.paths.project.join(name), |dir| dir.path().to_path_buf());
    create_dir(&dir).await?;

    if !has_placeholders(url) {
        let path = dir.join(names::raster_whole(name));
        if !report.skip_existing(&path) {
            let result = download(ctx, url, path).await;
            report.record(DataCategory::RemoteRasters, 0, name, result);
        }
        return Ok(());
    }

    let progress = ctx
        .progress
        .start(format!("Getting raster data for {name}"), geometries.len());
    for (index, feature) in geometries.features.iter().enumerate() {
        let path = dir.join(names::raster(name, index));
        if !report.skip_existing(&path) {
            let result = match RequestArea::for_feature(feature, index, rasters.crop, rasters.geometry_buffer) {
                Ok(area) => download(ctx, &fill_template(url, &area.bbox), path).await,
                Err(error) => Err(error.into()),
            };
            report.record(DataCategory::RemoteRasters, index, name, result);
        }
        progress.inc();
    }
    progress.finish();
    Ok(())
}

async fn download(ctx: &TaskContext, url: &str, path: PathBuf) -> Result<Fetched, TaskError> {
    ctx.services.http().download_to_path(url, &path).await?;
    Ok(Fetched::Written(path))
}
