//! Soil properties per AOI geometry.

use async_trait::async_trait;
use tracing::{info, instrument};

use super::{DataCategory, DataTask, TaskContext, TaskError, TaskReport, create_dir, download_requests};
use crate::geometry::RequestArea;

/// SoilGrids, gNATSGO or POLARIS rasters for every AOI geometry.
#[derive(Debug, Default)]
pub(crate) struct SoilTask;

#[async_trait]
impl DataTask for SoilTask {
    fn category(&self) -> DataCategory {
        DataCategory::Soil
    }

    fn description(&self, ctx: &TaskContext) -> String {
        match &ctx.config.soil {
            Some(soil) => format!("Getting soil from {}", soil.source.display_name()),
            None => "Getting soil".to_string(),
        }
    }

    #[instrument(level = "debug", skip_all)]
    async fn run(&self, ctx: &TaskContext) -> Result<TaskReport, TaskError> {
        let soil = ctx.config.soil.as_ref().ok_or(TaskError::NotConfigured {
            category: DataCategory::Soil,
        })?;
        let geometries = ctx.load_aoi().await?;
        let dir = ctx.paths.soil.path();
        create_dir(dir).await?;

        let description = self.description(ctx);
        info!(geometries = geometries.len(), variables = ?soil.variables, "{description}");
        let progress = ctx.progress.start(description, geometries.len());
        let mut report = TaskReport::default();

        for (index, feature) in geometries.features.iter().enumerate() {
            let requests = match RequestArea::for_feature(feature, index, soil.crop, soil.geometry_buffer) {
                Ok(area) => ctx
                    .services
                    .soil()
                    .requests(soil, index, &area)
                    .await
                    .map_err(TaskError::from),
                Err(error) => Err(error.into()),
            };
            match requests {
                Ok(requests) => {
                    download_requests(ctx, dir, DataCategory::Soil, index, requests, &mut report).await;
                }
                Err(error) => report.record(DataCategory::Soil, index, "soil", Err(error)),
            }
            progress.inc();
        }
        progress.finish();
        Ok(report)
    }
}
