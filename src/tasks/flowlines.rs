//! NHDPlus V2 flowlines within each AOI geometry, with optional StreamCat
//! and NLDI attributes keyed by COMID.

use async_trait::async_trait;
use tracing::{info, instrument};

use super::{DataCategory, DataTask, Fetched, TaskContext, TaskError, TaskReport, create_dir, write_json};
use crate::geometry::{
    Feature, FeatureCollection, RequestArea, read_feature_collection, write_feature_collection,
};
use crate::layout::names;
use crate::services::waterdata::FLOWLINES;

/// Flowlines of every AOI geometry.
#[derive(Debug, Default)]
pub(crate) struct FlowlinesTask;

#[async_trait]
impl DataTask for FlowlinesTask {
    fn category(&self) -> DataCategory {
        DataCategory::Flowlines
    }

    fn description(&self, ctx: &TaskContext) -> String {
        let aoi = &ctx.config.aoi;
        if aoi.streamcat().is_empty() && aoi.nldi().is_empty() {
            "Getting flowlines from WaterData".to_string()
        } else {
            "Getting flowlines and their attributes".to_string()
        }
    }

    #[instrument(level = "debug", skip_all)]
    async fn run(&self, ctx: &TaskContext) -> Result<TaskReport, TaskError> {
        let aoi = &ctx.config.aoi;
        if !aoi.wants_flowlines() {
            return Err(TaskError::NotConfigured {
                category: DataCategory::Flowlines,
            });
        }
        let geometries = ctx.load_aoi().await?;
        let dir = &ctx.paths.flowlines;
        create_dir(dir.path()).await?;

        let description = self.description(ctx);
        info!(geometries = geometries.len(), "{description}");
        let progress = ctx.progress.start(description, geometries.len());
        let mut report = TaskReport::default();

        for (index, feature) in geometries.features.iter().enumerate() {
            let flowlines_path = dir.join(&names::flowlines(index));
            let streamcat_path = dir.join(&names::streamcat(index));
            let nldi_path = dir.join(&names::nldi(index));
            let need_streamcat = !aoi.streamcat().is_empty() && !streamcat_path.exists();
            let need_nldi = !aoi.nldi().is_empty() && !nldi_path.exists();

            if flowlines_path.exists() && !need_streamcat && !need_nldi {
                report.skip_existing(&flowlines_path);
                progress.inc();
                continue;
            }

            let flowlines = if report.skip_existing(&flowlines_path) {
                read_feature_collection(&flowlines_path)
                    .await
                    .map_err(TaskError::from)
            } else {
                let fetched = flowlines_within(ctx, feature, index).await;
                if let Ok(flowlines) = &fetched {
                    let result = write_feature_collection(flowlines, &flowlines_path)
                        .await
                        .map(|()| Fetched::Written(flowlines_path.clone()))
                        .map_err(TaskError::from);
                    report.record(DataCategory::Flowlines, index, "flowlines", result);
                }
                fetched
            };
            let flowlines = match flowlines {
                Ok(flowlines) => flowlines,
                Err(error) => {
                    report.record(DataCategory::Flowlines, index, "flowlines", Err(error));
                    progress.inc();
                    continue;
                }
            };

            let comids: Vec<String> = flowlines
                .features
                .iter()
                .filter_map(|f| f.property_str("comid"))
                .collect();
            if need_streamcat {
                let result = if comids.is_empty() {
                    Ok(Fetched::NoData)
                } else {
                    async {
                        let metrics = ctx.services.streamcat().metrics(aoi.streamcat(), &comids).await?;
                        write_json(&streamcat_path, &metrics).await?;
                        Ok::<_, TaskError>(Fetched::Written(streamcat_path.clone()))
                    }
                    .await
                };
                report.record(DataCategory::Flowlines, index, "StreamCat attrs", result);
            }
            if need_nldi {
                let result = if comids.is_empty() {
                    Ok(Fetched::NoData)
                } else {
                    async {
                        let attrs = ctx.services.nldi().characteristics(&comids, aoi.nldi()).await?;
                        write_json(&nldi_path, &attrs).await?;
                        Ok::<_, TaskError>(Fetched::Written(nldi_path.clone()))
                    }
                    .await
                };
                report.record(DataCategory::Flowlines, index, "NLDI attrs", result);
            }
            progress.inc();
        }
        progress.finish();
        Ok(report)
    }
}

/// Flowlines intersecting the feature's box with at least one vertex
/// inside the feature itself.
async fn flowlines_within(
    ctx: &TaskContext,
    feature: &Feature,
    index: usize,
) -> Result<FeatureCollection, TaskError> {
    let area = RequestArea::for_feature(feature, index, true, 0.0)?;
    let candidates = ctx.services.waterdata(FLOWLINES).bybox(&area.bbox).await?;
    let features = candidates
        .features
        .into_iter()
        .filter(|f| {
            f.geometry
                .as_ref()
                .is_some_and(|g| g.any_vertex_within(&area.geometry))
        })
        .collect();
    Ok(FeatureCollection::new(features))
}
