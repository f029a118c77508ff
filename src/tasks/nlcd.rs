//! NLCD layers per AOI geometry.

use async_trait::async_trait;
use tracing::{info, instrument};

use super::{DataCategory, DataTask, Fetched, TaskContext, TaskError, TaskReport, create_dir};
use crate::geometry::RequestArea;
use crate::layout::names;

/// Every requested `(layer, year)` for every AOI geometry.
#[derive(Debug, Default)]
pub(crate) struct NlcdTask;

#[async_trait]
impl DataTask for NlcdTask {
    fn category(&self) -> DataCategory {
        DataCategory::Nlcd
    }

    fn description(&self, _ctx: &TaskContext) -> String {
        "Getting NLCD from MRLC".to_string()
    }

    #[instrument(level = "debug", skip_all)]
    async fn run(&self, ctx: &TaskContext) -> Result<TaskReport, TaskError> {
        let nlcd = ctx.config.nlcd.as_ref().ok_or(TaskError::NotConfigured {
            category: DataCategory::Nlcd,
        })?;
        let geometries = ctx.load_aoi().await?;
        let dir = ctx.paths.nlcd.path();
        create_dir(dir).await?;

        let layers = nlcd.requested_layers();
        let description = self.description(ctx);
        info!(geometries = geometries.len(), layers = layers.len(), "{description}");
        let progress = ctx.progress.start(description, geometries.len());
        let mut report = TaskReport::default();

        for (index, feature) in geometries.features.iter().enumerate() {
            let area = match RequestArea::for_feature(feature, index, nlcd.crop, nlcd.geometry_buffer) {
                Ok(area) => area,
                Err(error) => {
                    report.record(DataCategory::Nlcd, index, "NLCD", Err(error.into()));
                    progress.inc();
                    continue;
                }
            };
            for &(layer, year) in &layers {
                let path = dir.join(names::nlcd(index, layer, year));
                if report.skip_existing(&path) {
                    continue;
                }
                let result = ctx
                    .services
                    .nlcd()
                    .get_layer(&area.bbox, layer, year, &path)
                    .await
                    .map(|_| Fetched::Written(path))
                    .map_err(TaskError::from);
                let what = format!("NLCD {} {year}", layer.as_str());
                report.record(DataCategory::Nlcd, index, &what, result);
            }
            progress.inc();
        }
        progress.finish();
        Ok(report)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tempfile::TempDir;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, ResponseTemplate};

    use super::*;
    use crate::tasks::tests::{context, write_square_aoi};
    use crate::test_support::socket_guard::start_mock_server_or_skip;

    fn tiff() -> ResponseTemplate {
        ResponseTemplate::new(200)
            .insert_header("content-type", "image/geotiff")
            .set_body_bytes(b"II*\0".to_vec())
    }

    #[tokio::test]
    async fn test_default_is_latest_land_cover() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/mrlc"))
            .and(query_param("layers", "NLCD_2021_Land_Cover_L48"))
            .respond_with(tiff())
            .expect(1)
            .mount(&mock_server)
            .await;

        let dir = TempDir::new().unwrap();
        let ctx = context(dir.path(), &mock_server.uri(), "aoi:\n  nhdv2_ids: [1]\nnlcd: {}\n");
        write_square_aoi(&ctx);

        let report = NlcdTask.run(&ctx).await.unwrap();
        assert_eq!(report.written, 1);
        assert!(ctx.paths.nlcd.join("nlcd_geom_0_cover_2021.tif").exists());
    }

    #[tokio::test]
    async fn test_each_layer_and_year_is_a_file() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/mrlc"))
            .respond_with(tiff())
            .expect(3)
            .mount(&mock_server)
            .await;

        let dir = TempDir::new().unwrap();
        let ctx = context(
            dir.path(),
            &mock_server.uri(),
            "aoi:\n  nhdv2_ids: [1]\nnlcd:\n  cover: [2019, 2021]\n  canopy: [2016]\n",
        );
        write_square_aoi(&ctx);

        let report = NlcdTask.run(&ctx).await.unwrap();
        assert_eq!(report.written, 3);
        assert!(ctx.paths.nlcd.join("nlcd_geom_0_canopy_2016.tif").exists());
    }
}
