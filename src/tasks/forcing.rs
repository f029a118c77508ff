//! Climate forcing per AOI geometry.

use async_trait::async_trait;
use tracing::{info, instrument};

use super::{DataCategory, DataTask, TaskContext, TaskError, TaskReport, create_dir, download_requests};
use crate::geometry::RequestArea;
use crate::services::climate;

/// Daymet, gridMET or NLDAS-2 files for every AOI geometry.
#[derive(Debug, Default)]
pub(crate) struct ForcingTask;

#[async_trait]
impl DataTask for ForcingTask {
    fn category(&self) -> DataCategory {
        DataCategory::Forcing
    }

    fn description(&self, ctx: &TaskContext) -> String {
        match &ctx.config.forcing {
            Some(forcing) => format!("Getting forcing from {}", forcing.source.display_name()),
            None => "Getting forcing".to_string(),
        }
    }

    #[instrument(level = "debug", skip_all)]
    async fn run(&self, ctx: &TaskContext) -> Result<TaskReport, TaskError> {
        let forcing = ctx.config.forcing.as_ref().ok_or(TaskError::NotConfigured {
            category: DataCategory::Forcing,
        })?;
        let geometries = ctx.load_aoi().await?;
        let dir = ctx.paths.forcing.path();
        create_dir(dir).await?;

        let description = self.description(ctx);
        info!(
            geometries = geometries.len(),
            start = %forcing.start_date,
            end = %forcing.end_date,
            "{description}"
        );
        let progress = ctx.progress.start(description, geometries.len());
        let mut report = TaskReport::default();

        for (index, feature) in geometries.features.iter().enumerate() {
            let requests = RequestArea::for_feature(feature, index, forcing.crop, forcing.geometry_buffer)
                .map_err(TaskError::from)
                .and_then(|area| {
                    climate::requests(ctx.services.endpoints(), forcing, index, &area)
                        .map_err(TaskError::from)
                });
            match requests {
                Ok(requests) => {
                    download_requests(ctx, dir, DataCategory::Forcing, index, requests, &mut report).await;
                }
                Err(error) => report.record(DataCategory::Forcing, index, "forcing", Err(error)),
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

    const GRIDMET: &str = "aoi:\n  nhdv2_ids: [1]\nforcing:\n  source: gridmet\n  start_date: 2020-01-01\n  end_date: 2020-01-31\n  variables: [pr, tmmx]\n";

    #[tokio::test]
    async fn test_one_file_per_variable_and_cached_on_rerun() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/gridmet/agg_met_pr_1979_CurrentYear_CONUS.nc"))
            .and(query_param("var", "precipitation_amount"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/x-netcdf")
                    .set_body_bytes(b"CDF\x01".to_vec()),
            )
            .expect(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/gridmet/agg_met_tmmx_1979_CurrentYear_CONUS.nc"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/x-netcdf")
                    .set_body_bytes(b"CDF\x01".to_vec()),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let dir = TempDir::new().unwrap();
        let ctx = context(dir.path(), &mock_server.uri(), GRIDMET);
        write_square_aoi(&ctx);

        let report = ForcingTask.run(&ctx).await.unwrap();
        assert_eq!(report.written, 2);
        assert!(ctx.paths.forcing.join("gridmet_geom_0_pr.nc").exists());
        assert!(ctx.paths.forcing.join("gridmet_geom_0_tmmx.nc").exists());

        let report = ForcingTask.run(&ctx).await.unwrap();
        assert_eq!((report.written, report.cached), (0, 2));
    }

    #[tokio::test]
    async fn test_failed_variable_does_not_stop_the_rest() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/gridmet/agg_met_pr_1979_CurrentYear_CONUS.nc"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/gridmet/agg_met_tmmx_1979_CurrentYear_CONUS.nc"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/x-netcdf")
                    .set_body_bytes(b"CDF\x01".to_vec()),
            )
            .mount(&mock_server)
            .await;

        let dir = TempDir::new().unwrap();
        let ctx = context(dir.path(), &mock_server.uri(), GRIDMET);
        write_square_aoi(&ctx);

        let report = ForcingTask.run(&ctx).await.unwrap();
        assert_eq!((report.written, report.failed), (1, 1));
        assert!(report.has_failures());
        assert!(!report.all_failed());
    }

    #[tokio::test]
    async fn test_missing_aoi_fails_the_task() {
        let dir = TempDir::new().unwrap();
        let ctx = context(dir.path(), "http://localhost:1", GRIDMET);
        let err = ForcingTask.run(&ctx).await.unwrap_err();
        assert!(matches!(err, TaskError::AoiMissing { .. }));
    }

    #[test]
    fn test_description_names_the_source() {
        let ctx = context(std::path::Path::new("/tmp"), "http://localhost:1", GRIDMET);
        assert_eq!(ForcingTask.description(&ctx), "Getting forcing from GridMet");
    }
}
