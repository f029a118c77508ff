//! NWIS discharge, either for the gauges inside each AOI geometry or for
//! the station ids listed in an AOI attribute column.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{debug, info, instrument};

use super::{DataCategory, DataTask, Fetched, TaskContext, TaskError, TaskReport, create_dir, write_json};
use crate::config::Streamflow;
use crate::geometry::{Feature, FeatureCollection, RequestArea};
use crate::layout::names;
use crate::services::nwis::{normalize_site_id, series_count};

/// Daily or instantaneous discharge.
#[derive(Debug, Default)]
pub(crate) struct StreamflowTask;

#[async_trait]
impl DataTask for StreamflowTask {
    fn category(&self) -> DataCategory {
        DataCategory::Streamflow
    }

    fn description(&self, _ctx: &TaskContext) -> String {
        "Getting streamflow from NWIS".to_string()
    }

    #[instrument(level = "debug", skip_all)]
    async fn run(&self, ctx: &TaskContext) -> Result<TaskReport, TaskError> {
        let streamflow = ctx.config.streamflow.as_ref().ok_or(TaskError::NotConfigured {
            category: DataCategory::Streamflow,
        })?;
        let geometries = ctx.load_aoi().await?;
        create_dir(ctx.paths.streamflow.path()).await?;

        let description = self.description(ctx);
        info!(
            frequency = streamflow.frequency.service_code(),
            start = %streamflow.start_date,
            end = %streamflow.end_date,
            "{description}"
        );
        let mut report = TaskReport::default();

        if let Some(column) = &streamflow.use_col {
            by_column(ctx, streamflow, &geometries, column, &mut report).await?;
        } else {
            let progress = ctx.progress.start(description, geometries.len());
            for (index, feature) in geometries.features.iter().enumerate() {
                let path = ctx.paths.streamflow.join(&names::streamflow(index));
                if !report.skip_existing(&path) {
                    let result = within_geometry(ctx, streamflow, feature, index, path).await;
                    report.record(DataCategory::Streamflow, index, "streamflow", result);
                }
                progress.inc();
            }
            progress.finish();
        }
        Ok(report)
    }
}

/// One document for every station id found in `column`.
async fn by_column(
    ctx: &TaskContext,
    streamflow: &Streamflow,
    geometries: &FeatureCollection,
    column: &str,
    report: &mut TaskReport,
) -> Result<(), TaskError> {
    let path = ctx.paths.streamflow.join(names::STREAMFLOW_BY_COLUMN);
    if report.skip_existing(&path) {
        return Ok(());
    }
    if !geometries
        .features
        .iter()
        .any(|f| f.properties.contains_key(column))
    {
        return Err(TaskError::MissingColumn {
            column: column.to_string(),
        });
    }
    let mut sites: Vec<String> = geometries
        .features
        .iter()
        .filter_map(|f| f.property_str(column))
        .map(|id| normalize_site_id(&id))
        .filter(|id| !id.is_empty())
        .collect();
    sites.sort();
    sites.dedup();
    debug!(column, sites = sites.len(), "stations read from AOI column");

    let result = fetch_and_write(ctx, streamflow, &sites, path).await;
    report.record(DataCategory::Streamflow, 0, "streamflow", result);
    Ok(())
}

/// Discharge of the gauges located inside feature `index`.
async fn within_geometry(
    ctx: &TaskContext,
    streamflow: &Streamflow,
    feature: &Feature,
    index: usize,
    path: PathBuf,
) -> Result<Fetched, TaskError> {
    let area = RequestArea::for_feature(feature, index, true, 0.0)?;
    let sites: Vec<String> = ctx
        .services
        .nwis()
        .site_info(&area.bbox, streamflow.frequency)
        .await?
        .into_iter()
        .filter(|site| area.contains(site.lon, site.lat))
        .map(|site| site.site_no)
        .collect();
    debug!(index, sites = sites.len(), "gauges inside geometry");
    fetch_and_write(ctx, streamflow, &sites, path).await
}

async fn fetch_and_write(
    ctx: &TaskContext,
    streamflow: &Streamflow,
    sites: &[String],
    path: PathBuf,
) -> Result<Fetched, TaskError> {
    if sites.is_empty() {
        return Ok(Fetched::NoData);
    }
    let document = ctx
        .services
        .nwis()
        .streamflow(sites, streamflow.start_date, streamflow.end_date, streamflow.frequency)
        .await?;
    match document {
        Some(document) if series_count(&document) > 0 => {
            write_json(&path, &document).await?;
            Ok(Fetched::Written(path))
        }
        _ => Ok(Fetched::NoData),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, ResponseTemplate};

    use super::*;
    use crate::tasks::tests::{context, write_square_aoi};
    use crate::test_support::socket_guard::start_mock_server_or_skip;

    /// One gauge inside the test square.
    const RDB: &str = "agency_cd\tsite_no\tstation_nm\tsite_tp_cd\tdec_lat_va\tdec_long_va\n5s\t15s\t50s\t7s\t16s\t16s\nUSGS\t06730200\tBOULDER CREEK\tST\t39.8\t-105.2\n";

    fn waterml(site: &str) -> serde_json::Value {
        json!({"value": {"timeSeries": [{"sourceInfo": {"siteCode": [{"value": site}]}}]}})
    }

    #[tokio::test]
    async fn test_gauges_inside_geometry_are_fetched() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/nwis/site/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(RDB))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/nwis/dv/"))
            .and(query_param("sites", "06730200"))
            .respond_with(ResponseTemplate::new(200).set_body_json(waterml("06730200")))
            .expect(1)
            .mount(&mock_server)
            .await;

        let dir = TempDir::new().unwrap();
        let ctx = context(
            dir.path(),
            &mock_server.uri(),
            "aoi:\n  nhdv2_ids: [1]\nstreamflow:\n  start_date: 2020-01-01\n  end_date: 2020-12-31\n  frequency: daily\n",
        );
        write_square_aoi(&ctx);

        let report = StreamflowTask.run(&ctx).await.unwrap();
        assert_eq!(report.written, 1);
        assert!(ctx.paths.streamflow.join("streamflow_geom_0.json").exists());
    }

    #[tokio::test]
    async fn test_without_column_fetches_per_geometry_even_if_within_aoi_is_off() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/nwis/site/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(RDB))
            .expect(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/nwis/dv/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(waterml("06730200")))
            .expect(1)
            .mount(&mock_server)
            .await;

        let dir = TempDir::new().unwrap();
        let ctx = context(
            dir.path(),
            &mock_server.uri(),
            "aoi:\n  nhdv2_ids: [1]\nstreamflow:\n  start_date: 2020-01-01\n  end_date: 2020-12-31\n  frequency: daily\n  within_aoi: false\n",
        );
        write_square_aoi(&ctx);

        let report = StreamflowTask.run(&ctx).await.unwrap();
        assert_eq!(report.written, 1);
        assert!(ctx.paths.streamflow.join("streamflow_geom_0.json").exists());
    }

    #[tokio::test]
    async fn test_no_gauges_is_no_data() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/nwis/site/"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let dir = TempDir::new().unwrap();
        let ctx = context(
            dir.path(),
            &mock_server.uri(),
            "aoi:\n  nhdv2_ids: [1]\nstreamflow:\n  start_date: 2020-01-01\n  end_date: 2020-12-31\n  frequency: daily\n",
        );
        write_square_aoi(&ctx);

        let report = StreamflowTask.run(&ctx).await.unwrap();
        assert_eq!((report.written, report.no_data, report.failed), (0, 1, 0));
    }

    #[tokio::test]
    async fn test_station_ids_from_column() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/nwis/iv/"))
            .and(query_param("sites", "06730500"))
            .respond_with(ResponseTemplate::new(200).set_body_json(waterml("06730500")))
            .expect(1)
            .mount(&mock_server)
            .await;

        let dir = TempDir::new().unwrap();
        let ctx = context(
            dir.path(),
            &mock_server.uri(),
            "aoi:\n  nhdv2_ids: [1]\nstreamflow:\n  start_date: 2020-01-01\n  end_date: 2020-01-02\n  frequency: instantaneous\n  use_col: gage_id\n",
        );
        write_square_aoi(&ctx);

        let report = StreamflowTask.run(&ctx).await.unwrap();
        assert_eq!(report.written, 1);
        assert!(ctx.paths.streamflow.join("streamflow.json").exists());
    }

    #[tokio::test]
    async fn test_unknown_column_fails_the_task() {
        let dir = TempDir::new().unwrap();
        let ctx = context(
            dir.path(),
            "http://localhost:1",
            "aoi:\n  nhdv2_ids: [1]\nstreamflow:\n  start_date: 2020-01-01\n  end_date: 2020-01-02\n  frequency: daily\n  use_col: station\n",
        );
        write_square_aoi(&ctx);

        let err = StreamflowTask.run(&ctx).await.unwrap_err();
        assert_eq!(err.to_string(), "Column station not found in the AOI file");
    }
}
