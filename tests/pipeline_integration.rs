//! Integration tests for full runs: registry, plan, engine and tasks
//! against mock services.

mod support;

use std::sync::Arc;

use hysetter_core::tasks::RunVerdict;
use hysetter_core::{
    Config, DataCategory, ProgressReporter, RunSummary, TaskContext, TaskEngine, TaskRegistry,
    TaskStatus,
};
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path, path_regex, query_param};
use wiremock::{Mock, ResponseTemplate};

use support::socket_guard::start_mock_server_or_skip;
use support::{config, mock_services, write_squares};

async fn run(config: Config, base_url: &str) -> RunSummary {
    let registry = TaskRegistry::from_config(&config);
    let plan = registry.plan().expect("plan should resolve");
    let ctx = Arc::new(TaskContext::new(
        config,
        mock_services(base_url),
        ProgressReporter::hidden(),
    ));
    TaskEngine::new(4).run(&plan, ctx).await
}

fn netcdf() -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "application/x-netcdf")
        .set_body_bytes(b"CDF\x01".to_vec())
}

#[tokio::test]
async fn test_full_run_writes_every_geometry_then_reuses_files() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/gridmet/agg_met_pr_1979_CurrentYear_CONUS.nc"))
        .respond_with(netcdf())
        .expect(2)
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let basins = write_squares(dir.path(), &[-105.5, -104.5]);
    let body = format!(
        "aoi:\n  geometry_file: {}\nforcing:\n  source: gridmet\n  start_date: 2020-01-01\n  end_date: 2020-01-31\n  variables: [pr]\n",
        basins.display()
    );

    let summary = run(config(dir.path(), &body), &mock_server.uri()).await;
    assert_eq!(summary.verdict(), RunVerdict::Success);
    assert_eq!(summary.outcomes().len(), 2);
    let forcing = summary.get(DataCategory::Forcing).unwrap();
    assert_eq!(forcing.status, TaskStatus::Succeeded);
    assert_eq!(forcing.report.written, 2);

    let project = dir.path().join("demo");
    assert!(project.join("aoi.geojson").exists());
    assert!(project.join("forcing/gridmet_geom_0_pr.nc").exists());
    assert!(project.join("forcing/gridmet_geom_1_pr.nc").exists());

    // Second run: nothing is requested again.
    let summary = run(config(dir.path(), &body), &mock_server.uri()).await;
    assert_eq!(summary.verdict(), RunVerdict::Success);
    let (written, cached, failed) = summary.item_totals();
    assert_eq!((written, cached, failed), (0, 3, 0));
}

#[tokio::test]
async fn test_missing_aoi_skips_every_dependent() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/wfs"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"type": "FeatureCollection", "features": []})),
        )
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex("^/gridmet/"))
        .respond_with(netcdf())
        .expect(0)
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let body = "aoi:\n  nhdv2_ids: [1]\nforcing:\n  source: gridmet\n  start_date: 2020-01-01\n  end_date: 2020-01-31\n  variables: [pr]\n";

    let summary = run(config(dir.path(), body), &mock_server.uri()).await;
    assert_eq!(summary.verdict(), RunVerdict::Failure);
    assert!(matches!(
        summary.get(DataCategory::Aoi).unwrap().status,
        TaskStatus::Failed(_)
    ));
    assert_eq!(
        summary.get(DataCategory::Forcing).unwrap().status,
        TaskStatus::Skipped {
            prerequisite: DataCategory::Aoi
        }
    );
    assert!(!dir.path().join("demo/aoi.geojson").exists());
}

#[tokio::test]
async fn test_one_failed_geometry_makes_the_run_partial() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/wcs"))
        .and(query_param("bbox", "-105.500000,39.500000,-105.000000,40.000000"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "image/tiff")
                .set_body_bytes(b"II*\0".to_vec()),
        )
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/wcs"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let basins = write_squares(dir.path(), &[-105.5, -104.5]);
    let body = format!(
        "aoi:\n  geometry_file: {}\nremote_rasters:\n  moisture: \"{}/wcs?bbox={{bbox}}\"\n",
        basins.display(),
        mock_server.uri()
    );

    let summary = run(config(dir.path(), &body), &mock_server.uri()).await;
    assert_eq!(summary.verdict(), RunVerdict::Partial);
    let rasters = summary.get(DataCategory::RemoteRasters).unwrap();
    assert_eq!(rasters.status, TaskStatus::Partial);
    assert_eq!((rasters.report.written, rasters.report.failed), (1, 1));
    assert!(dir.path().join("demo/moisture/moisture_geom_0.tif").exists());
    assert!(!dir.path().join("demo/moisture/moisture_geom_1.tif").exists());
}
