//! National Inventory of Dams.
//!
//! The full inventory is staged once per project. With `within_aoi`, the
//! dams located inside each AOI geometry are also written as GeoJSON; a
//! geometry without dams still gets an (empty) file so reruns skip it.

use async_trait::async_trait;
use tracing::{info, instrument};

use super::{DataCategory, DataTask, Fetched, TaskContext, TaskError, TaskReport, create_dir};
use crate::geometry::{Feature, FeatureCollection, RequestArea, write_feature_collection};
use crate::layout::names;

/// Inventory download and per-geometry dam extraction.
#[derive(Debug, Default)]
pub(crate) struct NidTask;

#[async_trait]
impl DataTask for NidTask {
    fn category(&self) -> DataCategory {
        DataCategory::Nid
    }

    fn description(&self, _ctx: &TaskContext) -> String {
        "Getting dams from NID".to_string()
    }

    #[instrument(level = "debug", skip_all)]
    async fn run(&self, ctx: &TaskContext) -> Result<TaskReport, TaskError> {
        let nid = ctx.config.nid.as_ref().ok_or(TaskError::NotConfigured {
            category: DataCategory::Nid,
        })?;
        let geometries = ctx.load_aoi().await?;
        create_dir(ctx.paths.nid.path()).await?;

        let description = self.description(ctx);
        info!(within_aoi = nid.within_aoi, "{description}");
        let mut report = TaskReport::default();

        let inventory = ctx.paths.nid.join(names::NID_INVENTORY);
        match ctx.services.nid().stage_inventory(&inventory).await? {
            Some(_) => report.written += 1,
            None => report.cached += 1,
        }
        report.files.push(inventory);

        if nid.within_aoi {
            let progress = ctx.progress.start(description, geometries.len());
            for (index, feature) in geometries.features.iter().enumerate() {
                let path = ctx.paths.nid.join(&names::nid(index));
                if !report.skip_existing(&path) {
                    let result = async {
                        let dams = dams_within(ctx, feature, index).await?;
                        write_feature_collection(&dams, &path).await?;
                        Ok::<_, TaskError>(Fetched::Written(path))
                    }
                    .await;
                    report.record(DataCategory::Nid, index, "dams", result);
                }
                progress.inc();
            }
            progress.finish();
        }
        Ok(report)
    }
}

/// Dams whose point location falls inside the feature.
async fn dams_within(
    ctx: &TaskContext,
    feature: &Feature,
    index: usize,
) -> Result<FeatureCollection, TaskError> {
    let area = RequestArea::for_feature(feature, index, true, 0.0)?;
    let candidates = ctx.services.nid().dams_in_box(&area.bbox).await?;
    let dams = candidates
        .features
        .into_iter()
        .filter(|dam| {
            dam.geometry
                .as_ref()
                .and_then(|g| g.positions().first().copied())
                .is_some_and(|p| area.contains(p.lon, p.lat))
        })
        .collect();
    Ok(FeatureCollection::new(dams))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, ResponseTemplate};

    use super::*;
    use crate::geometry::read_feature_collection;
    use crate::tasks::tests::{context, write_square_aoi};
    use crate::test_support::socket_guard::start_mock_server_or_skip;

    fn dam(name: &str, lon: f64, lat: f64) -> serde_json::Value {
        json!({
            "type": "Feature",
            "properties": {"name": name},
            "geometry": {"type": "Point", "coordinates": [lon, lat]}
        })
    }

    async fn mount_inventory(mock_server: &wiremock::MockServer) {
        Mock::given(method("GET"))
            .and(path("/nid/gpkg"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/geopackage+sqlite3")
                    .set_body_bytes(b"SQLite format 3\0".to_vec()),
            )
            .expect(1)
            .mount(mock_server)
            .await;
    }

    #[tokio::test]
    async fn test_inventory_only() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        mount_inventory(&mock_server).await;

        let dir = TempDir::new().unwrap();
        let ctx = context(
            dir.path(),
            &mock_server.uri(),
            "aoi:\n  nhdv2_ids: [1]\nnid:\n  within_aoi: false\n",
        );
        write_square_aoi(&ctx);

        let report = NidTask.run(&ctx).await.unwrap();
        assert_eq!(report.written, 1);
        assert!(ctx.paths.nid.join("full_nid_inventory.gpkg").exists());

        let report = NidTask.run(&ctx).await.unwrap();
        assert_eq!((report.written, report.cached), (0, 1));
    }

    #[tokio::test]
    async fn test_dams_outside_geometry_are_dropped() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        mount_inventory(&mock_server).await;
        Mock::given(method("GET"))
            .and(path("/nid/features/query"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "type": "FeatureCollection",
                "features": [dam("Gross", -105.36, 39.95), dam("Elsewhere", -104.0, 39.9)]
            })))
            .mount(&mock_server)
            .await;

        let dir = TempDir::new().unwrap();
        let ctx = context(
            dir.path(),
            &mock_server.uri(),
            "aoi:\n  nhdv2_ids: [1]\nnid:\n  within_aoi: true\n",
        );
        write_square_aoi(&ctx);

        let report = NidTask.run(&ctx).await.unwrap();
        assert_eq!(report.written, 2);
        let dams = read_feature_collection(&ctx.paths.nid.join("nid_geom_0.geojson")).await.unwrap();
        assert_eq!(dams.len(), 1);
        assert_eq!(dams.features[0].property_str("name").as_deref(), Some("Gross"));
    }
}
