//! The area of interest.
//!
//! The AOI is fetched once and written to `aoi.geojson`; every other
//! category reads that file. A mainstem AOI also writes the mainstem's
//! flowlines and attributes at the project root, since they come from the
//! same NLDI navigation.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tracing::{info, instrument};

use super::{DataCategory, DataTask, Fetched, TaskContext, TaskError, TaskReport, write_json};
use crate::config::{Aoi, AoiSource};
use crate::geometry::{FeatureCollection, GeometryError, read_geometry_file, write_feature_collection};
use crate::services::nldi::Navigation;
use crate::services::waterdata::{CATCHMENTS, FLOWLINES, GAGES_BASINS, huc_layer};
use crate::services::{ServiceError, Services};

/// Fetches or reads the AOI feature collection.
#[derive(Debug, Default)]
pub(crate) struct AoiTask;

#[async_trait]
impl DataTask for AoiTask {
    fn category(&self) -> DataCategory {
        DataCategory::Aoi
    }

    fn description(&self, ctx: &TaskContext) -> String {
        match ctx.config.aoi.source() {
            Ok(AoiSource::Hucs(_)) => "Getting AOI: HUCs from WaterData.".to_string(),
            Ok(AoiSource::Catchments(_)) => {
                "Getting AOI: NHDPlusV2 catchments from WaterData.".to_string()
            }
            Ok(AoiSource::GagesBasins(_)) => "Getting AOI: GAGES-II basins from WaterData.".to_string(),
            Ok(AoiSource::Mainstem {
                navigation: Navigation::UpstreamMain,
                ..
            }) => "Getting AOI: Mainstem catchments (main only) from GeoConnex.".to_string(),
            Ok(AoiSource::Mainstem { .. }) => {
                "Getting AOI: Mainstem catchments (tributaries) from GeoConnex.".to_string()
            }
            Ok(AoiSource::GeometryFile(path)) => format!("Getting AOI: From {}", path.display()),
            Err(_) => "Getting AOI".to_string(),
        }
    }

    #[instrument(level = "debug", skip_all)]
    async fn run(&self, ctx: &TaskContext) -> Result<TaskReport, TaskError> {
        let aoi = &ctx.config.aoi;
        let source = aoi.source().map_err(|_| TaskError::NotConfigured {
            category: DataCategory::Aoi,
        })?;
        let mut report = TaskReport::default();

        if let AoiSource::Mainstem { id, navigation } = source {
            fetch_mainstem(ctx, aoi, id, navigation, &mut report).await?;
            return Ok(report);
        }
        if report.skip_existing(&ctx.paths.aoi) {
            info!(path = %ctx.paths.aoi.display(), "Reading AOI from {}", ctx.paths.aoi.display());
            return Ok(report);
        }

        let description = self.description(ctx);
        ctx.progress.println(&description);
        info!("{description}");
        let collection = fetch_collection(&ctx.services, source).await?;
        save_aoi(ctx, &collection).await?;
        report.written += 1;
        report.files.push(ctx.paths.aoi.clone());
        Ok(report)
    }
}

/// The AOI features of `source`, single-part where the service serves
/// multipolygons.
async fn fetch_collection(
    services: &Services,
    source: AoiSource<'_>,
) -> Result<FeatureCollection, TaskError> {
    let mut collection = match source {
        AoiSource::Hucs(ids) => return fetch_hucs(services, ids).await,
        AoiSource::GeometryFile(path) => return Ok(read_geometry_file(path).await?),
        AoiSource::Catchments(ids) => {
            let ids: Vec<String> = ids.iter().map(ToString::to_string).collect();
            services.waterdata(CATCHMENTS).byid("featureid", &ids).await?
        }
        AoiSource::GagesBasins(ids) => services.waterdata(GAGES_BASINS).byid("gage_id", ids).await?,
        AoiSource::Mainstem { id, navigation } => {
            let comids = mainstem_comids(services, id, navigation).await?;
            services.waterdata(CATCHMENTS).byid("featureid", &comids).await?
        }
    };
    collection.multi_to_single();
    Ok(collection)
}

async fn mainstem_comids(
    services: &Services,
    mainstem_id: i64,
    navigation: Navigation,
) -> Result<Vec<String>, ServiceError> {
    let outlet = services.geoconnex().outlet_comid(mainstem_id).await?;
    let comids = services.nldi().navigate(&outlet, navigation).await?;
    info!(mainstem_id, %outlet, flowlines = comids.len(), "mainstem navigated");
    Ok(comids)
}

/// HUCs grouped by level (the code length), one WaterData layer each.
async fn fetch_hucs(services: &Services, ids: &[String]) -> Result<FeatureCollection, TaskError> {
    let mut by_level: BTreeMap<usize, Vec<String>> = BTreeMap::new();
    for id in ids {
        by_level.entry(id.len()).or_default().push(id.clone());
    }
    let mut collection = FeatureCollection::default();
    for (level, ids) in by_level {
        let layer = huc_layer(level);
        let hucs = services
            .waterdata(&layer)
            .byid(&format!("huc{level}"), &ids)
            .await?;
        collection.extend(hucs);
    }
    Ok(collection)
}

async fn save_aoi(ctx: &TaskContext, collection: &FeatureCollection) -> Result<(), TaskError> {
    if collection.is_empty() {
        return Err(GeometryError::Empty {
            origin: "AOI query".to_string(),
        }
        .into());
    }
    collection.require_polygons()?;
    write_feature_collection(collection, &ctx.paths.aoi).await?;
    info!(features = collection.len(), path = %ctx.paths.aoi.display(), "AOI written");
    Ok(())
}

/// Catchments upstream of a mainstem outlet, plus the requested flowline
/// outputs at the project root.
async fn fetch_mainstem(
    ctx: &TaskContext,
    aoi: &Aoi,
    mainstem_id: i64,
    navigation: Navigation,
    report: &mut TaskReport,
) -> Result<(), TaskError> {
    let paths = &ctx.paths;
    let wants_flowlines = aoi.nhdv2_flowlines && !paths.mainstem_flowlines.exists();
    let wants_streamcat = !aoi.streamcat().is_empty() && !paths.mainstem_streamcat.exists();
    let wants_nldi = !aoi.nldi().is_empty() && !paths.mainstem_nldi.exists();
    let wants_aoi = !paths.aoi.exists();
    if !(wants_aoi || wants_flowlines || wants_streamcat || wants_nldi) {
        report.skip_existing(&paths.aoi);
        return Ok(());
    }

    let message = AoiTask.description(ctx);
    ctx.progress.println(&message);
    info!(mainstem_id, navigation = navigation.as_str(), "{message}");

    let services = &ctx.services;
    let comids = mainstem_comids(services, mainstem_id, navigation).await?;

    if wants_flowlines {
        let result = async {
            let flowlines = services.waterdata(FLOWLINES).byid("comid", &comids).await?;
            write_feature_collection(&flowlines, &paths.mainstem_flowlines).await?;
            Ok::<_, TaskError>(Fetched::Written(paths.mainstem_flowlines.clone()))
        }
        .await;
        report.record(DataCategory::Aoi, 0, "flowlines", result);
    }
    if wants_streamcat {
        let result = async {
            let metrics = services.streamcat().metrics(aoi.streamcat(), &comids).await?;
            write_json(&paths.mainstem_streamcat, &metrics).await?;
            Ok::<_, TaskError>(Fetched::Written(paths.mainstem_streamcat.clone()))
        }
        .await;
        report.record(DataCategory::Aoi, 0, "StreamCat", result);
    }
    if wants_nldi {
        let result = async {
            let attrs = services.nldi().characteristics(&comids, aoi.nldi()).await?;
            write_json(&paths.mainstem_nldi, &attrs).await?;
            Ok::<_, TaskError>(Fetched::Written(paths.mainstem_nldi.clone()))
        }
        .await;
        report.record(DataCategory::Aoi, 0, "NLDI attrs", result);
    }

    if wants_aoi {
        let mut catchments = services.waterdata(CATCHMENTS).byid("featureid", &comids).await?;
        catchments.multi_to_single();
        save_aoi(ctx, &catchments).await?;
        report.written += 1;
        report.files.push(paths.aoi.clone());
    } else {
        report.skip_existing(&paths.aoi);
    }
    Ok(())
}
