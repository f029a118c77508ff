//! Maps a config to the tasks it asks for.

use std::sync::Arc;

use tracing::debug;

use super::aoi::AoiTask;
use super::flowlines::FlowlinesTask;
use super::forcing::ForcingTask;
use super::nid::NidTask;
use super::nlcd::NlcdTask;
use super::rasters::RemoteRastersTask;
use super::soil::SoilTask;
use super::streamflow::StreamflowTask;
use super::topo::TopoTask;
use super::{DataCategory, DataTask, PlanError, TaskPlan};
use crate::config::Config;

/// The tasks requested by one config.
#[derive(Debug, Clone, Default)]
pub struct TaskRegistry {
    tasks: Vec<Arc<dyn DataTask>>,
}

impl TaskRegistry {
    /// One task per configured category, in category order.
    ///
    /// The AOI task is always present. Flowlines are a separate category
    /// unless the AOI is a mainstem, whose flowlines come with the AOI.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let mut tasks: Vec<Arc<dyn DataTask>> = vec![Arc::new(AoiTask)];
        if config.aoi.wants_flowlines() && !config.aoi.is_mainstem() {
            tasks.push(Arc::new(FlowlinesTask));
        }
        if config.forcing.is_some() {
            tasks.push(Arc::new(ForcingTask));
        }
        if config.topo.is_some() {
            tasks.push(Arc::new(TopoTask));
        }
        if config.soil.is_some() {
            tasks.push(Arc::new(SoilTask));
        }
        if config.nlcd.is_some() {
            tasks.push(Arc::new(NlcdTask));
        }
        if config.nid.is_some() {
            tasks.push(Arc::new(NidTask));
        }
        if config.streamflow.is_some() {
            tasks.push(Arc::new(StreamflowTask));
        }
        if config.remote_rasters.is_some() {
            tasks.push(Arc::new(RemoteRastersTask));
        }
        debug!(tasks = tasks.len(), "tasks registered");
        Self { tasks }
    }

    /// The registered tasks.
    #[must_use]
    pub fn tasks(&self) -> &[Arc<dyn DataTask>] {
        &self.tasks
    }

    /// The registered categories.
    #[must_use]
    pub fn categories(&self) -> Vec<DataCategory> {
        self.tasks.iter().map(|task| task.category()).collect()
    }

    /// Orders the registered tasks into stages.
    ///
    /// # Errors
    ///
    /// Returns [`PlanError`] when the tasks cannot be ordered.
    pub fn plan(&self) -> Result<TaskPlan, PlanError> {
        TaskPlan::resolve(self.tasks.clone(), implied)
    }
}

/// Tasks added when something depends on them without being requested.
fn implied(category: DataCategory) -> Option<Arc<dyn DataTask>> {
    match category {
        DataCategory::Aoi => Some(Arc::new(AoiTask)),
        _ => None,
    }
}
