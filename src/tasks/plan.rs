//! Dependency ordering of data tasks.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::debug;

use super::{DataCategory, DataTask, PlanError};

/// Tasks grouped into stages; every prerequisite of a task sits in an
/// earlier stage.
#[derive(Debug, Clone, Default)]
pub struct TaskPlan {
    stages: Vec<Vec<Arc<dyn DataTask>>>,
}

impl TaskPlan {
    /// Orders `requested` with Kahn's algorithm.
    ///
    /// A prerequisite that is not requested is looked up through `implied`
    /// and added to the plan. Within a stage, tasks keep the declaration
    /// order of [`DataCategory`].
    ///
    /// # Errors
    ///
    /// Returns [`PlanError::Duplicate`] when two tasks share a category,
    /// [`PlanError::UnknownPrerequisite`] when `implied` cannot provide a
    /// prerequisite, and [`PlanError::Cycle`] when no order exists.
    pub fn resolve<F>(requested: Vec<Arc<dyn DataTask>>, implied: F) -> Result<Self, PlanError>
    where
        F: Fn(DataCategory) -> Option<Arc<dyn DataTask>>,
    {
        let mut tasks: BTreeMap<DataCategory, Arc<dyn DataTask>> = BTreeMap::new();
        for task in requested {
            let category = task.category();
            if tasks.insert(category, task).is_some() {
                return Err(PlanError::Duplicate { category });
            }
        }

        // Pull in implied prerequisites until the set is closed.
        let mut pending: Vec<DataCategory> = tasks.keys().copied().collect();
        while let Some(category) = pending.pop() {
            let prerequisites = tasks[&category].depends_on();
            for prerequisite in prerequisites {
                if tasks.contains_key(&prerequisite) {
                    continue;
                }
                let task = implied(prerequisite).ok_or(PlanError::UnknownPrerequisite {
                    task: category,
                    prerequisite,
                })?;
                debug!(%category, %prerequisite, "adding implied prerequisite");
                tasks.insert(prerequisite, task);
                pending.push(prerequisite);
            }
        }

        let mut in_degree: BTreeMap<DataCategory, usize> = BTreeMap::new();
        let mut dependents: BTreeMap<DataCategory, BTreeSet<DataCategory>> = BTreeMap::new();
        for (category, task) in &tasks {
            let prerequisites: BTreeSet<DataCategory> = task.depends_on().into_iter().collect();
            in_degree.insert(*category, prerequisites.len());
            for prerequisite in prerequisites {
                dependents.entry(prerequisite).or_default().insert(*category);
            }
        }

        let mut stages = Vec::new();
        let mut ready: Vec<DataCategory> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(category, _)| *category)
            .collect();
        let mut placed = 0;
        while !ready.is_empty() {
            ready.sort();
            let mut next = Vec::new();
            for category in &ready {
                for dependent in dependents.get(category).into_iter().flatten() {
                    if let Some(degree) = in_degree.get_mut(dependent) {
                        *degree -= 1;
                        if *degree == 0 {
                            next.push(*dependent);
                        }
                    }
                }
            }
            placed += ready.len();
            stages.push(
                ready
                    .iter()
                    .map(|category| Arc::clone(&tasks[category]))
                    .collect(),
            );
            ready = next;
        }

        if placed < tasks.len() {
            let categories = in_degree
                .into_iter()
                .filter(|(_, degree)| *degree > 0)
                .map(|(category, _)| category)
                .collect();
            return Err(PlanError::Cycle { categories });
        }

        Ok(Self { stages })
    }

    /// The stages in execution order.
    #[must_use]
    pub fn stages(&self) -> &[Vec<Arc<dyn DataTask>>] {
        &self.stages
    }

    /// Every category in execution order.
    #[must_use]
    pub fn categories(&self) -> Vec<DataCategory> {
        self.stages
            .iter()
            .flatten()
            .map(|task| task.category())
            .collect()
    }

    /// Number of tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.iter().map(Vec::len).sum()
    }

    /// Returns true when there is nothing to run.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}
