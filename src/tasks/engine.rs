//! Stage-by-stage task execution.
//!
//! # Concurrency Model
//!
//! - Each task of a stage runs in its own Tokio task
//! - A semaphore permit is acquired before starting each task
//! - A stage only starts once every task of the previous stage ended
//! - A task whose prerequisite did not complete is marked skipped and
//!   never started

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, instrument, warn};

use super::{DataCategory, DataTask, TaskContext, TaskError, TaskPlan, TaskReport, TaskStatus};

/// Minimum allowed concurrency value.
const MIN_CONCURRENCY: usize = 1;

/// Result of one task.
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    /// Category of the task.
    pub category: DataCategory,
    /// Final state.
    pub status: TaskStatus,
    /// Item counts; empty when the task did not run or failed as a whole.
    pub report: TaskReport,
    /// Wall time spent in the task.
    pub elapsed: Duration,
}

/// Overall result of a run, mapped to the process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunVerdict {
    /// Every task succeeded, or there was nothing to do.
    Success,
    /// Some tasks or items failed.
    Partial,
    /// The AOI could not be produced or every task failed.
    Failure,
}

/// Per-task outcomes of a run, in execution order.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    outcomes: Vec<TaskOutcome>,
}

impl RunSummary {
    /// Every outcome, in execution order.
    #[must_use]
    pub fn outcomes(&self) -> &[TaskOutcome] {
        &self.outcomes
    }

    /// Outcome of `category`, if it was planned.
    #[must_use]
    pub fn get(&self, category: DataCategory) -> Option<&TaskOutcome> {
        self.outcomes.iter().find(|o| o.category == category)
    }

    /// Number of tasks that succeeded fully.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.count(|s| matches!(s, TaskStatus::Succeeded))
    }

    /// Number of tasks that completed with failed items.
    #[must_use]
    pub fn partial(&self) -> usize {
        self.count(|s| matches!(s, TaskStatus::Partial))
    }

    /// Number of tasks that failed.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, TaskStatus::Failed(_)))
    }

    /// Number of tasks that were not run.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.count(|s| matches!(s, TaskStatus::Skipped { .. }))
    }

    /// Total files written, cached and failed across every task.
    #[must_use]
    pub fn item_totals(&self) -> (usize, usize, usize) {
        self.outcomes.iter().fold((0, 0, 0), |(w, c, f), o| {
            (w + o.report.written, c + o.report.cached, f + o.report.failed)
        })
    }

    /// Classifies the run.
    #[must_use]
    pub fn verdict(&self) -> RunVerdict {
        if self.outcomes.is_empty() {
            return RunVerdict::Success;
        }
        let aoi_failed = self
            .get(DataCategory::Aoi)
            .is_some_and(|o| !o.status.is_complete());
        if aoi_failed || self.failed() + self.skipped() == self.outcomes.len() {
            return RunVerdict::Failure;
        }
        if self.succeeded() == self.outcomes.len() {
            RunVerdict::Success
        } else {
            RunVerdict::Partial
        }
    }

    fn count(&self, predicate: impl Fn(&TaskStatus) -> bool) -> usize {
        self.outcomes.iter().filter(|o| predicate(&o.status)).count()
    }
}

/// Runs a [`TaskPlan`] with bounded concurrency.
#[derive(Debug)]
pub struct TaskEngine {
    semaphore: Arc<Semaphore>,
    concurrency: usize,
}

impl TaskEngine {
    /// Creates an engine running at most `concurrency` tasks at once
    /// (at least one).
    #[must_use]
    pub fn new(concurrency: usize) -> Self {
        let concurrency = concurrency.max(MIN_CONCURRENCY);
        Self {
            semaphore: Arc::new(Semaphore::new(concurrency)),
            concurrency,
        }
    }

    /// Configured concurrency limit.
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Executes `plan` stage by stage.
    ///
    /// Task failures never abort the run: they are recorded in the summary
    /// and their dependents are skipped.
    #[instrument(skip_all, fields(tasks = plan.len(), concurrency = self.concurrency))]
    pub async fn run(&self, plan: &TaskPlan, ctx: Arc<TaskContext>) -> RunSummary {
        let mut statuses: HashMap<DataCategory, TaskStatus> = HashMap::new();
        let mut summary = RunSummary::default();
        info!("starting run");

        for (stage_index, stage) in plan.stages().iter().enumerate() {
            debug!(stage = stage_index, tasks = stage.len(), "starting stage");
            let mut handles = Vec::new();

            for task in stage {
                let category = task.category();
                let blocked = task
                    .depends_on()
                    .into_iter()
                    .find(|p| !statuses.get(p).is_some_and(TaskStatus::is_complete));
                if let Some(prerequisite) = blocked {
                    warn!(%category, %prerequisite, "skipping task: prerequisite did not complete");
                    let status = TaskStatus::Skipped { prerequisite };
                    statuses.insert(category, status.clone());
                    summary.outcomes.push(TaskOutcome {
                        category,
                        status,
                        report: TaskReport::default(),
                        elapsed: Duration::ZERO,
                    });
                    continue;
                }

                let Ok(permit) = Arc::clone(&self.semaphore).acquire_owned().await else {
                    error!("task semaphore closed");
                    break;
                };
                let task: Arc<dyn DataTask> = Arc::clone(task);
                let ctx = Arc::clone(&ctx);
                handles.push((
                    category,
                    tokio::spawn(async move {
                        let _permit = permit;
                        let started = Instant::now();
                        let result = task.run(&ctx).await;
                        (result, started.elapsed())
                    }),
                ));
            }

            for (category, handle) in handles {
                let (result, elapsed) = match handle.await {
                    Ok(done) => done,
                    Err(join_error) => (
                        Err(TaskError::Aborted {
                            category,
                            message: join_error.to_string(),
                        }),
                        Duration::ZERO,
                    ),
                };
                let outcome = finish(category, result, elapsed);
                statuses.insert(category, outcome.status.clone());
                summary.outcomes.push(outcome);
            }
        }

        let (written, cached, failed_items) = summary.item_totals();
        info!(
            succeeded = summary.succeeded(),
            partial = summary.partial(),
            failed = summary.failed(),
            skipped = summary.skipped(),
            written,
            cached,
            failed_items,
            "run complete"
        );
        summary
    }
}

fn finish(
    category: DataCategory,
    result: Result<TaskReport, TaskError>,
    elapsed: Duration,
) -> TaskOutcome {
    let (status, report) = match result {
        Ok(report) if report.all_failed() => {
            error!(%category, failed = report.failed, "every item failed");
            (
                TaskStatus::Failed(format!("all {} items failed", report.failed)),
                report,
            )
        }
        Ok(report) if report.has_failures() => {
            warn!(%category, failed = report.failed, written = report.written, "task completed with failures");
            (TaskStatus::Partial, report)
        }
        Ok(report) => {
            info!(
                %category,
                written = report.written,
                cached = report.cached,
                elapsed_ms = elapsed.as_millis(),
                "task completed"
            );
            (TaskStatus::Succeeded, report)
        }
        Err(error) => {
            error!(%category, error = %error, "task failed");
            (TaskStatus::Failed(error.to_string()), TaskReport::default())
        }
    };
    TaskOutcome {
        category,
        status,
        report,
        elapsed,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use tempfile::TempDir;

    use super::*;
    use crate::tasks::tests::context;

    #[derive(Debug, Clone, Copy)]
    enum Script {
        Ok,
        Partial,
        Broken,
    }

    #[derive(Debug)]
    struct Scripted {
        category: DataCategory,
        script: Script,
        runs: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl DataTask for Scripted {
        fn category(&self) -> DataCategory {
            self.category
        }

        fn description(&self, _ctx: &TaskContext) -> String {
            String::new()
        }

        async fn run(&self, _ctx: &TaskContext) -> Result<TaskReport, TaskError> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            match self.script {
                Script::Ok => Ok(TaskReport {
                    written: 1,
                    ..TaskReport::default()
                }),
                Script::Partial => Ok(TaskReport {
                    written: 1,
                    failed: 1,
                    ..TaskReport::default()
                }),
                Script::Broken => Err(TaskError::NotConfigured {
                    category: self.category,
                }),
            }
        }
    }

    fn plan(tasks: &[(DataCategory, Script)], runs: &Arc<AtomicUsize>) -> TaskPlan {
        let tasks = tasks
            .iter()
            .map(|(category, script)| {
                Arc::new(Scripted {
                    category: *category,
                    script: *script,
                    runs: Arc::clone(runs),
                }) as Arc<dyn DataTask>
            })
            .collect();
        TaskPlan::resolve(tasks, |_| None).unwrap()
    }

    fn ctx() -> (TempDir, Arc<TaskContext>) {
        let dir = TempDir::new().unwrap();
        let ctx = context(dir.path(), "http://localhost:1", "aoi:\n  nhdv2_ids: [1]\n");
        (dir, Arc::new(ctx))
    }

    #[tokio::test]
    async fn test_all_tasks_succeed() {
        let (_dir, ctx) = ctx();
        let runs = Arc::new(AtomicUsize::new(0));
        let plan = plan(
            &[(DataCategory::Aoi, Script::Ok), (DataCategory::Topo, Script::Ok), (DataCategory::Nid, Script::Ok)],
            &runs,
        );
        let summary = TaskEngine::new(2).run(&plan, ctx).await;
        assert_eq!(runs.load(Ordering::SeqCst), 3);
        assert_eq!(summary.succeeded(), 3);
        assert_eq!(summary.verdict(), RunVerdict::Success);
        assert_eq!(summary.item_totals(), (3, 0, 0));
    }

    #[tokio::test]
    async fn test_aoi_failure_skips_dependents() {
        let (_dir, ctx) = ctx();
        let runs = Arc::new(AtomicUsize::new(0));
        let plan = plan(
            &[(DataCategory::Aoi, Script::Broken), (DataCategory::Forcing, Script::Ok)],
            &runs,
        );
        let summary = TaskEngine::new(4).run(&plan, ctx).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(
            summary.get(DataCategory::Forcing).unwrap().status,
            TaskStatus::Skipped {
                prerequisite: DataCategory::Aoi
            }
        );
        assert_eq!(summary.verdict(), RunVerdict::Failure);
    }

    #[tokio::test]
    async fn test_item_failures_make_a_partial_run() {
        let (_dir, ctx) = ctx();
        let runs = Arc::new(AtomicUsize::new(0));
        let plan = plan(
            &[
                (DataCategory::Aoi, Script::Ok),
                (DataCategory::Soil, Script::Partial),
                (DataCategory::Nlcd, Script::Broken),
            ],
            &runs,
        );
        let summary = TaskEngine::new(1).run(&plan, ctx).await;
        assert_eq!(summary.get(DataCategory::Soil).unwrap().status, TaskStatus::Partial);
        assert!(matches!(
            summary.get(DataCategory::Nlcd).unwrap().status,
            TaskStatus::Failed(_)
        ));
        assert_eq!(summary.verdict(), RunVerdict::Partial);
    }

    #[test]
    fn test_all_items_failed_fails_the_task() {
        let outcome = finish(
            DataCategory::Topo,
            Ok(TaskReport {
                failed: 2,
                ..TaskReport::default()
            }),
            Duration::ZERO,
        );
        assert_eq!(outcome.status, TaskStatus::Failed("all 2 items failed".into()));
    }

    #[test]
    fn test_empty_summary_is_success() {
        assert_eq!(RunSummary::default().verdict(), RunVerdict::Success);
        assert_eq!(TaskEngine::new(0).concurrency(), 1);
    }
}
