//! Runs one CLI invocation and maps the run verdict to a process exit
//! code. With `--dry-run` only the task plan is printed.

use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use hysetter_core::{
    FilePaths, ProgressReporter, RunSettings, RunSummary, Services, TaskContext, TaskEngine,
    TaskPlan, TaskRegistry, read_config,
};
use tracing::{debug, info, warn};

use crate::ProcessExit;
use crate::app::{config_runtime, exit_handler, terminal};

pub(crate) async fn run() -> Result<ProcessExit> {
    let (args, cli_sources) = config_runtime::parse_cli_with_sources();

    let default_level = config_runtime::resolve_default_log_level(&args);
    let dumb_terminal = terminal::is_dumb_terminal();
    let no_color = terminal::should_disable_color(terminal::no_color_env_requested(), dumb_terminal);
    terminal::init_tracing(default_level, no_color);

    debug!(?args, "CLI arguments parsed");
    let config_path = std::fs::canonicalize(&args.config).unwrap_or_else(|_| args.config.clone());
    info!(
        config = %config_path.display(),
        version = env!("CARGO_PKG_VERSION"),
        os = std::env::consts::OS,
        arch = std::env::consts::ARCH,
        "HySetter starting"
    );

    let mut config = read_config(&args.config)
        .with_context(|| format!("Failed to load config {}", args.config.display()))?;
    config.overwrite |= args.overwrite;

    let run_settings = config_runtime::apply_cli_overrides(
        RunSettings::from_settings(config.settings.as_ref()),
        &args,
        &cli_sources,
    );
    debug!(?run_settings, "run settings resolved");

    let registry = TaskRegistry::from_config(&config);
    let plan = registry.plan().context("Failed to plan the requested categories")?;
    let paths = FilePaths::from_config(&config);

    if args.dry_run {
        print!("{}", render_plan(&plan, &paths));
        return Ok(ProcessExit::Success);
    }

    if config.overwrite {
        paths
            .rm_tree()
            .with_context(|| format!("Failed to remove {}", paths.project.display()))?;
    }

    let services = Services::from_settings(&run_settings).context("Failed to build HTTP client")?;
    let progress = ProgressReporter::new(terminal::should_hide_progress(args.quiet, dumb_terminal));
    let ctx = Arc::new(TaskContext::new(config, services, progress));

    let engine = TaskEngine::new(run_settings.concurrency);
    let summary = engine.run(&plan, ctx).await;
    log_summary(&summary, &paths.project);

    Ok(exit_handler::determine_exit_outcome(summary.verdict()))
}

/// One line per planned task: stage, category, prerequisites and output
/// directory.
fn render_plan(plan: &TaskPlan, paths: &FilePaths) -> String {
    let mut out = String::new();
    for (stage_index, stage) in plan.stages().iter().enumerate() {
        for task in stage {
            let category = task.category();
            let prerequisites: Vec<&str> = task.depends_on().iter().map(|c| c.as_str()).collect();
            let prerequisites = if prerequisites.is_empty() {
                "none".to_string()
            } else {
                prerequisites.join(", ")
            };
            let _ = writeln!(
                out,
                "Stage {}: {category} (requires: {prerequisites}) -> {}",
                stage_index + 1,
                category.output_dir(paths).display()
            );
        }
    }
    out
}

fn log_summary(summary: &RunSummary, project: &Path) {
    for outcome in summary.outcomes() {
        if outcome.status.is_complete() {
            info!(
                category = %outcome.category,
                status = %outcome.status,
                written = outcome.report.written,
                cached = outcome.report.cached,
                no_data = outcome.report.no_data,
                failed = outcome.report.failed,
                elapsed_ms = outcome.elapsed.as_millis(),
                "category finished"
            );
        } else {
            warn!(category = %outcome.category, status = %outcome.status, "category did not complete");
        }
    }
    let (written, cached, failed) = summary.item_totals();
    info!(
        project = %project.display(),
        written,
        cached,
        failed,
        verdict = ?summary.verdict(),
        "Run finished"
    );
}
