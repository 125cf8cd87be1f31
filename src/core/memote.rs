use std::path::Path;

use crate::{
    artifact::{DraftModel, QualityReport},
    config::*,
    consts::*,
    error::PipelineError,
    executor::{job::Job, manager::ParallelExecutor},
};

/// Build the memote snapshot job of one model
///
/// # Arguments
/// * `model` - Whichever model the active topology produced
/// * `config` - The configuration for the pipeline
/// * `step_output_dir` - The `model_qualities/` directory
///
/// # Example
/// ```rust, ignore
/// let (job, report) = snapshot(&model, &config, &qualities_dir);
/// assert!(report.path.ends_with("A.html"));
/// ```
pub fn snapshot(model: &DraftModel, config: &Config, step_output_dir: &Path) -> (Job, QualityReport) {
    let report = QualityReport {
        id: model.id.clone(),
        path: step_output_dir.join(format!("{}.{}", model.id, HTML)),
    };

    let job = Job::new(Stage::ScoreQuality)
        .task(&config.executable(MEMOTE))
        .sample(&model.id)
        .cpus(config.cpus(Stage::ScoreQuality))
        .args(&["report", "snapshot", "--filename"])
        .path(&report.path)
        .path(&model.path)
        .output(&report.path);

    (job, report)
}

/// Score one model
pub fn score(
    model: &DraftModel,
    config: &Config,
    step_output_dir: &Path,
    executor: &ParallelExecutor,
) -> Result<QualityReport, PipelineError> {
    let (job, report) = snapshot(model, config, step_output_dir);
    executor.submit(job)?;

    Ok(report)
}
