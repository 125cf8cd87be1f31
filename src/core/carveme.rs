use std::path::Path;

use crate::{
    artifact::{DraftModel, Genes, ReferenceToken},
    config::*,
    consts::*,
    error::PipelineError,
    executor::{job::Job, manager::ParallelExecutor},
};

/// Media flags passed to carve
///
/// # Arguments
/// * `media` - Growth media options of the run
///
/// # Returns
/// * `--mediadb <db> -g <names>` when both are set
/// * `-g <names>` when only names are set
/// * nothing otherwise (a media database alone is not used)
///
/// # Example
/// ```rust
/// use gemflow::{config::MediaConfig, core::carveme::media_args};
///
/// let media = MediaConfig { db: None, names: Some("M9,LB".into()) };
/// assert_eq!(media_args(&media), vec!["-g", "M9,LB"]);
/// ```
pub fn media_args(media: &MediaConfig) -> Vec<String> {
    let mut args = Vec::new();

    if let Some(names) = &media.names {
        if let Some(db) = &media.db {
            args.push("--mediadb".to_string());
            args.push(db.to_string_lossy().into_owned());
        }
        args.push("-g".to_string());
        args.push(names.clone());
    }

    args
}

/// Build the carve job of one sample
///
/// # Arguments
/// * `genes` - Gene predictions of the sample
/// * `config` - The configuration for the pipeline
/// * `step_output_dir` - The `carveme_models/` directory
///
/// # Returns
/// The job and the compressed model it will produce
///
/// # Example
/// ```rust, ignore
/// let (job, model) = carve(&genes, &config, &models_dir);
/// ```
pub fn carve(genes: &Genes, config: &Config, step_output_dir: &Path) -> (Job, DraftModel) {
    let cpus = config.cpus(Stage::BuildCarveme);
    let model = DraftModel {
        id: genes.id.clone(),
        path: step_output_dir.join(format!("{}.{}", genes.id, XML_GZ)),
    };

    let job = Job::new(Stage::BuildCarveme)
        .task(&config.executable(CARVE))
        .sample(&genes.id)
        .cpus(cpus)
        .args(&["--fbc2", "-v"])
        .arg(format!("--diamond-args=-p {}", cpus))
        .args(&media_args(&config.media()))
        .path(&genes.proteins)
        .arg("-o")
        .path(&model.path)
        .output(&model.path);

    (job, model)
}

/// Build a draft model once the shared reference database is ready
pub fn build(
    genes: &Genes,
    token: &ReferenceToken,
    config: &Config,
    step_output_dir: &Path,
    executor: &ParallelExecutor,
) -> Result<DraftModel, PipelineError> {
    log::debug!(
        "DEBUG [{}] {}: using reference {}",
        Stage::BuildCarveme,
        genes.id,
        token.index.display()
    );

    let (job, model) = carve(genes, config, step_output_dir);
    executor.submit(job)?;

    Ok(model)
}

/// Make sure the DIAMOND reference database is fresh and queryable
///
/// A stale index is removed, the bootstrap command rebuilds it, and
/// `diamond dbinfo` output becomes the readiness report.
///
/// # Arguments
/// * `config` - The configuration for the pipeline
/// * `output_dir` - Where `db_stats.txt` is written
/// * `executor` - The executor running the jobs
///
/// # Example
/// ```rust, ignore
/// let token = prepare_reference(&config, &output_dir, &executor).unwrap();
/// println!("{}", token.report);
/// ```
pub fn prepare_reference(
    config: &Config,
    output_dir: &Path,
    executor: &ParallelExecutor,
) -> Result<ReferenceToken, PipelineError> {
    let stage = Stage::PrepareReference;
    let index = config.params.carveme.index.clone().ok_or_else(|| {
        PipelineError::InvalidConfig("params.carveme.index is required".into())
    })?;
    let (program, rest) = config
        .params
        .carveme
        .bootstrap
        .split_first()
        .ok_or_else(|| PipelineError::InvalidConfig("empty params.carveme.bootstrap".into()))?;

    if index.exists() {
        log::warn!(
            "WARN [{}]: removing stale index {}",
            stage,
            index.display()
        );
        if !executor.is_dry() {
            std::fs::remove_file(&index)?;
        }
    }

    let bootstrap = Job::new(stage)
        .task(&config.executable(program))
        .args(rest)
        .cpus(config.cpus(stage))
        .output(&index);
    executor.submit(bootstrap)?;

    let stats = output_dir.join(DB_STATS);
    let dbinfo = Job::new(stage)
        .task(&config.executable(DIAMOND))
        .args(&["dbinfo", "-d"])
        .path(&index)
        .stdout(&stats)
        .output(&stats);
    executor.submit(dbinfo)?;

    let report = if executor.is_dry() {
        String::new()
    } else {
        std::fs::read_to_string(&stats)?
    };

    log::info!(
        "INFO [{}]: reference database ready, stats in {}",
        stage,
        stats.display()
    );

    Ok(ReferenceToken {
        index,
        stats,
        report,
    })
}
