use std::path::{Path, PathBuf};

use crate::{
    artifact::DraftModel,
    config::*,
    consts::*,
    error::PipelineError,
    executor::{job::Job, manager::ParallelExecutor},
    gzip,
    sample::Sample,
};

/// Medium file used by gapseq: the configured media database, or the
/// medium bundled with the gapseq installation.
pub fn medium(config: &Config) -> Result<PathBuf, PipelineError> {
    config
        .media()
        .db
        .or_else(|| config.params.gapseq.default_medium.clone())
        .ok_or_else(|| {
            PipelineError::InvalidConfig(
                "gapseq needs global.media_db or params.gapseq.default_medium".into(),
            )
        })
}

/// Build the gapseq job of one sample
///
/// gapseq writes `<id>.xml` into its working directory, so paths handed to
/// it are made absolute.
///
/// # Arguments
/// * `sample` - The sample to model
/// * `config` - The configuration for the pipeline
/// * `step_output_dir` - The `gapseq_models/` directory
///
/// # Returns
/// The job and the uncompressed model it will produce
///
/// # Example
/// ```rust, ignore
/// let (job, xml) = gapseq(&sample, &config, &models_dir).unwrap();
/// ```
pub fn gapseq(
    sample: &Sample,
    config: &Config,
    step_output_dir: &Path,
) -> Result<(Job, PathBuf), PipelineError> {
    let cpus = config.cpus(Stage::BuildGapseq);
    let medium = std::path::absolute(medium(config)?)?;
    let assembly = std::path::absolute(&sample.assembly)?;
    let xml = step_output_dir.join(format!("{}.{}", sample.id, XML));

    let job = Job::new(Stage::BuildGapseq)
        .task(&config.executable(GAPSEQ))
        .sample(&sample.id)
        .cpus(cpus)
        .arg("doall")
        .path(&assembly)
        .path(&medium)
        .arg("-K")
        .arg(cpus.to_string())
        .workdir(step_output_dir)
        .output(&xml);

    Ok((job, xml))
}

/// Build and compress the gapseq model of one sample
///
/// The compressed output follows the `<id>.xml.gz` convention of carveme
/// models so the quality scorer does not care which builder ran.
pub fn build(
    sample: &Sample,
    config: &Config,
    step_output_dir: &Path,
    executor: &ParallelExecutor,
) -> Result<DraftModel, PipelineError> {
    let stage = Stage::BuildGapseq;
    let (job, xml) =
        gapseq(sample, config, step_output_dir).map_err(|e| PipelineError::task(stage, &sample.id, e.to_string()))?;
    executor.submit(job)?;

    let model = DraftModel {
        id: sample.id.clone(),
        path: step_output_dir.join(format!("{}.{}", sample.id, XML_GZ)),
    };

    if executor.is_dry() {
        log::info!(
            "DRY-RUN [{}] {}: gzip {} > {}",
            stage,
            sample.id,
            xml.display(),
            model.path.display()
        );
        return Ok(model);
    }

    gzip::compress(&xml, &model.path)
        .and_then(|_| std::fs::remove_file(&xml))
        .map_err(|e| PipelineError::task(stage, &sample.id, format!("compression failed: {}", e)))?;

    log::info!("INFO [{}] {}: compressed model written!", stage, sample.id);

    Ok(model)
}
