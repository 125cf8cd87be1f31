use std::path::Path;

use crate::{
    artifact::Genes,
    config::*,
    consts::*,
    error::PipelineError,
    executor::{job::Job, manager::ParallelExecutor},
    sample::Sample,
};

/// Build the prodigal job of one sample
///
/// # Arguments
/// * `sample` - The sample whose assembly is scanned
/// * `config` - The configuration for the pipeline
/// * `step_output_dir` - The `genes/` directory
///
/// # Returns
/// The job and the gene artifact it will produce
///
/// # Example
/// ```rust, ignore
/// let (job, genes) = prodigal(&sample, &config, &genes_dir);
/// assert_eq!(genes.id, sample.id);
/// ```
pub fn prodigal(sample: &Sample, config: &Config, step_output_dir: &Path) -> (Job, Genes) {
    let genes = Genes {
        id: sample.id.clone(),
        coords: step_output_dir.join(format!("{}.{}", sample.id, GFF)),
        nucleotides: step_output_dir.join(format!("{}.{}", sample.id, FNA)),
        proteins: step_output_dir.join(format!("{}.{}", sample.id, FAA)),
    };

    let job = Job::new(Stage::FindGenes)
        .task(&config.executable(PRODIGAL))
        .sample(&sample.id)
        .cpus(config.cpus(Stage::FindGenes))
        .arg("-i")
        .path(&sample.assembly)
        .arg("-o")
        .path(&genes.coords)
        .args(&["-f", GFF])
        .arg("-a")
        .path(&genes.proteins)
        .arg("-d")
        .path(&genes.nucleotides)
        .arg("-p")
        .arg(config.params.prodigal.mode.as_str())
        .output(&genes.coords)
        .output(&genes.proteins)
        .output(&genes.nucleotides);

    (job, genes)
}

/// Predict genes of one sample
pub fn find_genes(
    sample: &Sample,
    config: &Config,
    step_output_dir: &Path,
    executor: &ParallelExecutor,
) -> Result<Genes, PipelineError> {
    let (job, genes) = prodigal(sample, config, step_output_dir);
    executor.submit(job)?;

    Ok(genes)
}
