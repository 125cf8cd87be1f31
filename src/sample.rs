use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::{consts::*, error::PipelineError};

/// Identifier of a genome sample, stable for the whole run.
///
/// # Example
///
/// ```rust
/// use gemflow::sample::SampleId;
///
/// let id = SampleId::from_filename("E.coli_K12.fasta").unwrap();
/// assert_eq!(id.as_str(), "E.coli_K12");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SampleId(String);

impl SampleId {
    /// Derive a sample id from an assembly filename.
    ///
    /// The id is everything before the first occurrence of `.f`, the marker
    /// shared by both recognized extensions. The function is total over
    /// filenames; an empty prefix is rejected.
    ///
    /// # Arguments
    ///
    /// * `filename` - Bare filename of the assembly (no directories)
    ///
    /// # Returns
    ///
    /// The derived id or `PipelineError::EmptySampleId`
    pub fn from_filename(filename: &str) -> Result<Self, PipelineError> {
        let id = match filename.find(SAMPLE_ID_MARKER) {
            Some(idx) => &filename[..idx],
            None => filename,
        };

        if id.is_empty() {
            return Err(PipelineError::EmptySampleId(filename.to_string()));
        }

        Ok(Self(id.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SampleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A genome assembly discovered at run start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    pub id: SampleId,
    pub assembly: PathBuf,
}

impl Sample {
    pub fn new(id: SampleId, assembly: PathBuf) -> Self {
        Self { id, assembly }
    }
}

/// Check whether a filename carries one of the recognized assembly extensions.
pub fn is_assembly(filename: &str) -> bool {
    ASSEMBLY_EXTENSIONS
        .iter()
        .any(|ext| filename.len() > ext.len() + 1 && filename.ends_with(&format!(".{}", ext)))
}

/// Discover samples under `<data_dir>/raw`.
///
/// # Arguments
///
/// * `data_dir` - Root data directory holding the `raw` subdirectory
///
/// # Returns
///
/// Samples sorted by id. A missing `raw` directory or zero matches yields an
/// empty list; two files resolving to the same id is an error.
///
/// # Example
///
/// ```rust, no_run
/// let samples = gemflow::sample::discover(std::path::Path::new("data")).unwrap();
/// ```
pub fn discover(data_dir: &Path) -> Result<Vec<Sample>, PipelineError> {
    let raw = data_dir.join(RAW_DIR);

    if !raw.is_dir() {
        log::warn!("WARN: {} does not exist, no samples to process!", raw.display());
        return Ok(Vec::new());
    }

    let mut samples: BTreeMap<SampleId, PathBuf> = BTreeMap::new();

    for entry in std::fs::read_dir(&raw)?.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        let Some(filename) = path.file_name().and_then(|name| name.to_str()) else {
            log::warn!("WARN: skipping non UTF-8 filename {}", path.display());
            continue;
        };

        if !is_assembly(filename) {
            continue;
        }

        let id = SampleId::from_filename(filename)?;
        if let Some(first) = samples.get(&id) {
            return Err(PipelineError::DuplicateSample {
                id,
                first: first.clone(),
                second: path,
            });
        }

        samples.insert(id, path);
    }

    if samples.is_empty() {
        log::warn!("WARN: no assemblies found in {}", raw.display());
    } else {
        log::info!(
            "INFO [discovery]: found {} assemblies in {}",
            samples.len(),
            raw.display()
        );
    }

    Ok(samples
        .into_iter()
        .map(|(id, assembly)| Sample::new(id, assembly))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_is_cut_at_first_marker() {
        assert_eq!(SampleId::from_filename("A.fna").unwrap().as_str(), "A");
        assert_eq!(SampleId::from_filename("B.fasta").unwrap().as_str(), "B");
        assert_eq!(
            SampleId::from_filename("strain.v2.fasta").unwrap().as_str(),
            "strain.v2"
        );
        assert_eq!(SampleId::from_filename("x.faa.fna").unwrap().as_str(), "x");
    }

    #[test]
    fn empty_prefix_is_rejected() {
        assert!(matches!(
            SampleId::from_filename(".fna"),
            Err(PipelineError::EmptySampleId(_))
        ));
    }

    #[test]
    fn recognizes_assembly_extensions() {
        assert!(is_assembly("A.fna"));
        assert!(is_assembly("B.fasta"));
        assert!(!is_assembly("C.faa"));
        assert!(!is_assembly("D.fna.gz"));
        assert!(!is_assembly(".fna"));
    }

    #[test]
    fn discovery_rejects_colliding_ids() {
        let dir = tempfile::tempdir().unwrap();
        let raw = dir.path().join(RAW_DIR);
        std::fs::create_dir_all(&raw).unwrap();
        std::fs::write(raw.join("A.fna"), ">c\nACGT\n").unwrap();
        std::fs::write(raw.join("A.fasta"), ">c\nACGT\n").unwrap();

        assert!(matches!(
            discover(dir.path()),
            Err(PipelineError::DuplicateSample { id, .. }) if id.as_str() == "A"
        ));
    }

    #[test]
    fn discovery_is_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        let raw = dir.path().join(RAW_DIR);
        std::fs::create_dir_all(raw.join("nested.fna")).unwrap();
        for name in ["B.fasta", "A.fna", "notes.txt", "C.faa"] {
            std::fs::write(raw.join(name), ">c\nACGT\n").unwrap();
        }

        let samples = discover(dir.path()).unwrap();
        let ids = samples.iter().map(|s| s.id.as_str()).collect::<Vec<_>>();

        assert_eq!(ids, vec!["A", "B"]);
        assert!(discover(&dir.path().join("missing")).unwrap().is_empty());
    }
}
