//! Files produced by each stage, always tagged with the sample they belong to.

use std::path::PathBuf;

use crate::sample::SampleId;

/// Gene predictions of one assembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Genes {
    pub id: SampleId,
    /// Structural byproduct, not consumed downstream.
    pub coords: PathBuf,
    pub nucleotides: PathBuf,
    pub proteins: PathBuf,
}

/// A compressed metabolic model, draft or annotated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftModel {
    pub id: SampleId,
    pub path: PathBuf,
}

/// memote snapshot report of one model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualityReport {
    pub id: SampleId,
    pub path: PathBuf,
}

/// Signals that the shared DIAMOND reference database is built and queryable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceToken {
    pub index: PathBuf,
    pub stats: PathBuf,
    /// `diamond dbinfo` output
    pub report: String,
}
