use std::path::PathBuf;

use thiserror::Error;

use crate::config::Stage;
use crate::sample::SampleId;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("unrecognized build method '{0}' (expected 'carveme' or 'gapseq')")]
    InvalidMethod(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to read config file at {path}: {message}")]
    ConfigRead { path: PathBuf, message: String },

    #[error("failed to parse config file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("cannot derive a sample id from '{0}'")]
    EmptySampleId(String),

    #[error("duplicate sample id '{id}' ({first} and {second})")]
    DuplicateSample {
        id: SampleId,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("[{stage}] shared resource unavailable: {message}")]
    SharedResource { stage: Stage, message: String },

    #[error("[{stage}] {}: {message}", sample.as_ref().map(|s| s.as_str()).unwrap_or("run"))]
    Task {
        stage: Stage,
        sample: Option<SampleId>,
        message: String,
    },

    #[error("failed to parse model {path}: {message}")]
    ModelParse { path: PathBuf, message: String },

    #[error("download failed: {0}")]
    Http(String),

    #[error("download returned status {status}: {message}")]
    HttpStatus { status: u16, message: String },

    #[error("{failed} of {total} samples failed")]
    SamplesFailed { failed: usize, total: usize },

    #[error("run cancelled after an earlier failure")]
    Cancelled,

    #[error("filesystem error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Build a per-sample task failure.
    pub fn task(stage: Stage, sample: &SampleId, message: impl Into<String>) -> Self {
        PipelineError::Task {
            stage,
            sample: Some(sample.clone()),
            message: message.into(),
        }
    }

    /// Errors raised before any stage runs.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            PipelineError::InvalidMethod(_)
                | PipelineError::InvalidConfig(_)
                | PipelineError::ConfigRead { .. }
                | PipelineError::ConfigParse(_)
                | PipelineError::EmptySampleId(_)
                | PipelineError::DuplicateSample { .. }
        )
    }

    /// Shared-resource failures take the whole run down regardless of policy.
    pub fn is_fatal(&self) -> bool {
        self.is_config() || matches!(self, PipelineError::SharedResource { .. })
    }
}
