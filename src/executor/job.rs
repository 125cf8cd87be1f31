use std::path::{Path, PathBuf};

use crate::{config::Stage, sample::SampleId};

/// Struct to represent a job to be executed
/// by the pipeline
///
/// A job is one external program invocation: its argument vector, the
/// compute units it declares, and the files it promises to produce.
///
/// # Example
///
/// ```rust
/// use gemflow::{config::Stage, executor::job::Job};
///
/// let job = Job::new(Stage::FindGenes)
///     .task("prodigal")
///     .arg("-i")
///     .arg("A.fna")
///     .args(&["-p", "single"]);
///
/// assert_eq!(job.cmd(), "prodigal -i A.fna -p single");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub stage: Stage,
    pub sample: Option<SampleId>,
    pub program: String,
    pub args: Vec<String>,
    pub cpus: usize,
    pub workdir: Option<PathBuf>,
    pub stdout: Option<PathBuf>,
    pub outputs: Vec<PathBuf>,
}

impl Job {
    /// Create a new, empty job for a stage
    pub fn new(stage: Stage) -> Self {
        Self {
            stage,
            sample: None,
            program: String::new(),
            args: Vec::new(),
            cpus: 1,
            workdir: None,
            stdout: None,
            outputs: Vec::new(),
        }
    }

    /// Set the program to run
    pub fn task(mut self, program: &str) -> Self {
        self.program = program.to_string();
        self
    }

    /// Tag the job with the sample it belongs to
    pub fn sample(mut self, id: &SampleId) -> Self {
        self.sample = Some(id.clone());
        self
    }

    /// Add an argument to the job
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add a path argument to the job
    pub fn path(self, path: &Path) -> Self {
        self.arg(path.to_string_lossy().into_owned())
    }

    /// Add multiple arguments to the job
    pub fn args<S: AsRef<str>>(mut self, args: &[S]) -> Self {
        self.args
            .extend(args.iter().map(|arg| arg.as_ref().to_string()));
        self
    }

    /// Declared compute units, used for admission by the executor
    pub fn cpus(mut self, cpus: usize) -> Self {
        self.cpus = cpus.max(1);
        self
    }

    /// Run the program from this directory
    pub fn workdir(mut self, dir: &Path) -> Self {
        self.workdir = Some(dir.to_path_buf());
        self
    }

    /// Capture the program's standard output into a file
    pub fn stdout(mut self, file: &Path) -> Self {
        self.stdout = Some(file.to_path_buf());
        self
    }

    /// Declare a file the job must produce
    pub fn output(mut self, file: &Path) -> Self {
        self.outputs.push(file.to_path_buf());
        self
    }

    /// Declared outputs that are missing on disk
    pub fn missing_outputs(&self) -> Vec<&PathBuf> {
        self.outputs.iter().filter(|out| !out.exists()).collect()
    }

    /// Shell-like rendering used for logs and joblists
    pub fn cmd(&self) -> String {
        let mut cmd = self.program.clone();

        for arg in &self.args {
            cmd.push(' ');
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                cmd.push_str(&format!("'{}'", arg));
            } else {
                cmd.push_str(arg);
            }
        }

        if let Some(stdout) = &self.stdout {
            cmd.push_str(&format!(" > {}", stdout.display()));
        }

        match &self.workdir {
            Some(dir) => format!("cd {} && {}", dir.display(), cmd),
            None => cmd,
        }
    }

    /// Label used in log lines: `[stage] sample`
    pub fn label(&self) -> String {
        match &self.sample {
            Some(id) => format!("[{}] {}", self.stage, id),
            None => format!("[{}]", self.stage),
        }
    }
}
