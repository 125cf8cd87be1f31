use std::fs::File;
use std::process::{Command, Stdio};

use crate::{error::PipelineError, executor::job::Job};

/// Number of stderr lines kept when a tool fails.
const STDERR_TAIL: usize = 20;

/// Something able to carry out a [`Job`].
///
/// The executor owns admission and bookkeeping; a runner only has to run
/// the program and report failure.
pub trait Runner: Send + Sync {
    fn run(&self, job: &Job) -> Result<(), PipelineError>;

    /// Whether jobs are really executed (and outputs can be checked).
    fn executes(&self) -> bool {
        true
    }
}

/// Runs jobs as local child processes.
#[derive(Debug, Default, Clone)]
pub struct ProcessRunner;

impl Runner for ProcessRunner {
    fn run(&self, job: &Job) -> Result<(), PipelineError> {
        let fail = |message: String| PipelineError::Task {
            stage: job.stage,
            sample: job.sample.clone(),
            message,
        };

        let mut cmd = Command::new(&job.program);
        cmd.args(&job.args).stdin(Stdio::null());

        if let Some(dir) = &job.workdir {
            cmd.current_dir(dir);
        }

        if let Some(stdout) = &job.stdout {
            let file = File::create(stdout).map_err(|e| {
                fail(format!("cannot create {}: {}", stdout.display(), e))
            })?;
            cmd.stdout(Stdio::from(file));
        } else {
            cmd.stdout(Stdio::null());
        }

        let output = cmd
            .output()
            .map_err(|e| fail(format!("failed to execute {}: {}", job.program, e)))?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let lines = stderr.lines().collect::<Vec<_>>();
        let tail = lines[lines.len().saturating_sub(STDERR_TAIL)..].join("\n");

        Err(fail(format!(
            "{} exited with {}\n{}",
            job.program, output.status, tail
        )))
    }
}

/// Logs jobs instead of running them.
#[derive(Debug, Default, Clone)]
pub struct DryRunner;

impl Runner for DryRunner {
    fn run(&self, job: &Job) -> Result<(), PipelineError> {
        log::info!("DRY-RUN {}: {}", job.label(), job.cmd());
        Ok(())
    }

    fn executes(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Stage;

    #[test]
    fn failing_program_reports_stderr_tail() {
        let job = Job::new(Stage::FindGenes)
            .task("sh")
            .args(&["-c", "echo 'no sequences found' >&2; exit 3"]);

        match ProcessRunner.run(&job) {
            Err(PipelineError::Task { stage, message, .. }) => {
                assert_eq!(stage, Stage::FindGenes);
                assert!(message.contains("no sequences found"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn stdout_is_captured_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let stats = dir.path().join("db_stats.txt");
        let job = Job::new(Stage::PrepareReference)
            .task("echo")
            .arg("Sequences 42")
            .stdout(&stats);

        ProcessRunner.run(&job).unwrap();

        assert_eq!(std::fs::read_to_string(&stats).unwrap(), "Sequences 42\n");
    }

    #[test]
    fn dry_runner_never_executes() {
        let job = Job::new(Stage::ScoreQuality).task("definitely-not-installed");

        assert!(DryRunner.run(&job).is_ok());
        assert!(!DryRunner.executes());
    }
}
