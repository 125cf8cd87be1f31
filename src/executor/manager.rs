use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Condvar, Mutex, PoisonError};

use crate::{
    error::PipelineError,
    executor::{
        job::Job,
        runner::{DryRunner, ProcessRunner, Runner},
    },
};

/// Runs jobs under a shared compute budget.
///
/// Every submitted job holds `job.cpus` units of the budget while it runs;
/// jobs that do not fit wait until enough units are released.
pub struct ParallelExecutor {
    /// Strategy the executor was built with
    pub manager: ParallelManager,
    runner: Arc<dyn Runner>,
    budget: CpuBudget,
    /// Every job submitted so far, in submission order
    jobs: Mutex<Vec<Job>>,
}

impl std::fmt::Debug for ParallelExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParallelExecutor")
            .field("manager", &self.manager)
            .field("max_cpus", &self.budget.total)
            .finish()
    }
}

impl ParallelExecutor {
    /// Create a new instance of ParallelExecutor
    ///
    /// # Example
    ///
    /// ```rust
    /// use gemflow::executor::manager::{ParallelExecutor, ParallelManager};
    ///
    /// let executor = ParallelExecutor::new(ParallelManager::Local, 4);
    /// assert_eq!(executor.max_cpus(), 4);
    /// assert!(!executor.is_dry());
    /// ```
    pub fn new(manager: ParallelManager, max_cpus: usize) -> Self {
        let runner: Arc<dyn Runner> = match manager {
            ParallelManager::Local => Arc::new(ProcessRunner),
            ParallelManager::Dry => Arc::new(DryRunner),
        };

        Self::with_runner(manager, runner, max_cpus)
    }

    /// Create an executor around a custom runner
    pub fn with_runner(manager: ParallelManager, runner: Arc<dyn Runner>, max_cpus: usize) -> Self {
        Self {
            manager,
            runner,
            budget: CpuBudget::new(max_cpus),
            jobs: Mutex::new(Vec::new()),
        }
    }

    pub fn max_cpus(&self) -> usize {
        self.budget.total
    }

    /// True when jobs are only logged
    pub fn is_dry(&self) -> bool {
        !self.runner.executes()
    }

    /// Run a job once enough compute units are free
    ///
    /// After a real run every declared output must exist; a missing output
    /// fails the job even if the program exited cleanly.
    pub fn submit(&self, job: Job) -> Result<(), PipelineError> {
        self.jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(job.clone());

        let _permit = self.budget.acquire(job.cpus);
        log::info!("INFO {}: running {}", job.label(), job.program);
        log::debug!("DEBUG {}: {}", job.label(), job.cmd());

        self.runner.run(&job)?;

        if self.runner.executes() {
            let missing = job.missing_outputs();
            if !missing.is_empty() {
                return Err(PipelineError::Task {
                    stage: job.stage,
                    sample: job.sample.clone(),
                    message: format!(
                        "{} finished without producing {}",
                        job.program,
                        missing
                            .iter()
                            .map(|p| p.display().to_string())
                            .collect::<Vec<_>>()
                            .join(", ")
                    ),
                });
            }
        }

        log::info!("INFO {}: {} done!", job.label(), job.program);
        Ok(())
    }

    /// Snapshot of every submitted job
    pub fn jobs(&self) -> Vec<Job> {
        self.jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Write all submitted jobs to a joblist file
    pub fn write_jobs(&self, filename: &Path) -> Result<PathBuf, PipelineError> {
        write_jobs(&self.jobs(), filename)
    }
}

/// Execution strategy of the executor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParallelManager {
    /// Run jobs as local processes
    Local,
    /// Only log jobs and write the joblist
    Dry,
}

impl FromStr for ParallelManager {
    type Err = String;

    /// Convert a string to a ParallelManager
    ///
    /// # Example
    ///
    /// ```rust
    /// use gemflow::executor::manager::ParallelManager;
    ///
    /// let manager: ParallelManager = "local".parse().unwrap();
    /// assert_eq!(manager, ParallelManager::Local);
    /// ```
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" => Ok(ParallelManager::Local),
            "dry" => Ok(ParallelManager::Dry),
            _ => Err(format!("ERROR: Unknown parallel manager: {}", s)),
        }
    }
}

impl std::fmt::Display for ParallelManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParallelManager::Local => write!(f, "local"),
            ParallelManager::Dry => write!(f, "dry"),
        }
    }
}

/// Counting semaphore over compute units
#[derive(Debug)]
pub struct CpuBudget {
    total: usize,
    available: Mutex<usize>,
    released: Condvar,
}

impl CpuBudget {
    pub fn new(total: usize) -> Self {
        let total = total.max(1);

        Self {
            total,
            available: Mutex::new(total),
            released: Condvar::new(),
        }
    }

    /// Block until `units` are free. Requests above the total are clamped.
    pub fn acquire(&self, units: usize) -> CpuPermit<'_> {
        let units = units.clamp(1, self.total);
        let mut available = self
            .available
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        while *available < units {
            available = self
                .released
                .wait(available)
                .unwrap_or_else(PoisonError::into_inner);
        }

        *available -= units;
        CpuPermit {
            budget: self,
            units,
        }
    }

    pub fn available(&self) -> usize {
        *self
            .available
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Units held by a running job; released on drop
#[derive(Debug)]
pub struct CpuPermit<'a> {
    budget: &'a CpuBudget,
    units: usize,
}

impl Drop for CpuPermit<'_> {
    fn drop(&mut self) {
        let mut available = self
            .budget
            .available
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *available += self.units;
        self.budget.released.notify_all();
    }
}

/// Write the jobs to a file, one command line per job
fn write_jobs(jobs: &[Job], filename: &Path) -> Result<PathBuf, PipelineError> {
    let mut file = std::fs::File::create(filename)?;
    for job in jobs {
        writeln!(file, "{}", job.cmd())?;
    }

    Ok(filename.to_path_buf())
}
