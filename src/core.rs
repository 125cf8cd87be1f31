use chrono::{DateTime, Local};
use dashmap::DashMap;
use hashbrown::HashMap;
use rayon::prelude::*;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::{
    artifact::{DraftModel, QualityReport, ReferenceToken},
    channel::Broadcast,
    config::*,
    consts::*,
    error::PipelineError,
    executor::manager::ParallelExecutor,
    sample::{self, Sample, SampleId},
};

pub mod annotate;
pub mod carveme;
pub mod gapseq;
pub mod memote;
pub mod prodigal;
pub mod universal;

use annotate::UniversalDatabase;
use universal::{Fetcher, HttpFetcher};

/// Routing states of the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    DiscoveringSamples,
    RunningCarveme,
    RunningGapseq,
    ScoringQuality,
    Failed,
    Done,
}

impl PipelineState {
    pub fn to_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::DiscoveringSamples => "discovering-samples",
            Self::RunningCarveme => "running-carveme",
            Self::RunningGapseq => "running-gapseq",
            Self::ScoringQuality => "scoring-quality",
            Self::Failed => "failed",
            Self::Done => "done",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Failed | Self::Done)
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_str())
    }
}

/// Final state of one sample chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SampleOutcome {
    Completed(QualityReport),
    Failed(String),
    /// Never reached its next stage because another sample failed first
    Cancelled,
}

/// What a finished run leaves behind.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: String,
    pub history: Vec<PipelineState>,
    pub outcomes: BTreeMap<SampleId, SampleOutcome>,
    pub joblist: Option<PathBuf>,
    pub started: DateTime<Local>,
    pub finished: DateTime<Local>,
}

impl RunSummary {
    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    pub fn completed(&self) -> usize {
        self.outcomes
            .values()
            .filter(|outcome| matches!(outcome, SampleOutcome::Completed(_)))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.total() - self.completed()
    }

    pub fn reports(&self) -> Vec<&QualityReport> {
        self.outcomes
            .values()
            .filter_map(|outcome| match outcome {
                SampleOutcome::Completed(report) => Some(report),
                _ => None,
            })
            .collect()
    }
}

/// Drives a run: discovers samples, resolves the stage graph and streams
/// every sample through it.
///
/// # Example
///
/// ```rust, ignore
/// use gemflow::core::{universal::HttpFetcher, Pipeline};
///
/// let fetcher = HttpFetcher::new().unwrap();
/// let summary = Pipeline::new(&config, &executor, &fetcher).run().unwrap();
/// assert_eq!(summary.failed(), 0);
/// ```
pub struct Pipeline<'a> {
    config: &'a Config,
    executor: &'a ParallelExecutor,
    fetcher: &'a dyn Fetcher,
    state: PipelineState,
    history: Vec<PipelineState>,
}

/// Everything a sample chain reads; shared by reference across the pool.
struct Streams<'s> {
    topology: Topology,
    dirs: HashMap<Stage, PathBuf>,
    reference: Broadcast<ReferenceToken>,
    universal: Broadcast<UniversalDatabase>,
    cancelled: AtomicBool,
    /// Set once the first model reaches the scorer
    scoring: AtomicBool,
    first_error: Mutex<Option<PipelineError>>,
    outcomes: DashMap<SampleId, SampleOutcome>,
    policy: FailurePolicy,
    output_dir: &'s Path,
}

impl Streams<'_> {
    fn dir(&self, stage: Stage) -> Result<&Path, PipelineError> {
        self.dirs.get(&stage).map(PathBuf::as_path).ok_or_else(|| {
            PipelineError::InvalidConfig(format!("stage {} is not part of this run", stage))
        })
    }

    fn checkpoint(&self) -> Result<(), PipelineError> {
        if self.cancelled.load(Ordering::SeqCst) {
            return Err(PipelineError::Cancelled);
        }

        Ok(())
    }

    /// Record a failed chain and decide whether the rest must stop.
    fn fail(&self, id: &SampleId, error: PipelineError) {
        log::error!("ERROR: {}", error);
        self.outcomes
            .insert(id.clone(), SampleOutcome::Failed(error.to_string()));

        if !error.is_fatal() && self.policy == FailurePolicy::Isolate {
            return;
        }

        self.cancelled.store(true, Ordering::SeqCst);
        let mut first = self
            .first_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let replace = match first.as_ref() {
            None => true,
            Some(previous) => error.is_fatal() && !previous.is_fatal(),
        };
        if replace {
            *first = Some(error);
        }
    }

    /// Failure of a run-scoped producer, surfaced even when no sample joined it.
    fn shared_failure(&self) -> Option<PipelineError> {
        if self.topology.includes(Stage::PrepareReference) {
            if let Err(e) = self.reference.wait() {
                return Some(e);
            }
        }
        if self.topology.includes(Stage::FetchUniversal) {
            if let Err(e) = self.universal.wait() {
                return Some(e);
            }
        }

        None
    }
}

impl<'a> Pipeline<'a> {
    pub fn new(config: &'a Config, executor: &'a ParallelExecutor, fetcher: &'a dyn Fetcher) -> Self {
        Self {
            config,
            executor,
            fetcher,
            state: PipelineState::Idle,
            history: vec![PipelineState::Idle],
        }
    }

    fn transition(&mut self, next: PipelineState) {
        log::debug!("DEBUG: {} -> {}", self.state, next);
        self.state = next;
        self.history.push(next);
    }

    fn fail(&mut self, error: PipelineError) -> PipelineError {
        self.transition(PipelineState::Failed);
        error
    }

    /// Run every sample through the selected stage graph
    ///
    /// # Returns
    /// * `Ok(summary)` when the run finished; with the `isolate` policy the
    ///   summary may contain failed samples
    /// * `Err` on configuration errors, shared-resource failures and, with
    ///   the `abort` policy, the first per-sample failure
    pub fn run(mut self) -> Result<RunSummary, PipelineError> {
        let started = Local::now();
        let config = self.config;
        let executor = self.executor;

        log::info!(
            "INFO: starting run {} with {} CPU units ({})",
            config.get_run_id(),
            executor.max_cpus(),
            executor.manager
        );

        self.transition(PipelineState::DiscoveringSamples);
        let samples = match sample::discover(&config.global.data_dir) {
            Ok(samples) => samples,
            Err(e) => return Err(self.fail(e)),
        };
        log::info!("INFO: found {} samples", samples.len());

        let topology = match Topology::resolve(config) {
            Ok(topology) => topology,
            Err(e) => return Err(self.fail(e)),
        };

        self.transition(match topology.method {
            Method::Carveme => PipelineState::RunningCarveme,
            Method::Gapseq => PipelineState::RunningGapseq,
        });

        let output_dir = config.output_dir();
        let mut dirs = HashMap::new();
        for stage in topology.stages() {
            match config.step_output_dir(stage) {
                Ok(dir) => dirs.insert(stage, dir),
                Err(e) => return Err(self.fail(e)),
            };
        }
        log::info!(
            "INFO: stages {} publish under {}",
            topology
                .stages()
                .iter()
                .map(Stage::to_str)
                .collect::<Vec<_>>()
                .join(" -> "),
            output_dir.display()
        );

        let pool = match rayon::ThreadPoolBuilder::new()
            .num_threads(executor.max_cpus())
            .build()
        {
            Ok(pool) => pool,
            Err(e) => return Err(self.fail(PipelineError::InvalidConfig(e.to_string()))),
        };

        let streams = Streams {
            topology,
            dirs,
            reference: Broadcast::new(Stage::PrepareReference),
            universal: Broadcast::new(Stage::FetchUniversal),
            cancelled: AtomicBool::new(false),
            scoring: AtomicBool::new(false),
            first_error: Mutex::new(None),
            outcomes: DashMap::new(),
            policy: config.global.on_sample_failure,
            output_dir: &output_dir,
        };

        let fetcher = self.fetcher;
        std::thread::scope(|scope| {
            if topology.includes(Stage::PrepareReference) {
                scope.spawn(|| {
                    let token = carveme::prepare_reference(config, streams.output_dir, executor);
                    streams.reference.fulfill(token);
                });
            }

            if topology.includes(Stage::FetchUniversal) {
                scope.spawn(|| {
                    let db = universal::fetch(config, streams.output_dir, fetcher, executor.is_dry());
                    streams.universal.fulfill(db);
                });
            }

            pool.install(|| {
                samples.par_iter().for_each(|sample| {
                    match self.process(sample, &streams) {
                        Ok(report) => {
                            streams
                                .outcomes
                                .insert(sample.id.clone(), SampleOutcome::Completed(report));
                        }
                        Err(PipelineError::Cancelled) => {
                            log::warn!("WARN: {} cancelled", sample.id);
                            streams
                                .outcomes
                                .insert(sample.id.clone(), SampleOutcome::Cancelled);
                        }
                        Err(e) => streams.fail(&sample.id, e),
                    }
                });
            });
        });

        if streams.scoring.load(Ordering::SeqCst) {
            self.transition(PipelineState::ScoringQuality);
        }

        let joblist = if executor.is_dry() {
            let filename = output_dir.join(format!(
                "{}_{}.{}",
                JOBLIST_PREFIX,
                config.get_run_id(),
                JOBLIST_EXT
            ));
            let written = match executor.write_jobs(&filename) {
                Ok(written) => written,
                Err(e) => return Err(self.fail(e)),
            };
            log::info!("INFO: joblist written to {}", written.display());
            Some(written)
        } else {
            None
        };

        let shared = streams.shared_failure();
        let first_error = streams
            .first_error
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(error) = shared.or(first_error) {
            return Err(self.fail(error));
        }

        self.transition(PipelineState::Done);

        let summary = RunSummary {
            run_id: config.get_run_id(),
            history: self.history,
            outcomes: streams.outcomes.into_iter().collect(),
            joblist,
            started,
            finished: Local::now(),
        };

        log::info!(
            "INFO: {} of {} samples scored in {}s",
            summary.completed(),
            summary.total(),
            (summary.finished - summary.started).num_seconds()
        );

        Ok(summary)
    }

    /// One sample, start to finish. Stages of a sample never overlap.
    fn process(&self, sample: &Sample, streams: &Streams) -> Result<QualityReport, PipelineError> {
        let config = self.config;
        let executor = self.executor;
        let topology = streams.topology;

        let model: DraftModel = match topology.method {
            Method::Carveme => {
                streams.checkpoint()?;
                let genes =
                    prodigal::find_genes(sample, config, streams.dir(Stage::FindGenes)?, executor)?;

                let (genes, token) = streams.reference.join(genes)?;
                streams.checkpoint()?;
                let draft = carveme::build(
                    &genes,
                    &token,
                    config,
                    streams.dir(Stage::BuildCarveme)?,
                    executor,
                )?;

                if topology.models_stage() == Stage::Annotate {
                    let (draft, db) = streams.universal.join(draft)?;
                    streams.checkpoint()?;
                    annotate::annotate(
                        &draft,
                        &db,
                        streams.dir(Stage::Annotate)?,
                        executor.is_dry(),
                    )?
                } else {
                    draft
                }
            }
            Method::Gapseq => {
                streams.checkpoint()?;
                gapseq::build(sample, config, streams.dir(Stage::BuildGapseq)?, executor)?
            }
        };

        streams.checkpoint()?;
        streams.scoring.store(true, Ordering::SeqCst);
        log::debug!(
            "DEBUG: {} scoring {} output {}",
            sample.id,
            topology.models_stage(),
            model.path.display()
        );
        memote::score(&model, config, streams.dir(Stage::ScoreQuality)?, executor)
    }
}

/// Run the pipeline with the default HTTP fetcher
///
/// # Example
///
/// ```rust, ignore
/// let summary = gemflow::core::run(&config, &executor).unwrap();
/// ```
pub fn run(config: &Config, executor: &ParallelExecutor) -> Result<RunSummary, PipelineError> {
    let fetcher = HttpFetcher::new()?;
    Pipeline::new(config, executor, &fetcher).run()
}
