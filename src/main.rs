use clap::Parser;
use log::{error, info, warn};
use simple_logger::init_with_level;

use gemflow::{
    cli::{Args, RunArgs, SubArgs},
    config::Config,
    core::{run, RunSummary},
    error::PipelineError,
    executor::manager::{ParallelExecutor, ParallelManager},
};

fn main() {
    let start = std::time::Instant::now();
    let args: Args = Args::parse();

    match args.command {
        SubArgs::Run { args: run_args } => {
            if let Err(e) = init_with_level(run_args.level()) {
                eprintln!("ERROR: could not initialize logger: {}", e);
            }

            let summary = execute(args.manager, &run_args).unwrap_or_else(|e| {
                error!("ERROR: {}", e);
                std::process::exit(1);
            });

            if summary.failed() > 0 {
                let failed = PipelineError::SamplesFailed {
                    failed: summary.failed(),
                    total: summary.total(),
                };
                error!("ERROR: {}", failed);
                std::process::exit(1);
            }
        }
    }

    let elapsed = start.elapsed();
    info!("Elapsed time: {:.3?}", elapsed);
}

fn execute(manager: ParallelManager, args: &RunArgs) -> Result<RunSummary, PipelineError> {
    let mut config = match &args.config {
        Some(path) => Config::read(path)?,
        None => {
            warn!("WARN: no config file given, using defaults");
            Config::new()
        }
    };
    config.aware(args).load()?;

    let manager = if args.dry_run {
        ParallelManager::Dry
    } else {
        manager
    };
    let executor = ParallelExecutor::new(manager, config.global.max_cpus);

    run(&config, &executor)
}
