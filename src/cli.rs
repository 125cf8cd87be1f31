use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::executor::manager::ParallelManager;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: SubArgs,

    #[arg(
        short = 'm',
        long = "manager",
        help = "Parallel executor strategy (local or dry)",
        value_name = "MANAGER",
        required = false,
        global = true,
        default_value = "local"
    )]
    pub manager: ParallelManager,
}

#[derive(Debug, Subcommand)]
pub enum SubArgs {
    #[command(name = "run")]
    Run {
        #[command(flatten)]
        args: RunArgs,
    },
}

/// Run the pipeline from start to finish
///
/// # Example
///
/// ```bash,no_run
/// gemflow run -c config.toml
/// gemflow run --data-dir data --method gapseq --media-db media.csv
/// ```
///
/// # Arguments
///
/// * `config` - Path to the configuration file
/// * `data_dir` - Directory holding `raw/` assemblies
/// * `output_dir` - Where stage outputs are published (defaults to `data_dir`)
/// * `method` - Model building strategy: carveme or gapseq
/// * `media_db` - Growth media database
/// * `media` - Comma separated growth media names (carveme only)
/// * `max_cpus` - Compute units shared by all jobs
/// * `annotate` - Annotate carveme models against the universal model
/// * `dry_run` - Log the jobs and write the joblist without running them
/// * `verbose` - Increase verbosity
/// * `quiet` - Decrease verbosity
///
/// # Note
///
/// * Command line values override the configuration file
/// * Without a configuration file every parameter takes its default; the
///   CarveMe index and the gapseq default medium are located from the
///   installed tools
#[derive(Debug, Parser, Clone, Default)]
pub struct RunArgs {
    #[arg(
        short = 'c',
        long = "config",
        help = "Path to the configuration file",
        value_name = "CONFIG"
    )]
    pub config: Option<PathBuf>,

    #[arg(
        short = 'd',
        long = "data-dir",
        help = "Directory holding raw/ assemblies",
        value_name = "DIR"
    )]
    pub data_dir: Option<PathBuf>,

    #[arg(
        short = 'o',
        long = "output-dir",
        help = "Directory stage outputs are written to",
        value_name = "DIR"
    )]
    pub output_dir: Option<PathBuf>,

    #[arg(
        long = "method",
        help = "Model building strategy: carveme or gapseq",
        value_name = "METHOD"
    )]
    pub method: Option<String>,

    #[arg(long = "media-db", help = "Growth media database", value_name = "FILE")]
    pub media_db: Option<PathBuf>,

    #[arg(
        long = "media",
        help = "Comma separated growth media names",
        value_name = "MEDIA"
    )]
    pub media: Option<String>,

    #[arg(
        short = 't',
        long = "max-cpus",
        help = "Compute units shared by all jobs",
        value_name = "N"
    )]
    pub max_cpus: Option<usize>,

    #[arg(
        short = 'a',
        long = "annotate",
        help = "Annotate carveme models against the universal model"
    )]
    pub annotate: bool,

    #[arg(long = "dry-run", help = "Dry run the pipeline")]
    pub dry_run: bool,

    #[arg(short = 'v', long = "verbose", help = "Increase verbosity")]
    pub verbose: bool,

    #[arg(
        short = 'q',
        long = "quiet",
        help = "Decrease verbosity",
        conflicts_with = "verbose"
    )]
    pub quiet: bool,
}

impl RunArgs {
    /// Log level requested on the command line.
    pub fn level(&self) -> log::Level {
        if self.verbose {
            log::Level::Debug
        } else if self.quiet {
            log::Level::Warn
        } else {
            log::Level::Info
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_run_overrides() {
        let args = Args::parse_from([
            "gemflow",
            "run",
            "--data-dir",
            "genomes",
            "--method",
            "gapseq",
            "--media-db",
            "media.csv",
            "--dry-run",
            "-v",
        ]);

        let SubArgs::Run { args: run } = args.command;
        assert_eq!(args.manager, ParallelManager::Local);
        assert_eq!(run.data_dir, Some(PathBuf::from("genomes")));
        assert_eq!(run.method.as_deref(), Some("gapseq"));
        assert!(run.dry_run);
        assert_eq!(run.level(), log::Level::Debug);
    }

    #[test]
    fn manager_is_global() {
        let args = Args::parse_from(["gemflow", "run", "--manager", "dry"]);
        assert_eq!(args.manager, ParallelManager::Dry);
    }
}
