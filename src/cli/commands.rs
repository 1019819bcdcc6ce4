//! CLI command handlers.
//!
//! Each handler does its work through a `SimResult`-returning helper; the
//! public functions only map the outcome to an exit code.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use tracing::error;

use super::output::{
    format_study_header, print_help, print_reproducibility_report, print_summary, print_version,
};
use super::{Args, Command};
use crate::config::StudyConfig;
use crate::error::SimResult;
use crate::store::ResultStore;
use crate::study::{ReproducibilityReport, Study};
use crate::summary::summarize_all;

/// Output directory used when neither `--out` nor the study names one.
pub const DEFAULT_OUTPUT_DIR: &str = "results";

/// Main CLI entry point.
///
/// Dispatches to the appropriate command handler based on parsed arguments.
#[must_use]
pub fn run_cli(args: Args) -> ExitCode {
    match args.command {
        Command::Run {
            study_path,
            seed_override,
            output_dir,
            workers,
        } => run_study(&study_path, seed_override, output_dir, workers),
        Command::Summarize { results_dir } => summarize(&results_dir),
        Command::Verify { study_path } => verify(&study_path),
        Command::Help => {
            print_help();
            ExitCode::SUCCESS
        }
        Command::Version => {
            print_version();
            ExitCode::SUCCESS
        }
    }
}

fn exit_code(outcome: SimResult<bool>) -> ExitCode {
    match outcome {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            error!(error = %e, "Command failed");
            eprintln!("Error: {e}");
            ExitCode::from(1)
        }
    }
}

/// Load a study file and apply command-line overrides.
///
/// # Errors
///
/// Returns I/O, YAML or validation errors from [`StudyConfig::load`].
pub fn load_study(
    path: &Path,
    seed_override: Option<u64>,
    workers: Option<usize>,
) -> SimResult<StudyConfig> {
    let mut study = StudyConfig::load(path)?;
    if let Some(seed) = seed_override {
        study.seed = seed;
    }
    if workers.is_some() {
        study.parallel_workers = workers;
    }
    Ok(study)
}

/// Resolve the output directory: `--out`, then the study file, then
/// [`DEFAULT_OUTPUT_DIR`].
#[must_use]
pub fn resolve_output_dir(cli: Option<PathBuf>, study: &StudyConfig) -> PathBuf {
    cli.or_else(|| study.output_dir.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR))
}

/// Run every configuration of a study and store the results.
#[must_use]
pub fn run_study(
    path: &Path,
    seed_override: Option<u64>,
    output_dir: Option<PathBuf>,
    workers: Option<usize>,
) -> ExitCode {
    exit_code(run_study_inner(path, seed_override, output_dir, workers).map(|_| true))
}

fn run_study_inner(
    path: &Path,
    seed_override: Option<u64>,
    output_dir: Option<PathBuf>,
    workers: Option<usize>,
) -> SimResult<Vec<PathBuf>> {
    let config = load_study(path, seed_override, workers)?;
    let store = ResultStore::new(resolve_output_dir(output_dir, &config));
    let mut study = Study::new(config);
    let configurations = study.configs()?.len();

    println!("{}", format_study_header(path, study.config(), configurations));
    let paths = study.run_and_store(&store, &mut |progress| {
        if progress.replication.completed == progress.replication.total {
            println!(
                "  [{:>3}/{}] {} ✓",
                progress.config_index, progress.config_total, progress.key
            );
        }
    })?;
    println!("\nStored {} results in {}", paths.len(), store.dir().display());
    Ok(paths)
}

/// Print summary tables for stored results.
#[must_use]
pub fn summarize(results_dir: &Path) -> ExitCode {
    exit_code(summarize_inner(results_dir).map(|_| true))
}

fn summarize_inner(results_dir: &Path) -> SimResult<usize> {
    let store = ResultStore::new(results_dir);
    let results = store.load_all()?;
    let summaries = summarize_all(&results);
    print_summary(&summaries);
    Ok(summaries.len())
}

/// Verify that every configuration of a study reproduces bit for bit.
#[must_use]
pub fn verify(path: &Path) -> ExitCode {
    exit_code(verify_inner(path).map(|report| report.passed()))
}

fn verify_inner(path: &Path) -> SimResult<ReproducibilityReport> {
    let config = load_study(path, None, None)?;
    let mut study = Study::new(config);
    println!("Verifying: {}\n", path.display());
    let report = study.verify()?;
    print_reproducibility_report(&report);
    Ok(report)
}
