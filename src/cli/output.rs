//! CLI output formatting.
//!
//! Tables are built as strings so tests can inspect them; the `print_*`
//! functions only write them to stdout.

use std::fmt::Write as _;
use std::path::Path;

use crate::config::StudyConfig;
use crate::study::ReproducibilityReport;
use crate::summary::ConfigSummary;

const RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━";

/// Version line.
#[must_use]
pub fn version_string() -> String {
    format!(
        "fdrsim {} ({})",
        env!("FDRSIM_VERSION"),
        env!("FDRSIM_GIT_HASH")
    )
}

/// Print version information.
pub fn print_version() {
    println!("{}", version_string());
}

/// Print help message.
pub fn print_help() {
    println!(
        r"fdrsim - Monte Carlo comparison of Bonferroni, Hochberg and Benjamini-Hochberg

USAGE:
    fdrsim <COMMAND> [OPTIONS]

COMMANDS:
    run <study.yaml>            Run every configuration and store the results
        --seed <N>              Override the study seed
        --out, -o <DIR>         Output directory (default: study output_dir or ./results)
        --workers, -j <N>       Run replications on N worker threads

    summarize <DIR>             Print power and FDR tables for stored results

    verify <study.yaml>         Run every configuration twice and compare bit for bit

    help                        Show this help message
    version                     Show version information

EXAMPLES:
    fdrsim run study.yaml --out results
    fdrsim run study.yaml --seed 7 --workers 8
    fdrsim summarize results
    fdrsim verify study.yaml

Logging is controlled through RUST_LOG (default: info).
"
    );
}

/// Header printed before a study runs.
#[must_use]
pub fn format_study_header(path: &Path, study: &StudyConfig, configurations: usize) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{RULE}");
    let _ = writeln!(out, "Study: {}", path.display());
    let _ = writeln!(out, "  m values:         {:?}", study.m_values);
    let _ = writeln!(out, "  null proportions: {:?}", study.null_proportions);
    let codes: Vec<String> = study.distributions.iter().map(ToString::to_string).collect();
    let _ = writeln!(out, "  distributions:    {}", codes.join(", "));
    let _ = writeln!(
        out,
        "  L = {}, alpha = {}, n_reps = {}, seed = {}",
        study.signal_strength, study.alpha, study.n_reps, study.seed
    );
    let _ = writeln!(out, "  configurations:   {configurations}");
    let _ = write!(out, "{RULE}");
    out
}

fn cell(value: f64) -> String {
    if value.is_nan() {
        "NA".to_string()
    } else {
        format!("{value:.4}")
    }
}

/// Power comparison table, one row per configuration.
#[must_use]
pub fn format_power_table(summaries: &[ConfigSummary]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Power (mean over replications)");
    let _ = writeln!(
        out,
        "{:>4} {:>4} {:>4} {:>6} {:>4} {:>10} {:>10} {:>10} {:>8}",
        "m", "m0", "m1", "null%", "dist", "bonf", "hoch", "bh", "bh_gain"
    );
    for s in summaries {
        let _ = writeln!(
            out,
            "{:>4} {:>4} {:>4} {:>6.0} {:>4} {:>10} {:>10} {:>10} {:>8}",
            s.m(),
            s.m0(),
            s.m1,
            s.null_proportion * 100.0,
            s.distribution(),
            cell(s.bonferroni.power.mean),
            cell(s.hochberg.power.mean),
            cell(s.benjamini_hochberg.power.mean),
            cell(s.power_gain_bh),
        );
    }
    out
}

/// FDR and FWER table with the BH control check.
#[must_use]
pub fn format_error_table(summaries: &[ConfigSummary]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Error rates (mean over replications)");
    let _ = writeln!(
        out,
        "{:>4} {:>4} {:>4} {:>9} {:>9} {:>9} {:>9} {:>9} {:>9} {:>10}",
        "m", "m0", "dist", "fdr_bonf", "fdr_hoch", "fdr_bh", "fwer_bonf", "fwer_hoch", "bound", "controlled"
    );
    for s in summaries {
        let _ = writeln!(
            out,
            "{:>4} {:>4} {:>4} {:>9} {:>9} {:>9} {:>9} {:>9} {:>9} {:>10}",
            s.m(),
            s.m0(),
            s.distribution(),
            cell(s.bonferroni.fdr.mean),
            cell(s.hochberg.fdr.mean),
            cell(s.benjamini_hochberg.fdr.mean),
            cell(s.bonferroni.fwer_mean),
            cell(s.hochberg.fwer_mean),
            cell(s.fdr_bound),
            if s.fdr_controlled { "yes" } else { "NO" },
        );
    }
    out
}

/// Print both summary tables.
pub fn print_summary(summaries: &[ConfigSummary]) {
    println!("{RULE}");
    println!("{}", format_power_table(summaries));
    println!("{}", format_error_table(summaries));
    let uncontrolled = summaries.iter().filter(|s| !s.fdr_controlled).count();
    if uncontrolled == 0 {
        println!("✓ BH FDR within bound for all {} configurations", summaries.len());
    } else {
        println!("✗ BH FDR above bound for {uncontrolled} of {} configurations", summaries.len());
    }
    println!("{RULE}");
}

/// Reproducibility verdict.
#[must_use]
pub fn format_reproducibility_report(report: &ReproducibilityReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{RULE}");
    let _ = writeln!(out, "Reproducibility:");
    let _ = writeln!(out, "  Configurations checked: {}", report.checked);
    let _ = writeln!(out, "  Mismatches:             {}", report.mismatches.len());
    for key in &report.mismatches {
        let _ = writeln!(out, "    ✗ {key}");
    }
    let _ = writeln!(out, "{RULE}");
    if report.passed() {
        let _ = write!(out, "✓ Result: IDENTICAL");
    } else {
        let _ = write!(out, "✗ Result: DIFFERENT");
    }
    out
}

/// Print the reproducibility verdict.
pub fn print_reproducibility_report(report: &ReproducibilityReport) {
    println!("{}", format_reproducibility_report(report));
}
