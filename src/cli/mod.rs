//! CLI module for fdrsim.
//!
//! All CLI logic lives here rather than in main.rs so it can be tested.
//! The entry point `run_cli` is called from main.rs with parsed arguments.

mod args;
mod commands;
mod output;

pub use args::{Args, Command};
pub use commands::{
    load_study, resolve_output_dir, run_cli, run_study, summarize, verify, DEFAULT_OUTPUT_DIR,
};
pub use output::{
    format_error_table, format_power_table, format_reproducibility_report, format_study_header,
    print_help, print_reproducibility_report, print_summary, print_version, version_string,
};
