//! CLI argument parsing.
//!
//! Parsing works on any iterator of strings so it can be tested without
//! touching the process environment.

use std::path::PathBuf;

/// CLI arguments container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Args {
    /// The command to execute.
    pub command: Command,
}

/// Available CLI commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run a study and store its results
    Run {
        /// Path to the study YAML file.
        study_path: PathBuf,
        /// Optional seed override.
        seed_override: Option<u64>,
        /// Optional output directory override.
        output_dir: Option<PathBuf>,
        /// Optional worker-count override.
        workers: Option<usize>,
    },
    /// Summarize stored results
    Summarize {
        /// Directory holding `.fdrsim` files.
        results_dir: PathBuf,
    },
    /// Verify reproducibility of a study
    Verify {
        /// Path to the study YAML file.
        study_path: PathBuf,
    },
    /// Show help
    Help,
    /// Show version
    Version,
}

impl Args {
    /// Parse command-line arguments from an iterator.
    ///
    /// The first item is the program name.
    #[must_use]
    pub fn parse_from<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let args: Vec<String> = args.into_iter().map(|s| s.as_ref().to_string()).collect();
        Self::parse_from_vec(&args)
    }

    /// Parse command-line arguments from the environment.
    #[must_use]
    pub fn parse() -> Self {
        Self::parse_from(std::env::args())
    }

    fn parse_from_vec(args: &[String]) -> Self {
        if args.len() < 2 {
            return Self {
                command: Command::Help,
            };
        }

        let command = match args[1].as_str() {
            "run" => Self::parse_run_command(args),
            "summarize" => Self::parse_summarize_command(args),
            "verify" => Self::parse_verify_command(args),
            "-h" | "--help" | "help" => Command::Help,
            "-V" | "--version" | "version" => Command::Version,
            unknown => {
                eprintln!("Unknown command: {unknown}");
                Command::Help
            }
        };

        Self { command }
    }

    /// Parse the 'run' command arguments.
    fn parse_run_command(args: &[String]) -> Command {
        if args.len() < 3 {
            eprintln!("Error: 'run' command requires a study path");
            return Command::Help;
        }

        let mut seed_override = None;
        let mut output_dir = None;
        let mut workers = None;

        let mut i = 3;
        while i < args.len() {
            let value = args.get(i + 1);
            match (args[i].as_str(), value) {
                ("--seed", Some(value)) => {
                    match value.parse() {
                        Ok(seed) => seed_override = Some(seed),
                        Err(_) => eprintln!("Warning: ignoring invalid seed '{value}'"),
                    }
                    i += 2;
                }
                ("--out" | "-o", Some(value)) => {
                    output_dir = Some(PathBuf::from(value));
                    i += 2;
                }
                ("--workers" | "-j", Some(value)) => {
                    match value.parse::<usize>() {
                        Ok(n) if n > 0 => workers = Some(n),
                        _ => eprintln!("Warning: ignoring invalid worker count '{value}'"),
                    }
                    i += 2;
                }
                (flag, _) => {
                    eprintln!("Warning: ignoring argument '{flag}'");
                    i += 1;
                }
            }
        }

        Command::Run {
            study_path: PathBuf::from(&args[2]),
            seed_override,
            output_dir,
            workers,
        }
    }

    /// Parse the 'summarize' command arguments.
    fn parse_summarize_command(args: &[String]) -> Command {
        if args.len() < 3 {
            eprintln!("Error: 'summarize' command requires a results directory");
            return Command::Help;
        }

        Command::Summarize {
            results_dir: PathBuf::from(&args[2]),
        }
    }

    /// Parse the 'verify' command arguments.
    fn parse_verify_command(args: &[String]) -> Command {
        if args.len() < 3 {
            eprintln!("Error: 'verify' command requires a study path");
            return Command::Help;
        }

        Command::Verify {
            study_path: PathBuf::from(&args[2]),
        }
    }
}
