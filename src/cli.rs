//! Command-line interface for running events through the job processor locally.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Run queue-triggered job batches through the retry and dispatch core.
#[derive(Debug, Parser)]
#[command(name = "jobset", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Retries per job after the first attempt (overrides `max_attempts`).
    #[arg(long, global = true)]
    pub max_attempts: Option<u32>,

    /// Log at debug level.
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Invoke the demo handler on an event file (a jobset or a `Records` batch).
    Run {
        /// Path to the JSON event.
        event: PathBuf,

        /// Product ids whose handler call always fails.
        #[arg(long = "fail", value_name = "PRODUCT_ID")]
        fail: Vec<String>,

        /// Register the demo handler in bulk mode.
        #[arg(long, default_value_t = false)]
        bulk: bool,
    },

    /// Validate a jobset file.
    Validate {
        /// Path to the JSON jobset.
        file: PathBuf,

        /// Directory of `<name>.json` schemas overriding the built-ins.
        #[arg(long)]
        schema_dir: Option<PathBuf>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_parses_run_subcommand() {
        let cli = Cli::parse_from(["jobset", "run", "event.json", "--fail", "p-1", "--fail", "p-2"]);
        match cli.command {
            Command::Run { event, fail, bulk } => {
                assert_eq!(event, PathBuf::from("event.json"));
                assert_eq!(fail, vec!["p-1", "p-2"]);
                assert!(!bulk);
            }
            _ => panic!("expected Run command"),
        }
    }

    #[test]
    fn cli_parses_global_flags() {
        let cli = Cli::parse_from([
            "jobset",
            "--max-attempts",
            "1",
            "--verbose",
            "validate",
            "jobs.json",
        ]);
        assert!(cli.verbose);
        assert_eq!(cli.max_attempts, Some(1));
        assert!(matches!(cli.command, Command::Validate { schema_dir: None, .. }));
    }

    #[test]
    fn cli_verify() {
        Cli::command().debug_assert();
    }
}
