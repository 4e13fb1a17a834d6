use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Run shell commands on interval, cron and delay schedules.
#[derive(Parser, Debug)]
#[command(name = "tickwork-worker", about = "Run commands on a schedule", version)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Load a job file and run its tasks until Ctrl-C
    Run(RunArgs),
    /// Validate a job file without running anything
    Check(CheckArgs),
    /// Print the next fire times of a cron expression
    Next(NextArgs),
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Path to the job file
    #[arg(long, short, env = "TICKWORK_CONFIG")]
    pub config: PathBuf,

    /// Override `scheduler.max_workers`
    #[arg(long)]
    pub max_workers: Option<usize>,

    /// Override `scheduler.queue_size`
    #[arg(long)]
    pub queue_size: Option<usize>,

    /// Override `scheduler.shutdown_grace` (e.g. "10s")
    #[arg(long)]
    pub shutdown_grace: Option<String>,

    /// Override `scheduler.log_level` (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,
}

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Path to the job file
    #[arg(long, short, env = "TICKWORK_CONFIG")]
    pub config: PathBuf,
}

#[derive(Args, Debug)]
pub struct NextArgs {
    /// Six-field cron expression: sec min hour day-of-month month day-of-week
    #[arg(long)]
    pub cron: String,

    /// Number of fire times to print
    #[arg(long, default_value = "5")]
    pub count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_run_with_overrides() {
        let args = CliArgs::try_parse_from([
            "tickwork-worker",
            "run",
            "--config",
            "jobs.toml",
            "--max-workers",
            "3",
            "--shutdown-grace",
            "2s",
        ])
        .unwrap();
        match args.command {
            Command::Run(run) => {
                assert_eq!(run.config, PathBuf::from("jobs.toml"));
                assert_eq!(run.max_workers, Some(3));
                assert_eq!(run.shutdown_grace.as_deref(), Some("2s"));
                assert_eq!(run.queue_size, None);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn next_defaults_to_five() {
        let args =
            CliArgs::try_parse_from(["tickwork-worker", "next", "--cron", "0 * * * * *"]).unwrap();
        match args.command {
            Command::Next(next) => assert_eq!(next.count, 5),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        CliArgs::command().debug_assert();
    }
}
