use clap::{Args, Parser, Subcommand};

use crate::types::LogLevel;

#[derive(Parser, Debug)]
#[command(
    name = "sfmcli-rs",
    version,
    about = "Migrate data extension rows between two Marketing Cloud environments"
)]
pub struct Cli {
    /// Environments file (TOML, one [[environment]] table per environment)
    #[arg(long, global = true, env = "SFMCLI_CONFIG", default_value = "~/.sfmcli-rs/environments.toml")]
    pub config: String,

    /// State database tracking catalog entries and pages
    #[arg(long, global = true, env = "SFMCLI_DB", default_value = "~/.sfmcli-rs/state.db")]
    pub db: String,

    /// Log level
    #[arg(long, global = true, value_enum, default_value = "info")]
    pub log_level: LogLevel,

    /// Concurrent units of work per phase (default: available parallelism)
    #[arg(long, global = true)]
    pub workers: Option<usize>,

    /// Max retries for idempotent API reads
    #[arg(long, global = true, default_value_t = 2)]
    pub max_retries: u32,

    /// Base retry delay in seconds
    #[arg(long, global = true, default_value_t = 5)]
    pub retry_delay: u64,

    /// Disable progress bar
    #[arg(long, global = true)]
    pub no_progress_bar: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Copy rows of every data extension present in both environments
    Populate(PopulateArgs),
    /// Aggregate row-level errors from the target's async job results
    Report(ReportArgs),
    /// Clear all rows of every data extension linked to a target
    Clean(CleanArgs),
    /// Reset failed pages so the next populate attempts them again
    RetryFailed,
    /// Show state database summary
    Status(StatusArgs),
    /// List configured environments
    ///
    /// Environments are read from the `[[environment]]` tables of the file
    /// given by --config. To add or remove one, edit that file; a
    /// `client_secret` left out of it is read from SFMC_<NAME>_CLIENT_SECRET.
    Environments,
}

#[derive(Args, Debug)]
pub struct PopulateArgs {
    /// Environment to read rows from
    pub origin: String,

    /// Environment to write rows to
    pub target: String,

    /// Only transfer data extensions that have a primary key
    #[arg(long)]
    pub update_only: bool,
}

#[derive(Args, Debug)]
pub struct ReportArgs {
    /// Environment the rows were written to
    pub target: String,

    /// CSV file for the report
    #[arg(short, long, default_value = "report.csv")]
    pub output: String,
}

#[derive(Args, Debug)]
pub struct CleanArgs {
    /// Environment whose linked data extensions will be cleared
    pub target: String,

    /// Skip confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// List failed pages with their last error
    #[arg(long)]
    pub failed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_parse_populate() {
        let cli = Cli::try_parse_from(["sfmcli-rs", "populate", "qa", "prod", "--update-only"])
            .unwrap();
        match cli.command {
            Command::Populate(args) => {
                assert_eq!(args.origin, "qa");
                assert_eq!(args.target, "prod");
                assert!(args.update_only);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "sfmcli-rs",
            "report",
            "prod",
            "--workers",
            "3",
            "--log-level",
            "warn",
        ])
        .unwrap();
        assert_eq!(cli.workers, Some(3));
        assert_eq!(cli.log_level, LogLevel::Warn);
        match cli.command {
            Command::Report(args) => assert_eq!(args.output, "report.csv"),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_environments_help_explains_editing() {
        let cmd = Cli::command();
        let sub = cmd.find_subcommand("environments").unwrap();
        let help = sub.get_long_about().unwrap().to_string();
        assert!(help.contains("[[environment]]"));
        assert!(help.contains("--config"));
    }

    #[test]
    fn test_populate_requires_both_environments() {
        assert!(Cli::try_parse_from(["sfmcli-rs", "populate", "qa"]).is_err());
    }
}
