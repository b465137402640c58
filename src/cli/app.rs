use crate::common::{CONFIG_DIR_ENV, STATE_DIR_ENV};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "hwsched")]
#[command(version, about = "Hardware profile scheduler")]
#[command(arg_required_else_help = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Directory holding settings.toml and rules.toml
    #[arg(long, global = true, env = CONFIG_DIR_ENV)]
    pub config_dir: Option<PathBuf>,

    /// Directory for the pid, log and state files
    #[arg(long, global = true, env = STATE_DIR_ENV)]
    pub state_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the scheduler loop
    Start {
        /// Seconds between ticks, overrides scheduler.check_interval
        #[arg(short, long, value_parser = clap::value_parser!(u64).range(1..))]
        interval: Option<u64>,

        /// Detach and run in the background
        #[arg(short, long)]
        daemon: bool,
    },

    /// Stop a running scheduler
    Stop,

    /// Show telemetry, matched rules and daemon state
    Status,

    /// Refresh the status view until Ctrl-C
    Monitor {
        #[arg(short, long, default_value_t = 5, value_parser = clap::value_parser!(u64).range(1..))]
        interval: u64,
    },

    /// Show the decision that would be made now, without applying it
    Test,

    /// List application and category rules, or show one application
    Rules { name: Option<String> },

    /// Print the tail of the scheduler log
    Logs {
        #[arg(short = 'n', long, default_value_t = 50)]
        lines: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_start() {
        let cli = Cli::try_parse_from(["hwsched", "--state-dir", "/tmp/s", "start", "-i", "10", "--daemon"])
            .unwrap();
        assert_eq!(cli.state_dir, Some(PathBuf::from("/tmp/s")));
        match cli.command {
            Commands::Start { interval, daemon } => {
                assert_eq!(interval, Some(10));
                assert!(daemon);
            }
            _ => panic!("expected start"),
        }
    }

    #[test]
    fn test_zero_interval_rejected() {
        assert!(Cli::try_parse_from(["hwsched", "start", "--interval", "0"]).is_err());
        assert!(Cli::try_parse_from(["hwsched", "monitor", "--interval", "0"]).is_err());
    }
}
