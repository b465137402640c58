use super::{app::*, output};
use crate::common::LogLevel;
use crate::common::logging::{self, ReloadHandle};
use crate::core::config::{self, Paths, RuleRepository};
use crate::core::telemetry::{Collector, LinuxSource};
use crate::daemon::report;
use crate::daemon::{Detached, StopOutcome, control};
use crate::{Context, Result};
use tokio::{signal, time};

const CLEAR_SCREEN: &str = "\x1B[2J\x1B[H";

pub async fn execute(cli: Cli) -> Result<()> {
    let paths = Paths::resolve(cli.config_dir, cli.state_dir)?;

    // Only the foreground scheduler writes the log file.
    let (level, log_file) = match cli.command {
        Commands::Start { daemon: false, .. } => (LogLevel::Info, Some(paths.log_path())),
        _ => (LogLevel::Warn, None),
    };
    let log = logging::init(level, log_file.as_deref())?;

    match cli.command {
        Commands::Start { interval, daemon } => {
            if daemon {
                handle_detached(&paths, interval).await?;
            } else {
                control::start(&paths, interval, &log).await?;
            }
        }

        Commands::Stop => match control::stop(&paths).await? {
            StopOutcome::Stopped { pid } => {
                output::print_success(&format!("Scheduler stopped (pid {})", pid))
            }
            StopOutcome::NotRunning { stale_removed } => {
                println!("Scheduler is not running");
                if stale_removed {
                    output::print_success("Removed stale pid file");
                }
            }
        },

        Commands::Status => {
            let rules = load_rules(&paths, &log)?;
            let report = report::build(&collector(&rules), &rules, &paths).await?;
            print!("{}", output::render_status(&report));
        }

        Commands::Monitor { interval } => {
            handle_monitor(&paths, &log, interval).await?;
        }

        Commands::Test => {
            let rules = load_rules(&paths, &log)?;
            let report = report::build(&collector(&rules), &rules, &paths).await?;
            print!("{}", output::render_test(&report));
        }

        Commands::Rules { name } => {
            let rules = load_rules(&paths, &log)?;
            match name {
                Some(name) => println!("{}", output::render_rule(rules.require_app(&name)?)),
                None => print!("{}", output::render_rules(&rules)),
            }
        }

        Commands::Logs { lines } => {
            handle_logs(&paths, lines)?;
        }
    }

    Ok(())
}

fn load_rules(paths: &Paths, log: &ReloadHandle) -> Result<RuleRepository> {
    let rules = config::load_all(paths)?;
    // Introspection stays quiet below warn unless debugging was asked for.
    let level = rules.settings().scheduler.log_level;
    if matches!(level, LogLevel::Debug | LogLevel::Trace) {
        logging::set_level(log, level);
    }
    Ok(rules)
}

fn collector(rules: &RuleRepository) -> Collector<LinuxSource> {
    Collector::new(
        LinuxSource::new(),
        rules.settings().scheduler.sensor_timeout(),
    )
}

async fn handle_detached(paths: &Paths, interval: Option<u64>) -> Result<()> {
    match control::start_detached(paths, interval).await? {
        Detached::Running { pid } => {
            output::print_success(&format!("Scheduler started (pid {})", pid))
        }
        Detached::Starting { pid } => output::print_success(&format!(
            "Scheduler starting (pid {}), see {}",
            pid,
            paths.log_path().display()
        )),
    }
    Ok(())
}

async fn handle_monitor(paths: &Paths, log: &ReloadHandle, interval: u64) -> Result<()> {
    let rules = load_rules(paths, log)?;
    let collector = collector(&rules);
    let period = time::Duration::from_secs(interval);

    loop {
        match report::build(&collector, &rules, paths).await {
            Ok(report) => print!("{}{}", CLEAR_SCREEN, output::render_status(&report)),
            Err(e) => output::print_error(&e.to_string()),
        }
        println!("\nRefreshing every {}s, Ctrl-C to exit", interval);

        tokio::select! {
            _ = time::sleep(period) => {}
            _ = signal::ctrl_c() => break,
        }
    }
    Ok(())
}

fn handle_logs(paths: &Paths, lines: usize) -> Result<()> {
    let path = paths.log_path();
    if !path.exists() {
        println!("No log file at {}", path.display());
        return Ok(());
    }
    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    for line in output::tail_lines(&text, lines) {
        println!("{}", line);
    }
    Ok(())
}
