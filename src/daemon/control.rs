use crate::common::logging::{self, ReloadHandle};
use crate::core::applier::{Applier, CommandApplier};
use crate::core::config::{self, Paths};
use crate::core::error::SchedError;
use crate::core::telemetry::{Collector, LinuxSource};
use crate::daemon::lock::{self, PidLock};
use crate::daemon::run::{Daemon, shutdown_signal};
use anyhow::{Context, Result, bail};
use std::os::unix::process::CommandExt;
use std::process::Stdio;
use std::time::Duration;
use tracing::{debug, info, warn};

const STOP_TIMEOUT: Duration = Duration::from_secs(10);
const STARTUP_WAIT: Duration = Duration::from_secs(3);
const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped { pid: i32 },
    NotRunning { stale_removed: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detached {
    Running { pid: u32 },
    /// Spawned but the lock was not taken yet when we stopped waiting.
    Starting { pid: u32 },
}

/// Runs the scheduler in the foreground until SIGTERM or Ctrl-C.
pub async fn start(paths: &Paths, interval: Option<u64>, log: &ReloadHandle) -> Result<()> {
    let rules = config::load_all(paths)?;
    let settings = rules.settings().clone();
    logging::set_level(log, settings.scheduler.log_level);

    if !settings.scheduler.enabled {
        bail!(
            "scheduler is disabled (scheduler.enabled = false in {})",
            paths.settings_path().display()
        );
    }

    let _lock = PidLock::acquire(&paths.pid_path())?;

    let interval = interval
        .map(Duration::from_secs)
        .unwrap_or_else(|| settings.scheduler.interval());
    info!(
        target: "hwsched::daemon",
        "hwsched v{} starting (interval {}s, applier {})",
        env!("CARGO_PKG_VERSION"),
        interval.as_secs(),
        settings.applier.command
    );

    let collector = Collector::new(LinuxSource::new(), settings.scheduler.sensor_timeout());
    let applier = Applier::new(
        CommandApplier::from_config(&settings.applier),
        settings.applier.timeout(),
    );
    let daemon = Daemon::new(collector, rules, applier, paths.clone(), interval);

    daemon.run_until(shutdown_signal()).await;
    Ok(())
}

/// Re-executes this binary as a detached `start` and waits briefly for it to
/// take the lock.
pub async fn start_detached(paths: &Paths, interval: Option<u64>) -> Result<Detached> {
    let pid_path = paths.pid_path();
    if lock::is_locked(&pid_path)? {
        return Err(SchedError::AlreadyRunning {
            pid: lock::read_pid(&pid_path),
        }
        .into());
    }
    // Surface config errors here rather than in a detached child.
    config::load_all(paths)?;

    let exe = std::env::current_exe().context("Failed to locate current executable")?;
    let mut cmd = std::process::Command::new(exe);
    cmd.arg("--config-dir")
        .arg(&paths.config_dir)
        .arg("--state-dir")
        .arg(&paths.state_dir)
        .arg("start");
    if let Some(secs) = interval {
        cmd.arg("--interval").arg(secs.to_string());
    }
    cmd.stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    unsafe {
        cmd.pre_exec(|| {
            libc::setsid();
            Ok(())
        });
    }

    let mut child = cmd.spawn().context("Failed to spawn detached scheduler")?;
    let pid = child.id();
    debug!(target: "hwsched::daemon", "Spawned detached scheduler pid {}", pid);

    let deadline = tokio::time::Instant::now() + STARTUP_WAIT;
    while tokio::time::Instant::now() < deadline {
        if let Some(status) = child.try_wait().context("Failed to poll scheduler")? {
            bail!(
                "scheduler exited during startup ({}), see {}",
                status,
                paths.log_path().display()
            );
        }
        if lock::is_locked(&pid_path)? {
            return Ok(Detached::Running { pid });
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
    Ok(Detached::Starting { pid })
}

/// Sends SIGTERM to the lock holder and waits for it to release the lock.
pub async fn stop(paths: &Paths) -> Result<StopOutcome> {
    let pid_path = paths.pid_path();

    if !lock::is_locked(&pid_path)? {
        let stale_removed = pid_path.exists();
        if stale_removed {
            std::fs::remove_file(&pid_path)
                .with_context(|| format!("Failed to remove stale {}", pid_path.display()))?;
            info!(target: "hwsched::daemon", "Removed stale {}", pid_path.display());
        }
        return Ok(StopOutcome::NotRunning { stale_removed });
    }

    let Some(pid) = lock::read_pid(&pid_path) else {
        bail!("{} is locked but holds no pid", pid_path.display());
    };

    // SAFETY: plain kill(2) with a pid read from the lock file.
    if unsafe { libc::kill(pid, libc::SIGTERM) } != 0 {
        let err = std::io::Error::last_os_error();
        return Err(err).with_context(|| format!("Failed to signal pid {}", pid));
    }
    debug!(target: "hwsched::daemon", "Sent SIGTERM to {}", pid);

    let deadline = tokio::time::Instant::now() + STOP_TIMEOUT;
    while lock::is_locked(&pid_path)? {
        if tokio::time::Instant::now() >= deadline {
            bail!(
                "scheduler (pid {}) did not stop within {}s",
                pid,
                STOP_TIMEOUT.as_secs()
            );
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }

    if pid_path.exists() {
        warn!(target: "hwsched::daemon", "Removing leftover {}", pid_path.display());
        let _ = std::fs::remove_file(&pid_path);
    }
    Ok(StopOutcome::Stopped { pid })
}
