//! Read-only view for `status`, `monitor` and `test`. Nothing here applies a
//! profile or touches the daemon's files.

use crate::core::arbiter::{ProfileDecision, decide};
use crate::core::config::{AppRule, Paths, RuleRepository};
use crate::core::error::SchedError;
use crate::core::telemetry::{Collector, SystemState, TelemetrySource};
use crate::daemon::lock;
use crate::daemon::state::{DaemonState, read_current_profile};
use std::collections::BTreeSet;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DaemonInfo {
    pub running: bool,
    pub pid: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct Report {
    pub state: SystemState,
    pub running_apps: BTreeSet<String>,
    pub matched: Vec<AppRule>,
    pub decision: ProfileDecision,
    pub daemon: DaemonInfo,
    /// Written by a running daemon; `None` when it is stopped.
    pub persisted: Option<DaemonState>,
    pub current_profile: Option<String>,
}

impl Report {
    pub fn last_applied_profile(&self) -> Option<&str> {
        self.persisted
            .as_ref()
            .and_then(|s| s.last_applied_profile.as_deref())
            .or(self.current_profile.as_deref())
    }

    /// Whether the daemon would switch if it ticked now.
    pub fn would_switch(&self) -> bool {
        self.last_applied_profile() != Some(self.decision.profile.as_str())
    }
}

pub fn daemon_info(paths: &Paths) -> Result<DaemonInfo, SchedError> {
    let pid_path = paths.pid_path();
    let running = lock::is_locked(&pid_path)?;
    Ok(DaemonInfo {
        running,
        pid: running.then(|| lock::read_pid(&pid_path)).flatten(),
    })
}

pub async fn build<S: TelemetrySource>(
    collector: &Collector<S>,
    rules: &RuleRepository,
    paths: &Paths,
) -> Result<Report, SchedError> {
    let (state, running_apps) = collector.sample().await;
    let decision = decide(&state, &running_apps, rules);
    let matched = rules
        .matched_rules(&running_apps)
        .into_iter()
        .cloned()
        .collect();

    let daemon = daemon_info(paths)?;
    let persisted = if daemon.running {
        DaemonState::load(&paths.state_path()).unwrap_or_else(|e| {
            warn!(target: "hwsched::daemon", "Ignoring unreadable state: {}", e);
            None
        })
    } else {
        None
    };

    Ok(Report {
        state,
        running_apps,
        matched,
        decision,
        daemon,
        persisted,
        current_profile: read_current_profile(&paths.profile_marker_path()),
    })
}
