use crate::common::DaemonStatus;
use crate::core::applier::{Applier, ProfileApplier};
use crate::core::config::{Paths, RuleRepository};
use crate::core::telemetry::{Collector, TelemetrySource};
use crate::daemon::state::DaemonState;
use std::future::Future;
use std::time::Duration;
use tokio::signal::unix::{SignalKind, signal};
use tokio::{signal as tokio_signal, time};
use tracing::{debug, error, info};

const ERROR_DEBOUNCE_MS: u128 = 60_000;

#[inline]
pub(crate) fn now_ms() -> u128 {
    use std::time::{SystemTime, UNIX_EPOCH};

    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_e| {
            tracing::warn!(
                target: "hwsched::daemon",
                "System clock error (using fallback)"
            );
            Duration::from_secs(0)
        })
        .as_millis()
}

pub struct Daemon<S, A> {
    pub(crate) collector: Collector<S>,
    pub(crate) rules: RuleRepository,
    pub(crate) applier: Applier<A>,
    pub(crate) paths: Paths,
    pub(crate) interval: Duration,

    pub(crate) state: DaemonState,
    pub(crate) last_error: Option<(String, u128)>,
    pub(crate) error_debounce_ms: u128,
    pub(crate) tick_count: u64,
    pub(crate) running_hot: bool,
}

impl<S: TelemetrySource, A: ProfileApplier> Daemon<S, A> {
    pub fn new(
        collector: Collector<S>,
        rules: RuleRepository,
        applier: Applier<A>,
        paths: Paths,
        interval: Duration,
    ) -> Self {
        Self {
            collector,
            rules,
            applier,
            paths,
            interval,
            state: DaemonState::starting(std::process::id()),
            last_error: None,
            error_debounce_ms: ERROR_DEBOUNCE_MS,
            tick_count: 0,
            running_hot: false,
        }
    }

    pub(crate) fn set_status(&mut self, status: DaemonStatus) {
        debug!(target: "hwsched::daemon", "Status {} -> {}", self.state.status, status);
        self.state.status = status;
        self.persist();
    }

    pub(crate) fn persist(&mut self) {
        self.state.touch();
        if let Err(e) = self.state.save(&self.paths.state_path()) {
            error!(target: "hwsched::daemon", "Failed to persist state: {}", e);
        }
    }

    /// Ticks immediately, then every interval until `shutdown` resolves.
    /// Shutdown is only observed between ticks.
    pub async fn run_until(mut self, shutdown: impl Future<Output = ()>) -> DaemonState {
        self.set_status(DaemonStatus::Running);
        info!(
            target: "hwsched::daemon",
            "Scheduler running (pid {}, interval {}s)",
            self.state.pid,
            self.interval.as_secs()
        );

        self.tick().await;

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = time::sleep(self.interval) => {
                    self.tick().await;
                }
                _ = &mut shutdown => {
                    break;
                }
            }
        }

        self.set_status(DaemonStatus::Stopping);
        DaemonState::remove(&self.paths.state_path());
        self.state.status = DaemonStatus::Stopped;
        info!(
            target: "hwsched::daemon",
            "Stopped after {} ticks, {} switches",
            self.tick_count,
            self.state.switch_count
        );
        self.state
    }
}

/// Resolves on SIGTERM or Ctrl-C.
pub async fn shutdown_signal() {
    let mut term = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            error!(target: "hwsched::daemon", "Failed to listen for SIGTERM: {}", e);
            if let Err(e) = tokio_signal::ctrl_c().await {
                error!(target: "hwsched::daemon", "Failed to listen for ctrl-c: {}", e);
            }
            return;
        }
    };

    tokio::select! {
        _ = term.recv() => info!(target: "hwsched::daemon", "Received SIGTERM, shutting down"),
        _ = tokio_signal::ctrl_c() => info!(target: "hwsched::daemon", "Received Ctrl-C, shutting down"),
    }
}
