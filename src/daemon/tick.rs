use crate::core::applier::ProfileApplier;
use crate::core::arbiter::decide;
use crate::core::config::Thresholds;
use crate::core::error::SchedError;
use crate::core::notify;
use crate::core::telemetry::{SystemState, TelemetrySource};
use crate::daemon::run::{Daemon, now_ms};
use crate::daemon::state::update_current_profile_file;
use tracing::{debug, error, info, warn};

const THERMAL_WARN_MARGIN_C: i32 = 5;

/// Within the warning margin below `temp_critical`, not yet at it.
pub(crate) fn approaching_thermal_limit(state: &SystemState, th: &Thresholds) -> bool {
    let hottest = state.cpu_temp_c.max(state.gpu_temp_c);
    hottest >= th.temp_critical - THERMAL_WARN_MARGIN_C && hottest < th.temp_critical
}

impl<S: TelemetrySource, A: ProfileApplier> Daemon<S, A> {
    /// One collect/decide/apply cycle. Errors are recorded and logged, never
    /// propagated.
    pub async fn tick(&mut self) {
        self.tick_count = self.tick_count.wrapping_add(1);
        debug!(target: "hwsched::daemon", "Tick #{}", self.tick_count);

        if let Err(e) = self.process_tick().await {
            let err_msg = e.to_string();
            let now = now_ms();

            let should_log = match &self.last_error {
                None => true,
                Some((last_msg, last_time)) => {
                    err_msg != *last_msg
                        || (now.saturating_sub(*last_time) >= self.error_debounce_ms)
                }
            };

            if should_log {
                error!(target: "hwsched::daemon", "Tick error: {}", e);
                self.last_error = Some((err_msg.clone(), now));
            } else {
                debug!(target: "hwsched::daemon", "Tick error suppressed: {}", e);
            }
            self.state.last_error = Some(err_msg);
        }

        self.persist();
    }

    async fn process_tick(&mut self) -> Result<(), SchedError> {
        let (snapshot, running) = self.collector.sample().await;
        if snapshot.is_degraded() {
            debug!(
                target: "hwsched::daemon",
                "Degraded snapshot, defaults used for: {:?}",
                snapshot.unavailable
            );
        }
        let decision = decide(&snapshot, &running, &self.rules);
        self.check_thermal(&snapshot);

        debug!(
            target: "hwsched::daemon",
            "Decision {} (battery {}%, cpu {}C, gpu {}C, {} processes)",
            decision,
            snapshot.battery_level,
            snapshot.cpu_temp_c,
            snapshot.gpu_temp_c,
            running.len()
        );

        let unchanged =
            self.state.last_applied_profile.as_deref() == Some(decision.profile.as_str());
        self.state.last_decision = Some(decision.clone());
        if unchanged {
            return Ok(());
        }

        self.applier.apply(&decision.profile).await?;

        let previous = self
            .state
            .last_applied_profile
            .replace(decision.profile.clone());
        self.state.switch_count += 1;
        self.state.last_error = None;
        self.last_error = None;

        if decision.trigger.is_critical() {
            warn!(
                target: "hwsched::daemon",
                "Applied {} ({})",
                decision.profile,
                decision.reason()
            );
        } else {
            info!(
                target: "hwsched::daemon",
                "Applied {} ({}), was {}",
                decision.profile,
                decision.reason(),
                previous.as_deref().unwrap_or("none")
            );
        }

        update_current_profile_file(&self.paths.profile_marker_path(), &decision.profile);

        if self.rules.features().notifications {
            notify::profile_switched(&decision.profile, &decision.reason()).await;
        }
        Ok(())
    }

    /// Early warning only; the thermal override in `decide` is unconditional.
    fn check_thermal(&mut self, snapshot: &SystemState) {
        if !self.rules.features().thermal_management {
            return;
        }
        let th = self.rules.thresholds();
        let hot = approaching_thermal_limit(snapshot, &th);
        if hot && !self.running_hot {
            warn!(
                target: "hwsched::daemon",
                "Running hot: cpu {}C, gpu {}C (power-save at {}C)",
                snapshot.cpu_temp_c,
                snapshot.gpu_temp_c,
                th.temp_critical
            );
        }
        self.running_hot = hot;
    }
}
