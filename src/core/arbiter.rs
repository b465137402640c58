//! Turns a telemetry snapshot plus the loaded rules into exactly one
//! profile decision.
//!
//! The precedence is the `PRECEDENCE` table below, evaluated top to bottom;
//! the first stage that fires wins. `Default` always fires.

use crate::common::{PROFILE_BALANCED, PROFILE_BATTERY_EXTREME, PROFILE_POWER_SAVE};
use crate::core::config::{AppRule, RuleRepository};
use crate::core::telemetry::SystemState;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Trigger {
    BatteryCritical,
    ThermalCritical,
    SleepWindow,
    BatteryLow,
    AppRule,
    WorkWindow,
    Default,
}

/// Evaluation order. Safety overrides first, the default last.
pub const PRECEDENCE: [Trigger; 7] = [
    Trigger::BatteryCritical,
    Trigger::ThermalCritical,
    Trigger::SleepWindow,
    Trigger::BatteryLow,
    Trigger::AppRule,
    Trigger::WorkWindow,
    Trigger::Default,
];

impl Trigger {
    pub fn is_critical(&self) -> bool {
        matches!(self, Self::BatteryCritical | Self::ThermalCritical)
    }

    fn evaluate(self, ctx: &Context<'_>) -> Option<Candidate> {
        let th = ctx.rules.thresholds();
        let features = ctx.rules.features();
        let windows = ctx.rules.schedule_windows();
        let state = ctx.state;

        match self {
            Self::BatteryCritical => (state.battery_level <= th.battery_critical)
                .then(|| Candidate::fixed(PROFILE_BATTERY_EXTREME)),
            Self::ThermalCritical => (state.cpu_temp_c >= th.temp_critical
                || state.gpu_temp_c >= th.temp_critical)
                .then(|| Candidate::fixed(PROFILE_POWER_SAVE)),
            Self::SleepWindow => (features.sleep_schedule
                && windows.sleep.contains(state.clock_time))
            .then(|| Candidate::fixed(&windows.sleep.profile)),
            Self::BatteryLow => (features.battery_awareness
                && state.battery_level <= th.battery_low)
                .then(|| Candidate::fixed(PROFILE_POWER_SAVE)),
            Self::AppRule => best_app_rule(ctx.running, ctx.rules).map(|rule| Candidate {
                profile: rule.profile.clone(),
                matched_app: Some(rule.process_name.clone()),
            }),
            Self::WorkWindow => (features.work_hours && windows.work.contains(state.clock_time))
                .then(|| Candidate::fixed(&windows.work.profile)),
            Self::Default => Some(Candidate::fixed(PROFILE_BALANCED)),
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::BatteryCritical => "battery-critical",
            Self::ThermalCritical => "thermal-critical",
            Self::SleepWindow => "sleep-window",
            Self::BatteryLow => "battery-low",
            Self::AppRule => "app-rule",
            Self::WorkWindow => "work-window",
            Self::Default => "default",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileDecision {
    pub profile: String,
    pub trigger: Trigger,
    /// Process whose rule won, for `Trigger::AppRule`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_app: Option<String>,
    pub timestamp: NaiveDateTime,
}

impl ProfileDecision {
    pub fn reason(&self) -> String {
        match &self.matched_app {
            Some(app) => format!("{} ({})", self.trigger, app),
            None => self.trigger.to_string(),
        }
    }
}

impl fmt::Display for ProfileDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.profile, self.reason())
    }
}

struct Context<'a> {
    state: &'a SystemState,
    running: &'a BTreeSet<String>,
    rules: &'a RuleRepository,
}

struct Candidate {
    profile: String,
    matched_app: Option<String>,
}

impl Candidate {
    fn fixed(profile: &str) -> Self {
        Self {
            profile: profile.to_string(),
            matched_app: None,
        }
    }
}

/// Highest priority wins; equal priorities go to the lexicographically
/// smallest process name.
pub fn best_app_rule<'a>(
    running: &BTreeSet<String>,
    rules: &'a RuleRepository,
) -> Option<&'a AppRule> {
    running
        .iter()
        .filter_map(|name| rules.lookup_app(name))
        .min_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| a.process_name.cmp(&b.process_name))
        })
}

/// Pure: identical inputs always yield an identical decision.
pub fn decide(
    state: &SystemState,
    running: &BTreeSet<String>,
    rules: &RuleRepository,
) -> ProfileDecision {
    let ctx = Context {
        state,
        running,
        rules,
    };

    let (trigger, candidate) = PRECEDENCE
        .iter()
        .find_map(|t| t.evaluate(&ctx).map(|c| (*t, c)))
        .unwrap_or_else(|| (Trigger::Default, Candidate::fixed(PROFILE_BALANCED)));

    ProfileDecision {
        profile: candidate.profile,
        trigger,
        matched_app: candidate.matched_app,
        timestamp: state.sampled_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::ClockTime;
    use crate::core::config::{RulesDocument, Settings};
    use std::path::Path;

    const RULES: &str = r#"
        [applications.steam]
        profile = "gaming"
        priority = 100

        [applications.blender]
        profile = "productivity"
        priority = 70

        [applications.firefox]
        profile = "browsing"
        priority = 60

        [applications.mpv]
        profile = "media"
        priority = 60
    "#;

    fn repo_with(settings: Settings) -> RuleRepository {
        let doc: RulesDocument = toml::from_str(RULES).unwrap();
        RuleRepository::new(settings, doc, Path::new("rules.toml")).unwrap()
    }

    fn repo() -> RuleRepository {
        repo_with(Settings::default())
    }

    fn apps(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn clock(s: &str) -> ClockTime {
        s.parse().unwrap()
    }

    /// Nominal machine in the evening, outside both default windows.
    fn nominal() -> SystemState {
        SystemState {
            battery_level: 80,
            cpu_temp_c: 50,
            gpu_temp_c: 50,
            clock_time: clock("18:00"),
            ..Default::default()
        }
    }

    #[test]
    fn test_precedence_table_order() {
        assert_eq!(PRECEDENCE.first(), Some(&Trigger::BatteryCritical));
        assert_eq!(PRECEDENCE.last(), Some(&Trigger::Default));
        assert!(PRECEDENCE[..2].iter().all(Trigger::is_critical));
        assert!(!PRECEDENCE[2..].iter().any(Trigger::is_critical));
    }

    #[test]
    fn test_scenario_a_battery_critical_beats_app() {
        let state = SystemState {
            battery_level: 5,
            cpu_temp_c: 40,
            ..nominal()
        };
        let d = decide(&state, &apps(&["steam"]), &repo());
        assert_eq!(d.profile, "battery-extreme");
        assert_eq!(d.trigger, Trigger::BatteryCritical);
        assert_eq!(d.matched_app, None);
    }

    #[test]
    fn test_battery_critical_regardless_of_heat() {
        let r = repo();
        for level in 0..=10u8 {
            let state = SystemState {
                battery_level: level,
                cpu_temp_c: 99,
                gpu_temp_c: 99,
                clock_time: clock("00:30"),
                ..Default::default()
            };
            let d = decide(&state, &apps(&["steam", "blender"]), &r);
            assert_eq!(d.profile, "battery-extreme", "level {}", level);
        }
    }

    #[test]
    fn test_scenario_b_thermal_critical() {
        let state = SystemState {
            battery_level: 80,
            cpu_temp_c: 90,
            gpu_temp_c: 50,
            ..nominal()
        };
        let d = decide(&state, &apps(&[]), &repo());
        assert_eq!(d.profile, "power-save");
        assert_eq!(d.trigger, Trigger::ThermalCritical);
    }

    #[test]
    fn test_gpu_heat_alone_is_critical() {
        let state = SystemState {
            gpu_temp_c: 85,
            ..nominal()
        };
        let d = decide(&state, &apps(&["steam"]), &repo());
        assert_eq!(d.trigger, Trigger::ThermalCritical);
    }

    #[test]
    fn test_thermal_override_ignores_feature_flag() {
        let mut s = Settings::default();
        s.features.thermal_management = false;
        let state = SystemState {
            cpu_temp_c: 95,
            ..nominal()
        };
        let d = decide(&state, &apps(&["steam"]), &repo_with(s));
        assert_eq!(d.profile, "power-save");
        assert_eq!(d.trigger, Trigger::ThermalCritical);
        assert_eq!(d.matched_app, None);
    }

    #[test]
    fn test_scenario_c_app_rule_beats_work_window() {
        let state = SystemState {
            clock_time: clock("10:00"),
            ..nominal()
        };
        let d = decide(&state, &apps(&["firefox"]), &repo());
        assert_eq!(d.profile, "browsing");
        assert_eq!(d.trigger, Trigger::AppRule);
        assert_eq!(d.matched_app.as_deref(), Some("firefox"));
    }

    #[test]
    fn test_work_window_without_apps() {
        let state = SystemState {
            clock_time: clock("10:00"),
            ..nominal()
        };
        let d = decide(&state, &apps(&["bash"]), &repo());
        assert_eq!(d.profile, "productivity");
        assert_eq!(d.trigger, Trigger::WorkWindow);
    }

    #[test]
    fn test_scenario_d_default() {
        let d = decide(&nominal(), &apps(&["bash", "sshd"]), &repo());
        assert_eq!(d.profile, "balanced");
        assert_eq!(d.trigger, Trigger::Default);
    }

    #[test]
    fn test_sleep_window_wraps_midnight() {
        let r = repo();
        let inside = SystemState {
            clock_time: clock("00:30"),
            ..nominal()
        };
        let d = decide(&inside, &apps(&["steam"]), &r);
        assert_eq!(d.trigger, Trigger::SleepWindow);
        assert_eq!(d.profile, "power-save");

        let mut s = Settings::default();
        s.features.sleep_schedule = false;
        let d = decide(&inside, &apps(&["steam"]), &repo_with(s));
        assert_eq!(d.trigger, Trigger::AppRule);
    }

    #[test]
    fn test_battery_low_below_sleep_above_apps() {
        let state = SystemState {
            battery_level: 15,
            ..nominal()
        };
        let d = decide(&state, &apps(&["steam"]), &repo());
        assert_eq!(d.trigger, Trigger::BatteryLow);
        assert_eq!(d.profile, "power-save");

        let at_night = SystemState {
            clock_time: clock("23:30"),
            ..state.clone()
        };
        assert_eq!(
            decide(&at_night, &apps(&["steam"]), &repo()).trigger,
            Trigger::SleepWindow
        );

        let mut s = Settings::default();
        s.features.battery_awareness = false;
        assert_eq!(
            decide(&state, &apps(&["steam"]), &repo_with(s)).trigger,
            Trigger::AppRule
        );
    }

    #[test]
    fn test_priority_ordering() {
        let d = decide(&nominal(), &apps(&["blender", "steam"]), &repo());
        assert_eq!(d.profile, "gaming");
        assert_eq!(d.matched_app.as_deref(), Some("steam"));
    }

    #[test]
    fn test_equal_priority_tie_break_by_name() {
        let d = decide(&nominal(), &apps(&["mpv", "firefox"]), &repo());
        assert_eq!(d.matched_app.as_deref(), Some("firefox"));
        assert_eq!(d.profile, "browsing");
    }

    #[test]
    fn test_deterministic() {
        let r = repo();
        let running = apps(&["mpv", "firefox", "blender"]);
        let state = SystemState {
            clock_time: clock("16:59"),
            ..nominal()
        };
        let first = decide(&state, &running, &r);
        for _ in 0..10 {
            assert_eq!(decide(&state, &running, &r), first);
        }
        assert_eq!(first.timestamp, state.sampled_at);
    }

    #[test]
    fn test_decision_display() {
        let d = decide(&nominal(), &apps(&["steam"]), &repo());
        assert_eq!(d.to_string(), "gaming [app-rule (steam)]");
    }
}
