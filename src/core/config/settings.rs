use crate::common::{LogLevel, PROFILE_POWER_SAVE};
use crate::core::clock::{ClockTime, ScheduleWindow};
use crate::core::config::{read_document, validate_profile};
use crate::core::error::SchedError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Written on first run when `settings.toml` is absent. Must parse to
/// `Settings::default()`.
pub const DEFAULT_SETTINGS_TOML: &str = r#"# hwsched scheduler settings
# Any missing key falls back to the value shown here.

[scheduler]
# Set to false to make `hwsched start` refuse to run.
enabled = true
# Seconds between two evaluations.
check_interval = 30
# trace | debug | info | warn | error (RUST_LOG overrides)
log_level = "info"
# Upper bound for a single sensor read, in milliseconds.
sensor_timeout_ms = 1500

[features]
# Switch to power-save when the battery drops to thresholds.battery_low.
battery_awareness = true
# Warn when CPU or GPU come within 5C of thresholds.temp_critical.
# Reaching temp_critical always switches to power-save.
thermal_management = true
# Apply schedule.sleep_hours.profile inside the sleep window.
sleep_schedule = true
# Apply schedule.work_hours.profile inside the work window when no app rule matches.
work_hours = true
# Send a desktop notification (notify-send) after each switch.
notifications = false

[thresholds]
# Battery percentage.
battery_low = 20
battery_critical = 10
# Degrees Celsius, compared against both CPU and GPU.
temp_critical = 85

# Windows use hh:mm; a start later than the end spans midnight.
[schedule.work_hours]
start = "09:00"
end = "17:00"
profile = "productivity"

[schedule.sleep_hours]
start = "23:00"
end = "07:00"
profile = "power-save"

[applier]
# Command run to switch profiles; "{profile}" in args is replaced by the
# backend name of the chosen profile.
command = "powerprofilesctl"
args = ["set", "{profile}"]
timeout_ms = 5000

# Scheduler profile -> backend profile. Unlisted profiles are passed unchanged.
[applier.aliases]
battery-extreme = "power-saver"
power-save = "power-saver"
balanced = "balanced"
productivity = "performance"
gaming = "performance"
"#;

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    pub scheduler: SchedulerConfig,
    pub features: Features,
    pub thresholds: Thresholds,
    pub schedule: ScheduleConfig,
    pub applier: ApplierConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub check_interval: u64,
    pub log_level: LogLevel,
    pub sensor_timeout_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            check_interval: 30,
            log_level: LogLevel::Info,
            sensor_timeout_ms: 1500,
        }
    }
}

impl SchedulerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.check_interval)
    }

    pub fn sensor_timeout(&self) -> Duration {
        Duration::from_millis(self.sensor_timeout_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Features {
    pub battery_awareness: bool,
    pub thermal_management: bool,
    pub sleep_schedule: bool,
    pub work_hours: bool,
    pub notifications: bool,
}

impl Default for Features {
    fn default() -> Self {
        Self {
            battery_awareness: true,
            thermal_management: true,
            sleep_schedule: true,
            work_hours: true,
            notifications: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Thresholds {
    pub battery_low: u8,
    pub battery_critical: u8,
    pub temp_critical: i32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            battery_low: 20,
            battery_critical: 10,
            temp_critical: 85,
        }
    }
}

/// A schedule window as written in the file; unset fields take the
/// window's defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct WindowConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<ClockTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<ClockTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
}

impl WindowConfig {
    fn resolve(&self, fallback: ScheduleWindow) -> ScheduleWindow {
        ScheduleWindow {
            start: self.start.unwrap_or(fallback.start),
            end: self.end.unwrap_or(fallback.end),
            profile: self.profile.clone().unwrap_or(fallback.profile),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub work_hours: WindowConfig,
    pub sleep_hours: WindowConfig,
}

impl ScheduleConfig {
    pub fn work_window(&self) -> ScheduleWindow {
        self.work_hours.resolve(default_work_window())
    }

    pub fn sleep_window(&self) -> ScheduleWindow {
        self.sleep_hours.resolve(default_sleep_window())
    }
}

fn default_work_window() -> ScheduleWindow {
    ScheduleWindow::new(clock(9, 0), clock(17, 0), "productivity")
}

fn default_sleep_window() -> ScheduleWindow {
    ScheduleWindow::new(clock(23, 0), clock(7, 0), PROFILE_POWER_SAVE)
}

const fn clock(h: u8, m: u8) -> ClockTime {
    ClockTime::hm(h, m)
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ApplierConfig {
    pub command: String,
    pub args: Vec<String>,
    pub timeout_ms: u64,
    pub aliases: BTreeMap<String, String>,
}

impl Default for ApplierConfig {
    fn default() -> Self {
        let aliases = [
            ("battery-extreme", "power-saver"),
            ("power-save", "power-saver"),
            ("balanced", "balanced"),
            ("productivity", "performance"),
            ("gaming", "performance"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self {
            command: "powerprofilesctl".to_string(),
            args: vec!["set".to_string(), "{profile}".to_string()],
            timeout_ms: 5000,
            aliases,
        }
    }
}

impl ApplierConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Settings {
    /// Parses and validates; absent keys take their defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, SchedError> {
        let path = path.as_ref();
        let content = read_document(path)?;
        let settings: Settings = toml::from_str(&content)
            .map_err(|e| SchedError::invalid(path, e.to_string()))?;
        settings
            .validate()
            .map_err(|reason| SchedError::invalid(path, reason))?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), String> {
        let t = &self.thresholds;
        if t.battery_low > 100 || t.battery_critical > 100 {
            return Err("battery thresholds must be within 0..=100".into());
        }
        if t.battery_critical > t.battery_low {
            return Err(format!(
                "battery_critical ({}) must not exceed battery_low ({})",
                t.battery_critical, t.battery_low
            ));
        }
        if !(1..=150).contains(&t.temp_critical) {
            return Err(format!(
                "temp_critical ({}) must be within 1..=150",
                t.temp_critical
            ));
        }
        if self.scheduler.check_interval == 0 {
            return Err("check_interval must be at least 1 second".into());
        }
        if self.scheduler.sensor_timeout_ms == 0 || self.applier.timeout_ms == 0 {
            return Err("timeouts must be greater than zero".into());
        }
        if self.applier.command.trim().is_empty() {
            return Err("applier.command must not be empty".into());
        }
        validate_profile(&self.schedule.work_window().profile)?;
        validate_profile(&self.schedule.sleep_window().profile)?;
        for (profile, backend) in &self.applier.aliases {
            validate_profile(profile)?;
            if backend.trim().is_empty() {
                return Err(format!("alias for {} is empty", profile));
            }
        }
        Ok(())
    }
}
