pub mod linux;
pub mod process;

pub use linux::LinuxSource;
pub use process::ProcessEntry;

use crate::core::clock::ClockTime;
use crate::core::error::SchedError;
use anyhow::Result;
use chrono::NaiveDateTime;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BatteryStatus {
    Charging,
    Discharging,
    Full,
    NotCharging,
    #[default]
    Unknown,
}

impl BatteryStatus {
    pub fn from_sysfs(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "charging" => Self::Charging,
            "discharging" => Self::Discharging,
            "full" => Self::Full,
            "not charging" => Self::NotCharging,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for BatteryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Charging => write!(f, "charging"),
            Self::Discharging => write!(f, "discharging"),
            Self::Full => write!(f, "full"),
            Self::NotCharging => write!(f, "not charging"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Sensor {
    Battery,
    CpuTemp,
    GpuTemp,
    Load,
    Processes,
}

impl Sensor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Battery => "battery",
            Self::CpuTemp => "cpu-temp",
            Self::GpuTemp => "gpu-temp",
            Self::Load => "load",
            Self::Processes => "processes",
        }
    }
}

impl fmt::Display for Sensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatteryReading {
    pub level: u8,
    pub status: BatteryStatus,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LoadReading {
    pub cpu_usage_pct: f32,
    pub memory_usage_pct: f32,
    pub load_average: f32,
}

/// Point-in-time view of the machine. Built once per tick, never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct SystemState {
    pub battery_level: u8,
    pub battery_status: BatteryStatus,
    pub cpu_temp_c: i32,
    pub gpu_temp_c: i32,
    pub cpu_usage_pct: f32,
    pub memory_usage_pct: f32,
    pub load_average: f32,
    pub clock_time: ClockTime,
    pub sampled_at: NaiveDateTime,
    /// Sensors that fell back to defaults in this snapshot.
    pub unavailable: Vec<Sensor>,
}

impl Default for SystemState {
    fn default() -> Self {
        Self {
            battery_level: 100,
            battery_status: BatteryStatus::Unknown,
            cpu_temp_c: 0,
            gpu_temp_c: 0,
            cpu_usage_pct: 0.0,
            memory_usage_pct: 0.0,
            load_average: 0.0,
            clock_time: ClockTime::default(),
            sampled_at: NaiveDateTime::default(),
            unavailable: Vec::new(),
        }
    }
}

impl SystemState {
    pub fn is_degraded(&self) -> bool {
        !self.unavailable.is_empty()
    }
}

/// Raw OS measurements. Methods may block; the collector runs them on the
/// blocking pool under a timeout.
pub trait TelemetrySource: Send + Sync + 'static {
    fn battery(&self) -> Result<BatteryReading>;
    fn cpu_temp(&self) -> Result<f32>;
    fn gpu_temp(&self) -> Result<f32>;
    fn load(&self) -> Result<LoadReading>;
    fn processes(&self) -> Result<Vec<ProcessEntry>>;
}

pub struct Collector<S> {
    source: Arc<S>,
    timeout: Duration,
    missing: Mutex<BTreeSet<Sensor>>,
}

impl<S: TelemetrySource> Collector<S> {
    pub fn new(source: S, timeout: Duration) -> Self {
        Self {
            source: Arc::new(source),
            timeout,
            missing: Mutex::new(BTreeSet::new()),
        }
    }

    #[cfg(test)]
    pub(crate) fn source(&self) -> &S {
        &self.source
    }

    /// A snapshot plus the normalized names of running processes.
    pub async fn sample(&self) -> (SystemState, BTreeSet<String>) {
        self.sample_at(chrono::Local::now().naive_local()).await
    }

    /// An unreadable process list is reported in `unavailable`, not as "nothing running".
    pub async fn sample_at(&self, now: NaiveDateTime) -> (SystemState, BTreeSet<String>) {
        let mut state = self.collect_at(now).await;
        let running = match self.read(Sensor::Processes, |s| s.processes()).await {
            Some(list) => process::normalize_all(&list),
            None => {
                state.unavailable.push(Sensor::Processes);
                BTreeSet::new()
            }
        };
        (state, running)
    }

    /// Never fails: unreadable sensors take conservative defaults.
    pub async fn collect_at(&self, now: NaiveDateTime) -> SystemState {
        let (battery, cpu, gpu, load) = tokio::join!(
            self.read(Sensor::Battery, |s| s.battery()),
            self.read(Sensor::CpuTemp, |s| s.cpu_temp()),
            self.read(Sensor::GpuTemp, |s| s.gpu_temp()),
            self.read(Sensor::Load, |s| s.load()),
        );

        let mut unavailable = Vec::new();
        let battery = battery.unwrap_or_else(|| {
            unavailable.push(Sensor::Battery);
            BatteryReading {
                level: 100,
                status: BatteryStatus::Unknown,
            }
        });
        let cpu_temp = cpu.unwrap_or_else(|| {
            unavailable.push(Sensor::CpuTemp);
            0.0
        });
        let gpu_temp = gpu.unwrap_or_else(|| {
            unavailable.push(Sensor::GpuTemp);
            0.0
        });
        let load = load.unwrap_or_else(|| {
            unavailable.push(Sensor::Load);
            LoadReading::default()
        });

        SystemState {
            battery_level: battery.level.min(100),
            battery_status: battery.status,
            cpu_temp_c: cpu_temp.round() as i32,
            gpu_temp_c: gpu_temp.round() as i32,
            cpu_usage_pct: load.cpu_usage_pct,
            memory_usage_pct: load.memory_usage_pct,
            load_average: load.load_average,
            clock_time: ClockTime::from(now.time()),
            sampled_at: now,
            unavailable,
        }
    }

    async fn read<T, F>(&self, sensor: Sensor, f: F) -> Option<T>
    where
        T: Send + 'static,
        F: FnOnce(&S) -> Result<T> + Send + 'static,
    {
        let source = Arc::clone(&self.source);
        let task = tokio::task::spawn_blocking(move || f(source.as_ref()));

        let res = match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(Ok(v))) => Ok(v),
            Ok(Ok(Err(e))) => Err(format!("{:#}", e)),
            Ok(Err(join)) => Err(format!("reader task failed: {}", join)),
            Err(_) => Err(format!("no reading within {}ms", self.timeout.as_millis())),
        };

        match res {
            Ok(v) => {
                self.mark(sensor, true);
                Some(v)
            }
            Err(reason) => {
                let err = SchedError::TelemetryUnavailable {
                    sensor: sensor.as_str(),
                    reason,
                };
                if self.mark(sensor, false) {
                    warn!(target: "hwsched::telemetry", "{}, using default", err);
                } else {
                    debug!(target: "hwsched::telemetry", "{}", err);
                }
                None
            }
        }
    }

    /// Records sensor health; true when it just went missing.
    fn mark(&self, sensor: Sensor, ok: bool) -> bool {
        let Ok(mut missing) = self.missing.lock() else {
            return false;
        };
        if ok {
            if missing.remove(&sensor) {
                info!(target: "hwsched::telemetry", "Sensor {} available again", sensor);
            }
            false
        } else {
            missing.insert(sensor)
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use anyhow::{anyhow, bail};
    use std::path::PathBuf;

    /// Scripted source for tests; `None` fields fail their read.
    #[derive(Default)]
    pub(crate) struct FakeSource {
        pub battery: Option<BatteryReading>,
        pub cpu_temp: Option<f32>,
        pub gpu_temp: Option<f32>,
        pub load: Option<LoadReading>,
        pub processes: Vec<ProcessEntry>,
        pub slow_battery: Option<Duration>,
        pub fail_processes: bool,
    }

    impl TelemetrySource for FakeSource {
        fn battery(&self) -> Result<BatteryReading> {
            if let Some(d) = self.slow_battery {
                std::thread::sleep(d);
            }
            self.battery.ok_or_else(|| anyhow!("no battery"))
        }

        fn cpu_temp(&self) -> Result<f32> {
            self.cpu_temp.ok_or_else(|| anyhow!("no cpu sensor"))
        }

        fn gpu_temp(&self) -> Result<f32> {
            self.gpu_temp.ok_or_else(|| anyhow!("no gpu sensor"))
        }

        fn load(&self) -> Result<LoadReading> {
            self.load.ok_or_else(|| anyhow!("no load"))
        }

        fn processes(&self) -> Result<Vec<ProcessEntry>> {
            if self.fail_processes {
                bail!("process table unreadable");
            }
            Ok(self.processes.clone())
        }
    }

    pub(crate) fn proc_entry(name: &str, exe: Option<&str>) -> ProcessEntry {
        ProcessEntry {
            name: name.to_string(),
            exe: exe.map(PathBuf::from),
            kernel_thread: false,
        }
    }

    fn at(h: u32, m: u32) -> NaiveDateTime {
        chrono::NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(h, m, 12)
            .unwrap()
    }

    #[tokio::test]
    async fn test_collect_full_readings() {
        let source = FakeSource {
            battery: Some(BatteryReading {
                level: 64,
                status: BatteryStatus::Discharging,
            }),
            cpu_temp: Some(54.6),
            gpu_temp: Some(47.2),
            load: Some(LoadReading {
                cpu_usage_pct: 12.5,
                memory_usage_pct: 40.0,
                load_average: 0.8,
            }),
            ..Default::default()
        };
        let c = Collector::new(source, Duration::from_millis(500));
        let state = c.collect_at(at(10, 30)).await;

        assert_eq!(state.battery_level, 64);
        assert_eq!(state.battery_status, BatteryStatus::Discharging);
        assert_eq!(state.cpu_temp_c, 55);
        assert_eq!(state.gpu_temp_c, 47);
        assert_eq!(state.clock_time.to_string(), "10:30");
        assert_eq!(state.sampled_at, at(10, 30));
        assert!(!state.is_degraded());
    }

    #[tokio::test]
    async fn test_missing_sensors_use_defaults() {
        let c = Collector::new(FakeSource::default(), Duration::from_millis(500));
        let state = c.collect_at(at(1, 0)).await;

        assert_eq!(state.battery_level, 100);
        assert_eq!(state.battery_status, BatteryStatus::Unknown);
        assert_eq!(state.cpu_temp_c, 0);
        assert_eq!(state.gpu_temp_c, 0);
        assert_eq!(
            state.unavailable,
            vec![Sensor::Battery, Sensor::CpuTemp, Sensor::GpuTemp, Sensor::Load]
        );
    }

    #[tokio::test]
    async fn test_slow_sensor_times_out() {
        let source = FakeSource {
            battery: Some(BatteryReading {
                level: 3,
                status: BatteryStatus::Discharging,
            }),
            cpu_temp: Some(40.0),
            slow_battery: Some(Duration::from_millis(400)),
            ..Default::default()
        };
        let c = Collector::new(source, Duration::from_millis(50));
        let state = c.collect_at(at(12, 0)).await;

        assert_eq!(state.battery_level, 100);
        assert!(state.unavailable.contains(&Sensor::Battery));
        assert_eq!(state.cpu_temp_c, 40);
    }

    #[tokio::test]
    async fn test_missing_sensor_reported_once() {
        let c = Collector::new(FakeSource::default(), Duration::from_millis(200));
        assert!(c.mark(Sensor::GpuTemp, false));
        assert!(!c.mark(Sensor::GpuTemp, false));
        assert!(!c.mark(Sensor::GpuTemp, true));
        assert!(c.mark(Sensor::GpuTemp, false));
    }

    #[tokio::test]
    async fn test_running_processes_normalized() {
        let source = FakeSource {
            processes: vec![
                proc_entry("steam", Some("/home/u/.steam/bin/steam")),
                proc_entry("Web Content", Some("/usr/lib/firefox/firefox")),
                ProcessEntry {
                    name: "kworker/0:1".into(),
                    exe: None,
                    kernel_thread: true,
                },
                proc_entry("[rcu_sched]", None),
                proc_entry("bash", None),
            ],
            ..Default::default()
        };
        let c = Collector::new(source, Duration::from_millis(500));
        let (state, running) = c.sample_at(at(12, 0)).await;
        let names: Vec<_> = running.iter().map(String::as_str).collect();
        assert_eq!(names, vec!["bash", "firefox", "steam"]);
        assert!(!state.unavailable.contains(&Sensor::Processes));
    }

    #[tokio::test]
    async fn test_unreadable_process_list_marks_snapshot() {
        let source = FakeSource {
            battery: Some(BatteryReading {
                level: 80,
                status: BatteryStatus::Charging,
            }),
            cpu_temp: Some(45.0),
            gpu_temp: Some(40.0),
            load: Some(LoadReading::default()),
            fail_processes: true,
            ..Default::default()
        };
        let c = Collector::new(source, Duration::from_millis(500));
        let (state, running) = c.sample_at(at(12, 0)).await;

        assert!(running.is_empty());
        assert_eq!(state.unavailable, vec![Sensor::Processes]);
        assert!(state.is_degraded());
    }
}
