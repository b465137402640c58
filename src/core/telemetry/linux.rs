use super::{BatteryReading, BatteryStatus, LoadReading, ProcessEntry, TelemetrySource};
use crate::core::cmd::run_cmd_timeout_sync;
use anyhow::{Context, Result, anyhow};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, TryLockError};
use std::time::Duration;
use sysinfo::{
    Components, MemoryRefreshKind, ProcessRefreshKind, ProcessesToUpdate, System, ThreadKind,
    UpdateKind,
};

const CPU_SENSOR_LABELS: &[&str] = &["coretemp", "k10temp", "zenpower", "package", "tctl", "cpu"];
const GPU_HWMON_NAMES: &[&str] = &["amdgpu", "radeon", "nouveau", "i915", "xe"];
const NVIDIA_SMI_TIMEOUT: Duration = Duration::from_millis(1000);

/// Reads sysfs under `root` (normally `/sys`) and queries `sysinfo`.
pub struct LinuxSource {
    root: PathBuf,
    system: Mutex<System>,
}

impl LinuxSource {
    pub fn new() -> Self {
        Self::with_root("/sys")
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            system: Mutex::new(System::new()),
        }
    }

    /// Fails instead of queueing behind a read that outlived its timeout.
    fn system(&self) -> Result<MutexGuard<'_, System>> {
        self.system.try_lock().map_err(|e| match e {
            TryLockError::WouldBlock => anyhow!("sysinfo busy with an earlier read"),
            TryLockError::Poisoned(_) => anyhow!("system lock poisoned"),
        })
    }

    fn read_trimmed(path: &Path) -> Option<String> {
        fs::read_to_string(path).ok().map(|s| s.trim().to_string())
    }

    fn entries(&self, class: &str) -> Vec<PathBuf> {
        let dir = self.root.join("class").join(class);
        let mut paths: Vec<PathBuf> = match fs::read_dir(&dir) {
            Ok(rd) => rd.filter_map(|e| e.ok().map(|e| e.path())).collect(),
            Err(_) => Vec::new(),
        };
        paths.sort();
        paths
    }

    fn sysfs_battery(&self) -> Result<BatteryReading> {
        for supply in self.entries("power_supply") {
            if Self::read_trimmed(&supply.join("type")).as_deref() != Some("Battery") {
                continue;
            }
            let Some(capacity) = Self::read_trimmed(&supply.join("capacity")) else {
                continue;
            };
            let level: u8 = capacity
                .parse::<u16>()
                .map(|v| v.min(100) as u8)
                .with_context(|| format!("bad capacity {:?} in {}", capacity, supply.display()))?;
            let status = Self::read_trimmed(&supply.join("status"))
                .map(|s| BatteryStatus::from_sysfs(&s))
                .unwrap_or_default();
            return Ok(BatteryReading { level, status });
        }
        Err(anyhow!("no battery under {}", self.root.join("class/power_supply").display()))
    }

    fn thermal_zone_max(&self) -> Option<f32> {
        let mut max: Option<f32> = None;
        for zone in self.entries("thermal") {
            let is_zone = zone
                .file_name()
                .is_some_and(|n| n.to_string_lossy().starts_with("thermal_zone"));
            if !is_zone {
                continue;
            }
            if let Some(s) = Self::read_trimmed(&zone.join("temp"))
                && let Ok(millicelsius) = s.parse::<i32>()
            {
                let celsius = millicelsius as f32 / 1000.0;
                if celsius > 0.0 && celsius < 150.0 && max.is_none_or(|m| celsius > m) {
                    max = Some(celsius);
                }
            }
        }
        max
    }

    fn hwmon_gpu_temp(&self) -> Option<f32> {
        for hwmon in self.entries("hwmon") {
            let Some(name) = Self::read_trimmed(&hwmon.join("name")) else {
                continue;
            };
            if !GPU_HWMON_NAMES.contains(&name.as_str()) {
                continue;
            }
            if let Some(s) = Self::read_trimmed(&hwmon.join("temp1_input"))
                && let Ok(millicelsius) = s.parse::<i32>()
            {
                return Some(millicelsius as f32 / 1000.0);
            }
        }
        None
    }

    fn nvidia_gpu_temp() -> Result<f32> {
        let out = run_cmd_timeout_sync(
            "nvidia-smi",
            &["--query-gpu=temperature.gpu", "--format=csv,noheader,nounits"],
            NVIDIA_SMI_TIMEOUT,
        )?;
        if !out.status.success() {
            return Err(anyhow!("nvidia-smi exited with {}", out.status));
        }
        parse_nvidia_smi(&String::from_utf8_lossy(&out.stdout))
            .ok_or_else(|| anyhow!("unexpected nvidia-smi output"))
    }
}

impl Default for LinuxSource {
    fn default() -> Self {
        Self::new()
    }
}

/// Hottest GPU listed by `nvidia-smi`.
fn parse_nvidia_smi(stdout: &str) -> Option<f32> {
    stdout
        .lines()
        .filter_map(|l| l.trim().parse::<f32>().ok())
        .reduce(f32::max)
}

fn is_cpu_label(label: &str) -> bool {
    let label = label.to_ascii_lowercase();
    CPU_SENSOR_LABELS.iter().any(|l| label.contains(l))
}

impl TelemetrySource for LinuxSource {
    fn battery(&self) -> Result<BatteryReading> {
        self.sysfs_battery()
    }

    fn cpu_temp(&self) -> Result<f32> {
        let components = Components::new_with_refreshed_list();
        let from_components = components
            .list()
            .iter()
            .filter(|c| is_cpu_label(c.label()))
            .filter_map(|c| c.temperature())
            .filter(|t| t.is_finite() && *t > 0.0)
            .reduce(f32::max);

        from_components
            .or_else(|| self.thermal_zone_max())
            .ok_or_else(|| anyhow!("no CPU temperature sensor"))
    }

    fn gpu_temp(&self) -> Result<f32> {
        match self.hwmon_gpu_temp() {
            Some(t) => Ok(t),
            None => Self::nvidia_gpu_temp().context("no GPU temperature sensor"),
        }
    }

    fn load(&self) -> Result<LoadReading> {
        let mut sys = self.system()?;
        sys.refresh_cpu_usage();
        sys.refresh_memory_specifics(MemoryRefreshKind::nothing().with_ram());

        let total = sys.total_memory();
        let memory_usage_pct = if total == 0 {
            0.0
        } else {
            (sys.used_memory() as f64 / total as f64 * 100.0) as f32
        };

        Ok(LoadReading {
            cpu_usage_pct: sys.global_cpu_usage(),
            memory_usage_pct,
            load_average: System::load_average().one as f32,
        })
    }

    fn processes(&self) -> Result<Vec<ProcessEntry>> {
        let mut sys = self.system()?;
        sys.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing()
                .with_exe(UpdateKind::OnlyIfNotSet)
                .without_tasks(),
        );

        Ok(sys
            .processes()
            .values()
            .map(|p| ProcessEntry {
                name: p.name().to_string_lossy().into_owned(),
                exe: p.exe().map(Path::to_path_buf),
                kernel_thread: matches!(p.thread_kind(), Some(ThreadKind::Kernel)),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(root: &Path, rel: &str, body: &str) {
        let p = root.join(rel);
        fs::create_dir_all(p.parent().unwrap()).unwrap();
        fs::write(p, body).unwrap();
    }

    #[test]
    fn test_sysfs_battery() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "class/power_supply/AC/type", "Mains\n");
        write(dir.path(), "class/power_supply/BAT0/type", "Battery\n");
        write(dir.path(), "class/power_supply/BAT0/capacity", "42\n");
        write(dir.path(), "class/power_supply/BAT0/status", "Discharging\n");

        let src = LinuxSource::with_root(dir.path());
        let b = src.battery().unwrap();
        assert_eq!(b.level, 42);
        assert_eq!(b.status, BatteryStatus::Discharging);
    }

    #[test]
    fn test_no_battery_is_error() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "class/power_supply/AC/type", "Mains\n");
        assert!(LinuxSource::with_root(dir.path()).battery().is_err());
    }

    #[test]
    fn test_thermal_zone_max() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "class/thermal/thermal_zone0/temp", "45000\n");
        write(dir.path(), "class/thermal/thermal_zone1/temp", "71500\n");
        write(dir.path(), "class/thermal/thermal_zone2/temp", "-273000\n");
        write(dir.path(), "class/thermal/cooling_device0/temp", "99000\n");

        let src = LinuxSource::with_root(dir.path());
        assert_eq!(src.thermal_zone_max(), Some(71.5));
    }

    #[test]
    fn test_hwmon_gpu_temp() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "class/hwmon/hwmon0/name", "k10temp\n");
        write(dir.path(), "class/hwmon/hwmon0/temp1_input", "60000\n");
        write(dir.path(), "class/hwmon/hwmon1/name", "amdgpu\n");
        write(dir.path(), "class/hwmon/hwmon1/temp1_input", "52000\n");

        let src = LinuxSource::with_root(dir.path());
        assert_eq!(src.hwmon_gpu_temp(), Some(52.0));
    }

    #[test]
    fn test_busy_system_reports_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let src = LinuxSource::with_root(dir.path());
        let _stuck = src.system.lock().unwrap();

        let err = src.load().unwrap_err();
        assert!(err.to_string().contains("busy"));
        assert!(src.processes().is_err());
    }

    #[test]
    fn test_parse_nvidia_smi() {
        assert_eq!(parse_nvidia_smi("48\n63\n"), Some(63.0));
        assert_eq!(parse_nvidia_smi("[N/A]\n"), None);
    }

    #[test]
    fn test_cpu_labels() {
        assert!(is_cpu_label("coretemp Package id 0"));
        assert!(is_cpu_label("k10temp Tctl"));
        assert!(!is_cpu_label("nvme Composite"));
    }
}
