use crate::common::DaemonStatus;
use crate::core::arbiter::ProfileDecision;
use crate::core::config::write_atomic;
use crate::core::error::SchedError;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, error};

/// What the running daemon persists after every tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaemonState {
    pub pid: u32,
    pub status: DaemonStatus,
    pub last_applied_profile: Option<String>,
    pub switch_count: u64,
    pub last_error: Option<String>,
    pub updated_at: NaiveDateTime,
    // tables go last in TOML
    pub last_decision: Option<ProfileDecision>,
}

impl DaemonState {
    pub fn starting(pid: u32) -> Self {
        Self {
            pid,
            status: DaemonStatus::Starting,
            last_applied_profile: None,
            switch_count: 0,
            last_error: None,
            updated_at: chrono::Local::now().naive_local(),
            last_decision: None,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = chrono::Local::now().naive_local();
    }

    pub fn save(&self, path: &Path) -> Result<(), SchedError> {
        let body = toml::to_string(self)
            .map_err(|e| SchedError::invalid(path, format!("serialize state: {}", e)))?;
        write_atomic(path, &body)
    }

    /// `Ok(None)` when no daemon has written state.
    pub fn load(path: &Path) -> Result<Option<Self>, SchedError> {
        let body = match std::fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(SchedError::io(format!("Failed to read {}", path.display()), e)),
        };
        toml::from_str(&body)
            .map(Some)
            .map_err(|e| SchedError::invalid(path, e.to_string()))
    }

    pub fn remove(path: &Path) {
        match std::fs::remove_file(path) {
            Ok(()) => debug!(target: "hwsched::daemon", "Removed {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => error!(target: "hwsched::daemon", "Failed to remove {}: {}", path.display(), e),
        }
    }
}

/// Records the applied profile for scripts and status bars. Kept after stop.
pub(crate) fn update_current_profile_file(path: &Path, profile: &str) {
    match write_atomic(path, &format!("{}\n", profile)) {
        Ok(()) => debug!(target: "hwsched::daemon", "Updated current_profile to {}", profile),
        Err(e) => error!(target: "hwsched::daemon", "Failed to update current_profile: {}", e),
    }
}

pub fn read_current_profile(path: &Path) -> Option<String> {
    std::fs::read_to_string(path)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::arbiter::Trigger;

    fn sample() -> DaemonState {
        let mut state = DaemonState::starting(4242);
        state.status = DaemonStatus::Running;
        state.last_applied_profile = Some("gaming".into());
        state.switch_count = 3;
        state.last_decision = Some(ProfileDecision {
            profile: "gaming".into(),
            trigger: Trigger::AppRule,
            matched_app: Some("steam".into()),
            timestamp: state.updated_at,
        });
        state
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.toml");
        let state = sample();
        state.save(&path).unwrap();

        let loaded = DaemonState::load(&path).unwrap().unwrap();
        assert_eq!(loaded.status, DaemonStatus::Running);
        assert_eq!(loaded.switch_count, 3);
        assert_eq!(loaded.last_error, None);
        assert_eq!(loaded.last_decision, state.last_decision);
    }

    #[test]
    fn test_missing_state_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(DaemonState::load(&dir.path().join("state.toml")).unwrap().is_none());
        DaemonState::remove(&dir.path().join("state.toml"));
    }

    #[test]
    fn test_corrupt_state_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.toml");
        std::fs::write(&path, "pid = \"x\"").unwrap();
        assert!(matches!(
            DaemonState::load(&path),
            Err(SchedError::ConfigInvalid { .. })
        ));
    }

    #[test]
    fn test_profile_marker() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("current_profile");
        assert_eq!(read_current_profile(&path), None);
        update_current_profile_file(&path, "power-save");
        assert_eq!(read_current_profile(&path).as_deref(), Some("power-save"));
    }
}
