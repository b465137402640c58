use crate::common::{
    APP_NAME, LOG_FILE, PID_FILE, PROFILE_MARKER_FILE, RULES_FILE, SETTINGS_FILE, STATE_FILE,
};
use anyhow::{Context, Result};
use std::path::PathBuf;

/// Where configuration and runtime state live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    pub config_dir: PathBuf,
    pub state_dir: PathBuf,
}

impl Paths {
    pub fn new(config_dir: impl Into<PathBuf>, state_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
            state_dir: state_dir.into(),
        }
    }

    /// Explicit directories win; otherwise the XDG config and state dirs.
    pub fn resolve(config_dir: Option<PathBuf>, state_dir: Option<PathBuf>) -> Result<Self> {
        let config_dir = match config_dir {
            Some(d) => d,
            None => dirs::config_dir()
                .context("Cannot determine config directory")?
                .join(APP_NAME),
        };
        let state_dir = match state_dir {
            Some(d) => d,
            None => dirs::state_dir()
                .or_else(dirs::data_local_dir)
                .context("Cannot determine state directory")?
                .join(APP_NAME),
        };
        Ok(Self::new(config_dir, state_dir))
    }

    pub fn settings_path(&self) -> PathBuf {
        self.config_dir.join(SETTINGS_FILE)
    }

    pub fn rules_path(&self) -> PathBuf {
        self.config_dir.join(RULES_FILE)
    }

    pub fn pid_path(&self) -> PathBuf {
        self.state_dir.join(PID_FILE)
    }

    pub fn log_path(&self) -> PathBuf {
        self.state_dir.join(LOG_FILE)
    }

    pub fn state_path(&self) -> PathBuf {
        self.state_dir.join(STATE_FILE)
    }

    pub fn profile_marker_path(&self) -> PathBuf {
        self.state_dir.join(PROFILE_MARKER_FILE)
    }
}
