use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the scheduler core.
///
/// Only `ConfigInvalid`, `AlreadyRunning` and `Io` are fatal, and only at
/// startup. Everything else is logged inside the tick loop and recovered from.
#[derive(Debug, Error)]
pub enum SchedError {
    #[error("sensor {sensor} unavailable: {reason}")]
    TelemetryUnavailable { sensor: &'static str, reason: String },

    #[error("no rule for {0}")]
    RuleNotFound(String),

    #[error("failed to apply profile {profile}: {reason}")]
    ApplyFailed { profile: String, reason: String },

    #[error("scheduler already running (pid {})", pid_label(.pid))]
    AlreadyRunning { pid: Option<i32> },

    #[error("config file {} missing", .0.display())]
    ConfigMissing(PathBuf),

    #[error("invalid config {}: {reason}", .path.display())]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

fn pid_label(pid: &Option<i32>) -> String {
    pid.map(|p| p.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

impl SchedError {
    pub fn invalid(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::ConfigInvalid {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Whether the error should abort a startup sequence.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ConfigInvalid { .. } | Self::AlreadyRunning { .. } | Self::Io { .. }
        )
    }
}
