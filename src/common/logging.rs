use super::LogLevel;
use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use time::macros::format_description;
use tracing::{debug, error};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::{EnvFilter, Registry, fmt, prelude::*, reload};

pub type ReloadHandle = reload::Handle<EnvFilter, Registry>;

fn env_overrides() -> bool {
    std::env::var_os(EnvFilter::DEFAULT_ENV).is_some()
}

/// Installs the global subscriber: stderr always, plus an append-only
/// `log_file` when given. `RUST_LOG` overrides `level`.
pub fn init(level: LogLevel, log_file: Option<&Path>) -> Result<ReloadHandle> {
    let base_filter = if env_overrides() {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()))
    } else {
        EnvFilter::new(level.to_string())
    };
    let (filter_layer, filter_handle) = reload::Layer::new(base_filter);

    let stderr_layer = fmt::layer()
        .with_ansi(false)
        .with_target(false)
        .with_timer(UtcTime::new(format_description!("[hour]:[minute]:[second]")))
        .with_writer(std::io::stderr);

    let file_layer = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_target(true)
                    .with_timer(UtcTime::new(format_description!(
                        "[year]-[month]-[day] [hour]:[minute]:[second]Z"
                    )))
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(filter_handle)
}

/// Applies the configured level unless `RUST_LOG` already chose one.
pub fn set_level(handle: &ReloadHandle, level: LogLevel) {
    if env_overrides() {
        debug!(target: "hwsched::daemon", "RUST_LOG set, ignoring log_level = {}", level);
        return;
    }
    match handle.reload(EnvFilter::new(level.to_string())) {
        Ok(()) => debug!(target: "hwsched::daemon", "Log level set to {}", level.to_upper_str()),
        Err(e) => error!(target: "hwsched::daemon", "Failed to change log level: {}", e),
    }
}
