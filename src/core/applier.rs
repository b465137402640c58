use crate::core::cmd::describe_failure;
use crate::core::config::settings::ApplierConfig;
use crate::core::error::SchedError;
use anyhow::{Context, Result, bail};
use std::collections::BTreeMap;
use std::future::Future;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, info};

const PROFILE_PLACEHOLDER: &str = "{profile}";

/// The external action that switches the machine to a profile.
pub trait ProfileApplier {
    fn apply(&self, profile: &str) -> impl Future<Output = Result<()>>;
}

/// Runs a configured command, e.g. `powerprofilesctl set <backend>`.
#[derive(Debug, Clone)]
pub struct CommandApplier {
    command: String,
    args: Vec<String>,
    aliases: BTreeMap<String, String>,
}

impl CommandApplier {
    pub fn from_config(cfg: &ApplierConfig) -> Self {
        Self {
            command: cfg.command.clone(),
            args: cfg.args.clone(),
            aliases: cfg.aliases.clone(),
        }
    }

    pub fn backend_name<'a>(&'a self, profile: &'a str) -> &'a str {
        self.aliases.get(profile).map(String::as_str).unwrap_or(profile)
    }

    pub fn command_line(&self, profile: &str) -> Vec<String> {
        let backend = self.backend_name(profile);
        self.args
            .iter()
            .map(|a| a.replace(PROFILE_PLACEHOLDER, backend))
            .collect()
    }
}

impl ProfileApplier for CommandApplier {
    async fn apply(&self, profile: &str) -> Result<()> {
        let args = self.command_line(profile);
        debug!(target: "hwsched::applier", "Running {} {}", self.command, args.join(" "));

        let out = Command::new(&self.command)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("Failed to execute: {}", self.command))?;

        if !out.status.success() {
            bail!("{} {}", self.command, describe_failure(&out));
        }
        Ok(())
    }
}

/// Bounds every apply call and reports the outcome as a typed result.
pub struct Applier<A> {
    inner: A,
    timeout: Duration,
}

impl<A: ProfileApplier> Applier<A> {
    pub fn new(inner: A, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    pub fn inner(&self) -> &A {
        &self.inner
    }

    /// Timeout counts as failure. Never panics, never retries.
    pub async fn apply(&self, profile: &str) -> Result<(), SchedError> {
        let started = Instant::now();
        let reason = match tokio::time::timeout(self.timeout, self.inner.apply(profile)).await {
            Ok(Ok(())) => {
                info!(
                    target: "hwsched::applier",
                    "Applied {} in {}ms",
                    profile,
                    started.elapsed().as_millis()
                );
                return Ok(());
            }
            Ok(Err(e)) => format!("{:#}", e),
            Err(_) => format!("timed out after {}ms", self.timeout.as_millis()),
        };

        let err = SchedError::ApplyFailed {
            profile: profile.to_string(),
            reason,
        };
        debug!(
            target: "hwsched::applier",
            "{} after {}ms",
            err,
            started.elapsed().as_millis()
        );
        Err(err)
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use std::cell::RefCell;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) enum Outcome {
        Succeed,
        Fail,
        Hang,
    }

    /// Records every profile it is asked to apply.
    pub(crate) struct MockApplier {
        pub calls: RefCell<Vec<String>>,
        pub outcome: RefCell<Outcome>,
    }

    impl MockApplier {
        pub(crate) fn new(outcome: Outcome) -> Self {
            Self {
                calls: RefCell::new(Vec::new()),
                outcome: RefCell::new(outcome),
            }
        }

        pub(crate) fn call_count(&self) -> usize {
            self.calls.borrow().len()
        }

        pub(crate) fn set_outcome(&self, outcome: Outcome) {
            *self.outcome.borrow_mut() = outcome;
        }
    }

    impl ProfileApplier for MockApplier {
        async fn apply(&self, profile: &str) -> Result<()> {
            self.calls.borrow_mut().push(profile.to_string());
            let outcome = *self.outcome.borrow();
            match outcome {
                Outcome::Succeed => Ok(()),
                Outcome::Fail => bail!("backend refused {}", profile),
                Outcome::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(())
                }
            }
        }
    }
}
