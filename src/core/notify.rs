use crate::common::APP_NAME;
use crate::core::cmd::{describe_failure, run_cmd_timeout_async};
use std::time::Duration;
use tracing::debug;

const NOTIFY_TIMEOUT: Duration = Duration::from_secs(2);

/// Desktop notification for a profile switch. Best effort; failures only
/// reach the debug log.
pub async fn profile_switched(profile: &str, reason: &str) {
    let summary = format!("Profile: {}", profile);
    let args = [
        "--app-name",
        APP_NAME,
        "--urgency",
        "low",
        summary.as_str(),
        reason,
    ];

    match run_cmd_timeout_async("notify-send", &args, NOTIFY_TIMEOUT).await {
        Ok(out) if out.status.success() => {
            debug!(target: "hwsched::notify", "Notified switch to {}", profile)
        }
        Ok(out) => {
            debug!(target: "hwsched::notify", "notify-send failed: {}", describe_failure(&out))
        }
        Err(e) => debug!(target: "hwsched::notify", "notify-send unavailable: {:#}", e),
    }
}
