use anyhow::{Context, Result, bail};
use std::process::{Command, Output, Stdio};
use std::time::Duration;
use tokio::process::Command as TokioCommand;

/// Runs a command to completion; the child is killed if `timeout` expires.
pub async fn run_cmd_timeout_async<S: AsRef<str>>(
    program: &str,
    args: &[S],
    timeout: Duration,
) -> Result<Output> {
    let mut cmd = TokioCommand::new(program);
    cmd.args(args.iter().map(|a| a.as_ref()))
        .stdin(Stdio::null())
        .kill_on_drop(true);

    tokio::time::timeout(timeout, cmd.output())
        .await
        .with_context(|| format!("{} timed out after {}ms", program, timeout.as_millis()))?
        .with_context(|| format!("Failed to execute: {}", program))
}

/// Blocking variant for code already running off the async runtime.
pub fn run_cmd_timeout_sync(program: &str, args: &[&str], timeout: Duration) -> Result<Output> {
    use std::sync::mpsc;
    use std::thread;

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("Failed to execute: {}", program))?;
    let pid = child.id();

    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let _ = tx.send(child.wait_with_output());
    });

    match rx.recv_timeout(timeout) {
        Ok(res) => res.with_context(|| format!("Failed to wait for {}", program)),
        Err(_) => {
            // SAFETY: plain kill(2) on the pid we spawned.
            unsafe {
                libc::kill(pid as libc::pid_t, libc::SIGKILL);
            }
            bail!("{} timed out after {}ms", program, timeout.as_millis())
        }
    }
}

/// Short human-readable reason for a failed command.
pub fn describe_failure(out: &Output) -> String {
    let stderr = String::from_utf8_lossy(&out.stderr);
    let stderr = stderr.trim();
    match (out.status.code(), stderr.is_empty()) {
        (Some(code), true) => format!("exit code {}", code),
        (Some(code), false) => format!("exit code {}: {}", code, stderr),
        (None, _) => "terminated by signal".to_string(),
    }
}
