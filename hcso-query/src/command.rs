//! Fetch helper for providers that are external command-line tools.
//!
//! The program is resolved on `PATH` with [`which::which`] before spawning,
//! so a missing tool surfaces as [`ProviderErrorKind::ToolMissing`] instead
//! of an opaque spawn error.

use std::ffi::OsStr;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

use crate::error::{ProviderError, ProviderErrorKind};

/// Longest stderr excerpt kept in a failure message.
const MAX_STDERR_CHARS: usize = 200;

/// Run `program` with `args` and return its stdout.
///
/// The child is killed if it outlives `timeout`.
///
/// # Errors
///
/// - [`ProviderErrorKind::ToolMissing`] if `program` is not on `PATH`
/// - [`ProviderErrorKind::Timeout`] if it does not finish in time
/// - [`ProviderErrorKind::ToolFailed`] if it cannot be spawned or exits
///   non-zero (the exit code is kept in `status`)
pub async fn run_tool<I, S>(
    program: &str,
    args: I,
    timeout: Duration,
) -> Result<String, ProviderError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let path = which::which(program).map_err(|e| {
        ProviderError::new(
            ProviderErrorKind::ToolMissing,
            format!("{program} not found on PATH: {e}"),
        )
    })?;

    let mut command = Command::new(&path);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    tracing::debug!(program, path = %path.display(), "running external tool");

    let output = match tokio::time::timeout(timeout, command.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            return Err(ProviderError::new(
                ProviderErrorKind::ToolFailed,
                format!("failed to run {program}: {e}"),
            ));
        }
        Err(_) => {
            tracing::warn!(program, timeout_ms = timeout.as_millis() as u64, "external tool timed out");
            return Err(ProviderError::timeout(format!(
                "{program} did not finish within {}s",
                timeout.as_secs_f64()
            )));
        }
    };

    if !output.status.success() {
        let code = output.status.code();
        let stderr = String::from_utf8_lossy(&output.stderr);
        let excerpt: String = stderr.trim().chars().take(MAX_STDERR_CHARS).collect();
        return Err(ProviderError {
            kind: ProviderErrorKind::ToolFailed,
            status: code.and_then(|c| u16::try_from(c).ok()),
            message: match code {
                Some(c) => format!("{program} exited with code {c}: {excerpt}"),
                None => format!("{program} terminated by signal: {excerpt}"),
            },
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_stdout() {
        let out = run_tool("echo", ["hello"], Duration::from_secs(5))
            .await
            .expect("echo");
        assert_eq!(out.trim(), "hello");
    }

    #[tokio::test]
    async fn missing_tool_is_reported() {
        let err = run_tool(
            "hcso-definitely-not-installed",
            Vec::<&str>::new(),
            Duration::from_secs(5),
        )
        .await
        .expect_err("missing");
        assert_eq!(err.kind, ProviderErrorKind::ToolMissing);
    }

    #[tokio::test]
    async fn non_zero_exit_is_tool_failure() {
        let err = run_tool("sh", ["-c", "echo boom >&2; exit 3"], Duration::from_secs(5))
            .await
            .expect_err("exit 3");
        assert_eq!(err.kind, ProviderErrorKind::ToolFailed);
        assert_eq!(err.status, Some(3));
        assert!(err.message.contains("boom"));
    }

    #[tokio::test]
    async fn slow_tool_times_out() {
        let err = run_tool("sleep", ["5"], Duration::from_millis(100))
            .await
            .expect_err("timeout");
        assert_eq!(err.kind, ProviderErrorKind::Timeout);
    }
}
