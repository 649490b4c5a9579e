//! Version queries against toolchain executables.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use semver::Version;
use tokio::process::Command;
use tracing::debug;

use crate::error::{Error, Result};

/// Default wall-clock limit for a version query.
pub const VERSION_QUERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Runs `exe args...` and parses the first line of stdout as a version.
///
/// The child is killed if `timeout` elapses.
///
/// # Errors
///
/// Returns [`Error::Process`] if the executable cannot be run, exits with a
/// failure status or times out, and [`Error::Format`] if the output is not a
/// version.
pub async fn query_version(exe: &Path, args: &[String], timeout: Duration) -> Result<Version> {
    let child = Command::new(exe)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output();

    let output = tokio::time::timeout(timeout, child)
        .await
        .map_err(|_| Error::Process {
            program: exe.to_path_buf(),
            message: format!("version query timed out after {timeout:?}"),
        })?
        .map_err(|e| Error::Process {
            program: exe.to_path_buf(),
            message: format!("failed to run: {e}"),
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::Process {
            program: exe.to_path_buf(),
            message: format!("exited with {}: {}", output.status, stderr.trim()),
        });
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let line = stdout.lines().next().unwrap_or_default().trim();
    debug!(exe = %exe.display(), output = line, "version query");
    Version::parse(line).map_err(|e| {
        Error::format(format!("version output of {}", exe.display()), format!("`{line}`: {e}"))
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::test_support::write_script;
    use serial_test::serial;

    #[tokio::test]
    #[serial]
    async fn parses_first_stdout_line() {
        let temp = tempfile::tempdir().expect("Should create temp dir");
        let exe = write_script(temp.path(), "zig", "echo 0.13.0\necho trailing noise\n");

        let version = query_version(&exe, &["version".to_string()], VERSION_QUERY_TIMEOUT)
            .await
            .expect("Should query");
        assert_eq!(version, Version::new(0, 13, 0));
    }

    #[tokio::test]
    #[serial]
    async fn non_version_output_is_format_error() {
        let temp = tempfile::tempdir().expect("Should create temp dir");
        let exe = write_script(temp.path(), "zig", "echo hello\n");

        let err = query_version(&exe, &[], VERSION_QUERY_TIMEOUT)
            .await
            .expect_err("Should fail");
        assert!(matches!(err, Error::Format { .. }));
    }

    #[tokio::test]
    #[serial]
    async fn failing_exit_status_is_process_error() {
        let temp = tempfile::tempdir().expect("Should create temp dir");
        let exe = write_script(temp.path(), "zls", "echo broken >&2\nexit 3\n");

        let err = query_version(&exe, &["--version".to_string()], VERSION_QUERY_TIMEOUT)
            .await
            .expect_err("Should fail");
        assert!(matches!(err, Error::Process { ref message, .. } if message.contains("broken")));
    }

    #[tokio::test]
    #[serial]
    async fn hung_executable_times_out() {
        let temp = tempfile::tempdir().expect("Should create temp dir");
        let exe = write_script(temp.path(), "zig", "sleep 30\n");

        let err = query_version(&exe, &[], Duration::from_millis(200))
            .await
            .expect_err("Should time out");
        assert!(err.to_string().contains("timed out after 200ms"), "{err}");
    }

    #[tokio::test]
    #[serial]
    async fn missing_executable_is_process_error() {
        let err = query_version(Path::new("/nonexistent/zig"), &[], VERSION_QUERY_TIMEOUT)
            .await
            .expect_err("Should fail");
        assert!(matches!(err, Error::Process { .. }));
    }
}
