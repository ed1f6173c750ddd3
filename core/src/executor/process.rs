//! Subprocess launching for `runcommand`

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use super::CapabilityError;

/// Captured result of one subprocess
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

impl ProcessOutput {
    /// Get combined output (stdout + stderr)
    pub fn combined_output(&self) -> String {
        let mut output = self.stdout.clone();
        if !self.stderr.is_empty() {
            if !output.is_empty() {
                output.push_str("\n--- stderr ---\n");
            }
            output.push_str(&self.stderr);
        }
        output
    }
}

/// Launch `program` with `args` inside `cwd`, killing it after `timeout`.
pub async fn launch(
    program: &Path,
    args: &[String],
    cwd: &Path,
    timeout: Duration,
) -> Result<ProcessOutput, CapabilityError> {
    let mut cmd = Command::new(program);
    cmd.args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .kill_on_drop(true);

    tracing::debug!("Launching {} {:?} in {}", program.display(), args, cwd.display());

    let output = match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(result) => result.map_err(|e| CapabilityError::Launch {
            program: program.display().to_string(),
            reason: e.to_string(),
        })?,
        Err(_) => return Err(CapabilityError::Timeout(timeout)),
    };

    Ok(ProcessOutput {
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        exit_code: output.status.code(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combined_output() {
        let out = ProcessOutput {
            stdout: "partial".to_string(),
            stderr: "boom".to_string(),
            exit_code: Some(1),
        };
        assert_eq!(out.combined_output(), "partial\n--- stderr ---\nboom");

        let only_err = ProcessOutput {
            stdout: String::new(),
            ..out
        };
        assert_eq!(only_err.combined_output(), "boom");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_launch_captures_stdout() {
        let dir = tempfile::tempdir().unwrap();
        let out = launch(
            Path::new("/bin/echo"),
            &["hello".to_string(), "world".to_string()],
            dir.path(),
            Duration::from_secs(5),
        )
        .await
        .unwrap();
        assert_eq!(out.exit_code, Some(0));
        assert_eq!(out.stdout.trim(), "hello world");
    }

    #[tokio::test]
    async fn test_launch_missing_program() {
        let dir = tempfile::tempdir().unwrap();
        let err = launch(
            &dir.path().join("no-such-program"),
            &[],
            dir.path(),
            Duration::from_secs(5),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, CapabilityError::Launch { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_launch_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let err = launch(
            Path::new("/bin/sleep"),
            &["5".to_string()],
            dir.path(),
            Duration::from_millis(100),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, CapabilityError::Timeout(_)));
    }
}
