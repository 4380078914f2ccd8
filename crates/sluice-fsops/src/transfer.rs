//! External transfer tool invocation (`rclone move`).

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

/// A single file to move to remote storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    /// Absolute local path of the payload.
    pub local_path: PathBuf,
    /// Path relative to the torrent save directory; its parent is mirrored remotely.
    pub rel_path: String,
}

/// Result of one transfer attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    /// The tool exited with status 0.
    Succeeded,
    /// The tool failed; `reason` is the last diagnostic line or a synthetic summary.
    Failed {
        /// Operator-facing failure reason.
        reason: String,
    },
}

impl TransferOutcome {
    /// Whether the transfer completed.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

/// Moves local files to remote storage.
#[async_trait]
pub trait TransferTool: Send + Sync {
    /// Run one transfer to completion or timeout.
    async fn transfer(&self, request: &TransferRequest) -> TransferOutcome;
}

/// Settings for [`RcloneTransfer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferSettings {
    /// Program to execute.
    pub binary: String,
    /// Remote name including its trailing colon (e.g. `remote:`).
    pub remote: String,
    /// Folder inside the remote that receives uploads.
    pub destination: String,
    /// Extra performance and reliability flags appended to every call.
    pub flags: Vec<String>,
    /// Upper bound for a single invocation.
    pub timeout: Duration,
}

/// [`TransferTool`] that shells out to `rclone move`.
#[derive(Debug, Clone)]
pub struct RcloneTransfer {
    settings: TransferSettings,
}

impl RcloneTransfer {
    /// Build a transfer tool from settings.
    #[must_use]
    pub const fn new(settings: TransferSettings) -> Self {
        Self { settings }
    }

    /// Arguments passed to the binary for `request`.
    #[must_use]
    pub fn arguments(&self, request: &TransferRequest) -> Vec<String> {
        let mut args = Vec::with_capacity(self.settings.flags.len() + 3);
        args.push("move".to_string());
        args.push(request.local_path.to_string_lossy().into_owned());
        args.push(remote_destination(
            &self.settings.remote,
            &self.settings.destination,
            &request.rel_path,
        ));
        args.extend(self.settings.flags.iter().cloned());
        args
    }
}

#[async_trait]
impl TransferTool for RcloneTransfer {
    async fn transfer(&self, request: &TransferRequest) -> TransferOutcome {
        let args = self.arguments(request);
        debug!(binary = %self.settings.binary, args = ?args, "starting transfer");
        let child = Command::new(&self.settings.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();
        let child = match child {
            Ok(child) => child,
            Err(err) => {
                return TransferOutcome::Failed {
                    reason: format!("failed to start {}: {err}", self.settings.binary),
                };
            }
        };

        match tokio::time::timeout(self.settings.timeout, child.wait_with_output()).await {
            Err(_) => TransferOutcome::Failed {
                reason: format!("timed out after {}s", self.settings.timeout.as_secs()),
            },
            Ok(Err(err)) => TransferOutcome::Failed {
                reason: format!("failed to wait for {}: {err}", self.settings.binary),
            },
            Ok(Ok(output)) if output.status.success() => TransferOutcome::Succeeded,
            Ok(Ok(output)) => TransferOutcome::Failed {
                reason: last_diagnostic_line(&output.stderr).unwrap_or_else(|| {
                    output.status.code().map_or_else(
                        || "terminated by signal".to_string(),
                        |code| format!("exit status {code}"),
                    )
                }),
            },
        }
    }
}

/// Remote target for a file: `<remote><destination>/<parent of rel_path>`,
/// skipping empty segments.
#[must_use]
pub fn remote_destination(remote: &str, destination: &str, rel_path: &str) -> String {
    let parent = Path::new(rel_path)
        .parent()
        .map(|parent| parent.to_string_lossy().into_owned())
        .unwrap_or_default();
    let segments: Vec<&str> = [destination, parent.as_str()]
        .into_iter()
        .map(|segment| segment.trim_matches('/'))
        .filter(|segment| !segment.is_empty())
        .collect();
    format!("{remote}{}", segments.join("/"))
}

fn last_diagnostic_line(stderr: &[u8]) -> Option<String> {
    String::from_utf8_lossy(stderr)
        .lines()
        .map(str::trim)
        .rfind(|line| !line.is_empty())
        .map(ToString::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(binary: &str, timeout: Duration) -> TransferSettings {
        TransferSettings {
            binary: binary.to_string(),
            remote: "remote:".to_string(),
            destination: "BT_Uploads".to_string(),
            flags: vec!["--retries=10".to_string()],
            timeout,
        }
    }

    fn request() -> TransferRequest {
        TransferRequest {
            local_path: PathBuf::from("/downloads/Show/ep1.mkv"),
            rel_path: "Show/ep1.mkv".to_string(),
        }
    }

    #[test]
    fn destination_mirrors_parent_directory() {
        assert_eq!(
            remote_destination("remote:", "BT_Uploads", "Show/Season 1/ep1.mkv"),
            "remote:BT_Uploads/Show/Season 1"
        );
        assert_eq!(
            remote_destination("remote:", "BT_Uploads/", "single.iso"),
            "remote:BT_Uploads"
        );
        assert_eq!(remote_destination("remote:", "", "a/b.bin"), "remote:a");
    }

    #[test]
    fn arguments_follow_move_contract() {
        let tool = RcloneTransfer::new(settings("rclone", Duration::from_secs(1)));
        assert_eq!(
            tool.arguments(&request()),
            vec![
                "move",
                "/downloads/Show/ep1.mkv",
                "remote:BT_Uploads/Show",
                "--retries=10"
            ]
        );
    }

    #[test]
    fn diagnostics_use_last_non_empty_line() {
        assert_eq!(
            last_diagnostic_line(b"first\nERROR : quota exceeded\n\n"),
            Some("ERROR : quota exceeded".to_string())
        );
        assert_eq!(last_diagnostic_line(b"  \n"), None);
    }

    #[tokio::test]
    async fn missing_binary_is_a_failure() {
        let tool = RcloneTransfer::new(settings(
            "/nonexistent/sluice-transfer",
            Duration::from_secs(1),
        ));
        match tool.transfer(&request()).await {
            TransferOutcome::Failed { reason } => assert!(reason.starts_with("failed to start")),
            TransferOutcome::Succeeded => panic!("missing binary cannot succeed"),
        }
    }

    #[cfg(unix)]
    fn script(dir: &Path, body: &str) -> anyhow::Result<String> {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("fake-rclone.sh");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n"))?;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))?;
        Ok(path.to_string_lossy().into_owned())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn exit_codes_map_to_outcomes() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let failing = script(dir.path(), "echo 'Transferred: 0' >&2\necho 'ERROR : denied' >&2\nexit 3")?;
        let outcome = RcloneTransfer::new(settings(&failing, Duration::from_secs(10)))
            .transfer(&request())
            .await;
        assert_eq!(
            outcome,
            TransferOutcome::Failed {
                reason: "ERROR : denied".to_string()
            }
        );

        let ok = RcloneTransfer::new(settings("true", Duration::from_secs(10)))
            .transfer(&request())
            .await;
        assert!(ok.is_success());

        let silent = RcloneTransfer::new(settings("false", Duration::from_secs(10)))
            .transfer(&request())
            .await;
        assert_eq!(
            silent,
            TransferOutcome::Failed {
                reason: "exit status 1".to_string()
            }
        );
        Ok(())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn hung_transfers_time_out() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let hanging = script(dir.path(), "sleep 30")?;
        let outcome = RcloneTransfer::new(settings(&hanging, Duration::from_millis(200)))
            .transfer(&request())
            .await;
        match outcome {
            TransferOutcome::Failed { reason } => assert!(reason.starts_with("timed out")),
            TransferOutcome::Succeeded => panic!("hung transfer cannot succeed"),
        }
        Ok(())
    }
}
