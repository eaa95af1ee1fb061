use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tracing::{debug, trace};

use super::error::TransferError;
use super::session::RemoteSession;
use super::{RawTransfer, TransferBackend};

/// Delta transfer through `rsync`, riding the session's control socket.
pub struct RsyncBackend {
    session: Arc<RemoteSession>,
    compress: bool,
}

impl RsyncBackend {
    pub fn new(session: Arc<RemoteSession>, compress: bool) -> Self {
        Self { session, compress }
    }

    fn args(&self, local: &Path, dest: &str) -> Vec<String> {
        let mut args: Vec<String> = [
            "-av",
            "--progress",
            "--partial",
            "--inplace",
            "--itemize-changes",
            "--no-whole-file",
            "--protect-args",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        if self.compress {
            args.push("-z".to_string());
            args.push("--compress-level=1".to_string());
        }
        args.push("-e".to_string());
        args.push(self.session.transport());
        args.push(local.to_string_lossy().into_owned());
        args.push(format!("{}:{}", self.session.target().destination(), dest));
        args
    }
}

/// True when rsync's output shows it moved nothing for `file_name`.
///
/// A pushed file is itemized as `<f...` (`>f...` when received) and usually
/// followed by a progress line ending in `(xfr#N, ...)`. A file already in
/// sync produces neither.
pub(crate) fn reported_up_to_date(output: &str, file_name: &str) -> bool {
    let itemized = output
        .lines()
        .any(|line| (line.starts_with("<f") || line.starts_with(">f")) && line.contains(file_name));
    let progressed = output.lines().any(|line| {
        line.contains("xfr#") || (line.contains(file_name) && (line.contains("bytes/sec") || line.contains('%')))
    });
    !itemized && !progressed
}

#[async_trait]
impl TransferBackend for RsyncBackend {
    fn name(&self) -> &'static str {
        "rsync"
    }

    async fn transfer(&self, local: &Path, dest: &str) -> Result<RawTransfer, TransferError> {
        let mut cmd = Command::new("rsync");
        cmd.args(self.args(local, dest))
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(password) = self.session.password() {
            cmd.env("SSHPASS", password);
        }

        debug!(local = %local.display(), dest, "Running rsync");
        let output = cmd.output().await.map_err(|source| TransferError::Spawn {
            program: "rsync".to_string(),
            source,
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        trace!(output = %stdout, "rsync output");
        if !output.status.success() {
            return Err(TransferError::Command {
                command: format!("rsync {}", local.display()),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let file_name = local
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if reported_up_to_date(&stdout, &file_name) {
            Ok(RawTransfer::UpToDate)
        } else {
            Ok(RawTransfer::Copied)
        }
    }
}

/// `rsync` is on PATH and runs.
pub async fn rsync_available() -> bool {
    let Ok(path) = which::which("rsync") else {
        return false;
    };
    Command::new(path)
        .arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map(|status| status.success())
        .unwrap_or(false)
}
