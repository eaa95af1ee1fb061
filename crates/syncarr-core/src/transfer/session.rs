//! One multiplexed SSH connection per run.
//!
//! The session starts an OpenSSH control master on open. Every remote command
//! is a separate `ssh` invocation riding that connection through the control
//! socket, so each command gets a fresh channel without re-authenticating.

use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use syncarr_config::SshConfig;
use tokio::process::Command;
use tracing::{debug, warn};

use super::error::TransferError;
use super::RemoteShell;

const SSH_OPTIONS: [&str; 5] = [
    "Compression=no",
    "TCPKeepAlive=yes",
    "ServerAliveInterval=30",
    "ServerAliveCountMax=6",
    "StrictHostKeyChecking=no",
];

/// Exit status OpenSSH reserves for its own failures.
const SSH_ERROR_STATUS: i32 = 255;

#[derive(Debug, Clone)]
pub struct SshTarget {
    pub host: String,
    pub user: String,
    pub port: u16,
    pub password: Option<String>,
    pub key_path: Option<String>,
}

impl SshTarget {
    pub fn from_config(host: &str, ssh: &SshConfig) -> Self {
        Self {
            host: host.to_string(),
            user: ssh.user.clone(),
            port: ssh.port,
            password: Some(ssh.password.clone()).filter(|p| !p.is_empty()),
            key_path: Some(ssh.key_path.clone()).filter(|k| !k.is_empty()),
        }
    }

    pub fn destination(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }
}

/// Single-quote for the remote POSIX shell.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\"'\"'"))
}

pub struct RemoteSession {
    target: SshTarget,
    control_path: PathBuf,
    open: AtomicBool,
}

impl RemoteSession {
    pub async fn open(target: SshTarget, runtime_dir: &Path) -> Result<Self, TransferError> {
        tokio::fs::create_dir_all(runtime_dir)
            .await
            .map_err(|source| TransferError::LocalIo {
                path: runtime_dir.to_path_buf(),
                source,
            })?;

        let session = Self {
            control_path: runtime_dir.join(format!("ssh-{}.sock", std::process::id())),
            target,
            open: AtomicBool::new(false),
        };

        // The master backgrounds itself and keeps inherited pipes open, so its
        // stdio must not be captured.
        let mut master = session.command();
        master
            .args(["-M", "-N", "-f", "-o", "ControlPersist=yes"])
            .arg(session.target.destination())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        let status = master.status().await.map_err(|source| TransferError::Spawn {
            program: "ssh".to_string(),
            source,
        })?;
        if !status.success() {
            return Err(TransferError::Command {
                command: format!("ssh master connection to {}", session.target.destination()),
                status: status.to_string(),
                stderr: String::new(),
            });
        }

        session.open.store(true, Ordering::SeqCst);
        debug!(
            host = %session.target.host,
            control_path = %session.control_path.display(),
            "SSH session opened"
        );
        Ok(session)
    }

    pub fn target(&self) -> &SshTarget {
        &self.target
    }

    /// `ssh` arguments shared by every invocation, without the program name.
    fn ssh_args(&self) -> Vec<String> {
        let mut args = vec!["-p".to_string(), self.target.port.to_string()];
        if let Some(key) = &self.target.key_path {
            args.push("-i".to_string());
            args.push(key.clone());
        }
        for option in SSH_OPTIONS {
            args.push("-o".to_string());
            args.push(option.to_string());
        }
        args.push("-o".to_string());
        args.push(format!("ControlPath={}", self.control_path.display()));
        args
    }

    fn command(&self) -> Command {
        let mut cmd = match &self.target.password {
            Some(password) => {
                let mut cmd = Command::new("sshpass");
                cmd.arg("-e").env("SSHPASS", password).arg("ssh");
                cmd
            }
            None => Command::new("ssh"),
        };
        cmd.args(self.ssh_args()).kill_on_drop(true);
        cmd
    }

    /// Remote-shell string for tools that take one (`rsync -e`).
    pub fn transport(&self) -> String {
        let mut parts = Vec::new();
        if self.target.password.is_some() {
            parts.push("sshpass".to_string());
            parts.push("-e".to_string());
        }
        parts.push("ssh".to_string());
        parts.extend(self.ssh_args().into_iter().map(|arg| {
            if arg.contains(char::is_whitespace) {
                shell_quote(&arg)
            } else {
                arg
            }
        }));
        parts.join(" ")
    }

    pub fn password(&self) -> Option<&str> {
        self.target.password.as_deref()
    }

    /// Command with stdin piped, for streaming uploads.
    pub(crate) fn streaming_command(&self, script: &str) -> Command {
        let mut cmd = self.command();
        cmd.arg(self.target.destination())
            .arg(script)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        cmd
    }

    async fn exec(&self, script: &str) -> Result<Output, TransferError> {
        let mut cmd = self.command();
        cmd.arg(self.target.destination())
            .arg(script)
            .stdin(Stdio::null());
        let output = cmd.output().await.map_err(|source| TransferError::Spawn {
            program: "ssh".to_string(),
            source,
        })?;
        if output.status.code() == Some(SSH_ERROR_STATUS) {
            return Err(command_error(script, &output));
        }
        Ok(output)
    }

    /// Run `script` remotely and return its stdout; non-zero exit is an error.
    pub async fn run(&self, script: &str) -> Result<String, TransferError> {
        let output = self.exec(script).await?;
        if !output.status.success() {
            return Err(command_error(script, &output));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    pub async fn close(&self) {
        if !self.open.swap(false, Ordering::SeqCst) {
            return;
        }
        let mut cmd = Command::new("ssh");
        cmd.args(self.ssh_args())
            .args(["-O", "exit"])
            .arg(self.target.destination())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        match cmd.status().await {
            Ok(status) if status.success() => debug!(host = %self.target.host, "SSH session closed"),
            Ok(status) => warn!(host = %self.target.host, status = %status, "SSH control master did not exit cleanly"),
            Err(e) => warn!(host = %self.target.host, error = %e, "Failed to stop SSH control master"),
        }
    }
}

impl Drop for RemoteSession {
    fn drop(&mut self) {
        if self.open.swap(false, Ordering::SeqCst) {
            let _ = std::process::Command::new("ssh")
                .args(self.ssh_args())
                .args(["-O", "exit"])
                .arg(self.target.destination())
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status();
        }
    }
}

fn command_error(script: &str, output: &Output) -> TransferError {
    TransferError::Command {
        command: script.to_string(),
        status: output.status.to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    }
}

pub(crate) fn size_script(path: &str) -> String {
    let quoted = shell_quote(path);
    format!("stat -c%s {q} 2>/dev/null || stat -f%z {q} 2>/dev/null", q = quoted)
}

pub(crate) fn list_script(root: &str) -> String {
    let quoted = shell_quote(root);
    format!("if [ -d {q} ]; then find {q} -type f; fi", q = quoted)
}

pub(crate) fn parse_listing(output: &str) -> HashSet<String> {
    output
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

#[async_trait]
impl RemoteShell for RemoteSession {
    async fn file_size(&self, path: &str) -> Result<Option<u64>, TransferError> {
        let script = size_script(path);
        let output = self.exec(&script).await?;
        if !output.status.success() {
            return Ok(None);
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        stdout
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| TransferError::Parse {
                command: script,
                output: stdout.trim().to_string(),
            })
    }

    async fn delete(&self, path: &str) -> Result<(), TransferError> {
        self.run(&format!("rm -f {}", shell_quote(path))).await.map(|_| ())
    }

    async fn list_tree(&self, root: &str) -> Result<HashSet<String>, TransferError> {
        let output = self.run(&list_script(root)).await?;
        Ok(parse_listing(&output))
    }

    async fn mkdir_all(&self, dir: &str) -> Result<(), TransferError> {
        self.run(&format!("mkdir -p {}", shell_quote(dir))).await.map(|_| ())
    }
}
