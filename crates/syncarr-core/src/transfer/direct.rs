use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::debug;

use super::error::TransferError;
use super::session::{shell_quote, RemoteSession};
use super::{RawTransfer, RemoteShell, TransferBackend};

/// Whole-file copy streamed over the session, verified by remote size.
pub struct DirectCopyBackend {
    session: Arc<RemoteSession>,
    buffer_size: usize,
}

impl DirectCopyBackend {
    pub fn new(session: Arc<RemoteSession>, buffer_size: usize) -> Self {
        Self {
            session,
            buffer_size: buffer_size.max(4096),
        }
    }
}

#[async_trait]
impl TransferBackend for DirectCopyBackend {
    fn name(&self) -> &'static str {
        "direct-copy"
    }

    async fn transfer(&self, local: &Path, dest: &str) -> Result<RawTransfer, TransferError> {
        let local_io = |source| TransferError::LocalIo {
            path: local.to_path_buf(),
            source,
        };

        let mut file = tokio::fs::File::open(local).await.map_err(local_io)?;

        let script = format!("cat > {}", shell_quote(dest));
        let mut child = self
            .session
            .streaming_command(&script)
            .spawn()
            .map_err(|source| TransferError::Spawn {
                program: "ssh".to_string(),
                source,
            })?;

        let mut written: u64 = 0;
        if let Some(mut stdin) = child.stdin.take() {
            let mut buffer = vec![0u8; self.buffer_size];
            loop {
                let n = file.read(&mut buffer).await.map_err(local_io)?;
                if n == 0 {
                    break;
                }
                // A broken pipe means the remote side exited; its status says why.
                if stdin.write_all(&buffer[..n]).await.is_err() {
                    break;
                }
                written += n as u64;
            }
            let _ = stdin.shutdown().await;
        }

        let output = child.wait_with_output().await.map_err(|source| TransferError::Spawn {
            program: "ssh".to_string(),
            source,
        })?;
        if !output.status.success() {
            return Err(TransferError::Command {
                command: script,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let remote = self.session.file_size(dest).await?.unwrap_or(0);
        if remote != written {
            return Err(TransferError::SizeMismatch {
                path: dest.to_string(),
                expected: written,
                actual: remote,
            });
        }

        debug!(dest, bytes = written, "Direct copy verified");
        Ok(RawTransfer::Copied)
    }
}
