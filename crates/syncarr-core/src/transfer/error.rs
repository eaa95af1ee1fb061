use std::path::PathBuf;
use syncarr_config::ConfigError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("local file {0} does not exist")]
    LocalMissing(PathBuf),

    #[error("failed to read local file {path}")]
    LocalIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to start {program}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{command} exited with {status}: {stderr}")]
    Command {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("remote size of {path} is {actual} bytes, expected {expected}")]
    SizeMismatch { path: String, expected: u64, actual: u64 },

    #[error("unexpected output from {command}: {output}")]
    Parse { command: String, output: String },

    #[error(transparent)]
    Mapping(#[from] ConfigError),

    #[error("transfer backend unavailable: {0}")]
    Unavailable(String),
}

impl TransferError {
    /// A missing local file is a per-file skip, not a failure.
    pub fn is_local_missing(&self) -> bool {
        matches!(self, TransferError::LocalMissing(_))
    }
}
