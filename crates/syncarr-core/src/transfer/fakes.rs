//! In-memory remote host and scripted backend for engine tests.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use super::{RawTransfer, RemoteShell, TransferBackend, TransferError};

#[derive(Default)]
pub(crate) struct FakeShell {
    pub sizes: Mutex<HashMap<String, u64>>,
    pub deleted: Mutex<Vec<String>>,
    pub dirs: Mutex<Vec<String>>,
    pub fail_listing: AtomicBool,
    pub fail_deletes: Mutex<HashSet<String>>,
}

fn remote_failure(command: String) -> TransferError {
    TransferError::Command {
        command,
        status: "exit status: 1".to_string(),
        stderr: "Permission denied".to_string(),
    }
}

impl FakeShell {
    pub fn with_file(self, path: &str, size: u64) -> Self {
        self.sizes.lock().unwrap().insert(path.to_string(), size);
        self
    }

    pub fn failing_listing(self) -> Self {
        self.fail_listing.store(true, Ordering::SeqCst);
        self
    }

    pub fn failing_delete(self, path: &str) -> Self {
        self.fail_deletes.lock().unwrap().insert(path.to_string());
        self
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteShell for FakeShell {
    async fn file_size(&self, path: &str) -> Result<Option<u64>, TransferError> {
        Ok(self.sizes.lock().unwrap().get(path).copied())
    }

    async fn delete(&self, path: &str) -> Result<(), TransferError> {
        if self.fail_deletes.lock().unwrap().contains(path) {
            return Err(remote_failure(format!("rm -f {}", path)));
        }
        self.sizes.lock().unwrap().remove(path);
        self.deleted.lock().unwrap().push(path.to_string());
        Ok(())
    }

    async fn list_tree(&self, root: &str) -> Result<HashSet<String>, TransferError> {
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(remote_failure(format!("find {}", root)));
        }
        Ok(self
            .sizes
            .lock()
            .unwrap()
            .keys()
            .filter(|p| p.starts_with(root))
            .cloned()
            .collect())
    }

    async fn mkdir_all(&self, dir: &str) -> Result<(), TransferError> {
        self.dirs.lock().unwrap().push(dir.to_string());
        Ok(())
    }
}

/// Fails the first `failures` calls, then reports `result`.
pub(crate) struct ScriptedBackend {
    pub calls: Arc<AtomicU32>,
    pub failures: u32,
    pub result: RawTransfer,
}

impl ScriptedBackend {
    pub fn new(failures: u32, result: RawTransfer) -> (Self, Arc<AtomicU32>) {
        let calls = Arc::new(AtomicU32::new(0));
        let backend = Self {
            calls: calls.clone(),
            failures,
            result,
        };
        (backend, calls)
    }
}

#[async_trait]
impl TransferBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn transfer(&self, _local: &Path, dest: &str) -> Result<RawTransfer, TransferError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if n <= self.failures {
            return Err(TransferError::Command {
                command: format!("copy {}", dest),
                status: "exit status: 1".to_string(),
                stderr: "connection reset".to_string(),
            });
        }
        Ok(self.result)
    }
}
