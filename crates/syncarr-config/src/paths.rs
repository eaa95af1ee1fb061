use std::path::{Path, PathBuf};

/// Container base path from `SYNCARR_BASE_PATH`, defaulting to "/app".
pub fn container_base_path() -> PathBuf {
    std::env::var("SYNCARR_BASE_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/app"))
}

/// Where the binary looks for its optional config file, writes relative log
/// files, and keeps the SSH control socket.
#[derive(Debug, Clone)]
pub struct PathManager {
    config_dir: PathBuf,
    log_dir: PathBuf,
    runtime_dir: PathBuf,
}

impl PathManager {
    /// Rooted at a single directory, the container layout.
    pub fn under(base: &Path) -> Self {
        Self {
            config_dir: base.to_path_buf(),
            log_dir: base.join("logs"),
            runtime_dir: base.join("run"),
        }
    }

    /// Platform directories, e.g. `~/.config/syncarr` and `$XDG_RUNTIME_DIR/syncarr`.
    pub fn user() -> Option<Self> {
        let config_dir = dirs::config_dir()?.join("syncarr");
        let runtime_dir = dirs::runtime_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("syncarr");

        Some(Self {
            log_dir: config_dir.join("logs"),
            config_dir,
            runtime_dir,
        })
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("syncarr.toml")
    }

    /// Holds the SSH control socket for the run's remote session.
    pub fn runtime_dir(&self) -> &Path {
        &self.runtime_dir
    }

    /// `LOG_FILE` as given when absolute, otherwise under the log directory.
    pub fn log_file(&self, configured: &str) -> PathBuf {
        let path = Path::new(configured);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.log_dir.join(path)
        }
    }
}

impl Default for PathManager {
    fn default() -> Self {
        let base = container_base_path();
        if base.exists() {
            return Self::under(&base);
        }

        Self::user().unwrap_or_else(|| Self::under(&base))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_layout() {
        let paths = PathManager::under(Path::new("/app"));

        assert_eq!(paths.config_file(), PathBuf::from("/app/syncarr.toml"));
        assert_eq!(paths.runtime_dir(), Path::new("/app/run"));
    }

    #[test]
    fn test_log_file_resolution() {
        let paths = PathManager::under(Path::new("/app"));

        assert_eq!(paths.log_file("syncarr.log"), PathBuf::from("/app/logs/syncarr.log"));
        assert_eq!(paths.log_file("/var/log/syncarr.log"), PathBuf::from("/var/log/syncarr.log"));
    }
}
