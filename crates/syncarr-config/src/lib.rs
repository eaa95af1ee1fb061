pub mod config;
pub mod error;
pub mod mapping;
pub mod paths;

pub use config::{Config, PerformanceConfig, PlexServerConfig, SshConfig, TransferMethod};
pub use error::ConfigError;
pub use mapping::PathMapping;
pub use paths::{container_base_path, PathManager};
