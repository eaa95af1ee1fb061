use serde::{Serialize, Serializer};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;
use crate::mapping::PathMapping;

const VALID_LOG_LEVELS: [&str; 4] = ["DEBUG", "INFO", "WARN", "ERROR"];

#[derive(Debug, Clone, Serialize)]
pub struct Config {
    pub source: PlexServerConfig,
    pub destination: PlexServerConfig,
    pub sync_label: String,
    #[serde(serialize_with = "serialize_minutes")]
    pub interval: Duration,
    pub paths: PathMapping,
    pub transfer_method: TransferMethod,
    pub ssh: SshConfig,
    pub performance: PerformanceConfig,
    pub dry_run: bool,
    pub force_full_sync: bool,
    pub log_level: String,
    pub log_file: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlexServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(serialize_with = "mask_secret")]
    pub token: String,
    pub requires_https: bool,
}

impl PlexServerConfig {
    pub fn base_url(&self) -> String {
        let scheme = if self.requires_https { "https" } else { "http" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SshConfig {
    pub user: String,
    #[serde(serialize_with = "mask_secret")]
    pub password: String,
    pub port: u16,
    pub key_path: String,
}

impl SshConfig {
    /// A user plus at least one way to authenticate.
    pub fn is_configured(&self) -> bool {
        !self.user.is_empty() && (!self.password.is_empty() || !self.key_path.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferMethod {
    Rsync,
    Scp,
    Auto,
}

impl std::str::FromStr for TransferMethod {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "rsync" => Ok(TransferMethod::Rsync),
            "scp" | "sftp" => Ok(TransferMethod::Scp),
            "" | "auto" => Ok(TransferMethod::Auto),
            other => Err(ConfigError::InvalidValue {
                key: "TRANSFER_METHOD".to_string(),
                value: other.to_string(),
                reason: "expected rsync, scp or auto".to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PerformanceConfig {
    pub max_concurrent_transfers: usize,
    pub transfer_retries: u32,
    pub transfer_buffer_size: usize,
    pub enable_compression: bool,
    pub plex_api_rate_limit: f64,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            max_concurrent_transfers: 3,
            transfer_retries: 2,
            transfer_buffer_size: 1024 * 1024,
            enable_compression: false,
            plex_api_rate_limit: 10.0,
        }
    }
}

fn mask_secret<S: Serializer>(value: &str, serializer: S) -> Result<S::Ok, S::Error> {
    if value.is_empty() {
        serializer.serialize_str("")
    } else {
        serializer.serialize_str("********")
    }
}

fn serialize_minutes<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(value.as_secs() / 60)
}

/// Reads raw settings by their environment-variable name.
struct Settings<F> {
    lookup: F,
}

impl<F> Settings<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, key: &str) -> String {
        (self.lookup)(key).map(|v| v.trim().to_string()).unwrap_or_default()
    }

    fn optional(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parsed<T: std::str::FromStr>(&self, key: &str, default: T) -> Result<T, ConfigError> {
        match self.optional(key) {
            None => Ok(default),
            Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value: raw,
                reason: "not a valid number".to_string(),
            }),
        }
    }

    fn flag(&self, key: &str, default: bool) -> Result<bool, ConfigError> {
        match self.optional(key) {
            None => Ok(default),
            Some(raw) => match raw.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                _ => Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    value: raw,
                    reason: "expected true or false".to_string(),
                }),
            },
        }
    }

    fn server(&self, prefix: &str) -> Result<PlexServerConfig, ConfigError> {
        Ok(PlexServerConfig {
            host: self.string(&format!("{}_PLEX_HOST", prefix)),
            port: self.parsed(&format!("{}_PLEX_PORT", prefix), 32400)?,
            token: self.string(&format!("{}_PLEX_TOKEN", prefix)),
            requires_https: self.flag(&format!("{}_PLEX_REQUIRES_HTTPS", prefix), true)?,
        })
    }
}

impl Config {
    /// Load from the process environment, falling back to `file` for unset keys.
    pub fn load(file: Option<&Path>) -> anyhow::Result<Self> {
        let file_values = match file {
            Some(path) => load_file_values(path)?,
            None => HashMap::new(),
        };
        let config = Self::from_lookup(|key| {
            std::env::var(key)
                .ok()
                .or_else(|| file_values.get(&key.to_ascii_lowercase()).cloned())
        })?;
        Ok(config)
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any key lookup; values are not validated here.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let settings = Settings { lookup };

        let interval_minutes: u64 = settings.parsed("SYNC_INTERVAL", 60)?;
        let interval_secs = interval_minutes
            .checked_mul(60)
            .ok_or_else(|| ConfigError::InvalidValue {
                key: "SYNC_INTERVAL".to_string(),
                value: interval_minutes.to_string(),
                reason: "interval is too large".to_string(),
            })?;

        Ok(Self {
            source: settings.server("SOURCE")?,
            destination: settings.server("DEST")?,
            sync_label: settings.string("SYNC_LABEL"),
            interval: Duration::from_secs(interval_secs),
            paths: PathMapping {
                source_replace_from: settings.optional("SOURCE_REPLACE_FROM"),
                source_replace_to: settings.optional("SOURCE_REPLACE_TO"),
                dest_root: settings.optional("DEST_ROOT_DIR"),
            },
            transfer_method: settings.string("TRANSFER_METHOD").parse()?,
            ssh: SshConfig {
                user: settings.string("SSH_USER"),
                password: settings.string("SSH_PASSWORD"),
                port: settings.parsed("SSH_PORT", 22)?,
                key_path: settings.string("SSH_KEY_PATH"),
            },
            performance: PerformanceConfig {
                max_concurrent_transfers: settings.parsed("MAX_CONCURRENT_TRANSFERS", 3)?,
                transfer_retries: settings.parsed("TRANSFER_RETRIES", 2)?,
                transfer_buffer_size: settings.parsed("TRANSFER_BUFFER_SIZE", 1024 * 1024)?,
                enable_compression: settings.flag("ENABLE_COMPRESSION", false)?,
                plex_api_rate_limit: settings.parsed("PLEX_API_RATE_LIMIT", 10.0)?,
            },
            dry_run: settings.flag("DRY_RUN", false)?,
            force_full_sync: settings.flag("FORCE_FULL_SYNC", false)?,
            log_level: settings
                .optional("LOG_LEVEL")
                .unwrap_or_else(|| "INFO".to_string())
                .to_ascii_uppercase(),
            log_file: settings.optional("LOG_FILE"),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (key, value) in [
            ("SOURCE_PLEX_HOST", &self.source.host),
            ("SOURCE_PLEX_TOKEN", &self.source.token),
            ("DEST_PLEX_HOST", &self.destination.host),
            ("DEST_PLEX_TOKEN", &self.destination.token),
            ("SYNC_LABEL", &self.sync_label),
        ] {
            if value.is_empty() {
                return Err(ConfigError::Missing(key.to_string()));
            }
        }

        if self.paths.source_replace_from.is_some() != self.paths.source_replace_to.is_some() {
            return Err(ConfigError::Invalid(
                "SOURCE_REPLACE_FROM and SOURCE_REPLACE_TO must be set together".to_string(),
            ));
        }

        if self.ssh.is_configured() && self.paths.dest_root.is_none() {
            return Err(ConfigError::Missing("DEST_ROOT_DIR".to_string()));
        }

        if !VALID_LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(ConfigError::InvalidValue {
                key: "LOG_LEVEL".to_string(),
                value: self.log_level.clone(),
                reason: format!("expected one of {}", VALID_LOG_LEVELS.join(", ")),
            });
        }

        if self.interval.is_zero() {
            return Err(ConfigError::Invalid("SYNC_INTERVAL must be at least 1 minute".to_string()));
        }

        let perf = &self.performance;
        if perf.max_concurrent_transfers < 1 {
            return Err(ConfigError::Invalid("MAX_CONCURRENT_TRANSFERS must be at least 1".to_string()));
        }
        if perf.transfer_buffer_size < 4096 {
            return Err(ConfigError::Invalid("TRANSFER_BUFFER_SIZE must be at least 4096 bytes".to_string()));
        }
        if perf.plex_api_rate_limit <= 0.0 {
            return Err(ConfigError::Invalid("PLEX_API_RATE_LIMIT must be positive".to_string()));
        }

        Ok(())
    }

    /// Without SSH the run only reconciles metadata.
    pub fn transfers_enabled(&self) -> bool {
        self.ssh.is_configured()
    }
}

/// Flat TOML table whose keys are the lowercase variable names.
fn load_file_values(path: &Path) -> anyhow::Result<HashMap<String, String>> {
    use anyhow::Context;

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let table: toml::Table = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;

    Ok(table
        .into_iter()
        .filter_map(|(key, value)| {
            let value = match value {
                toml::Value::String(s) => s,
                toml::Value::Integer(i) => i.to_string(),
                toml::Value::Float(f) => f.to_string(),
                toml::Value::Boolean(b) => b.to_string(),
                _ => return None,
            };
            Some((key.to_ascii_lowercase(), value))
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn base_pairs() -> Vec<(&'static str, &'static str)> {
        vec![
            ("SOURCE_PLEX_HOST", "source.local"),
            ("SOURCE_PLEX_TOKEN", "source-token"),
            ("DEST_PLEX_HOST", "dest.local"),
            ("DEST_PLEX_TOKEN", "dest-token"),
            ("SYNC_LABEL", "sync"),
        ]
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&base_pairs())).unwrap();
        config.validate().unwrap();
        assert_eq!(config.source.port, 32400);
        assert!(config.source.requires_https);
        assert_eq!(config.source.base_url(), "https://source.local:32400");
        assert_eq!(config.interval, Duration::from_secs(3600));
        assert_eq!(config.transfer_method, TransferMethod::Auto);
        assert_eq!(config.ssh.port, 22);
        assert_eq!(config.log_level, "INFO");
        assert!(!config.dry_run);
        assert!(!config.transfers_enabled());
    }

    #[test]
    fn test_load_full_environment() {
        let mut pairs = base_pairs();
        pairs.extend([
            ("SOURCE_PLEX_REQUIRES_HTTPS", "false"),
            ("SYNC_INTERVAL", "30"),
            ("SSH_USER", "testuser"),
            ("SSH_KEY_PATH", "/test/keys/id_rsa"),
            ("DEST_ROOT_DIR", "/test/dest"),
            ("LOG_LEVEL", "debug"),
            ("DRY_RUN", "true"),
            ("TRANSFER_METHOD", "rsync"),
        ]);
        let config = Config::from_lookup(lookup(&pairs)).unwrap();
        config.validate().unwrap();

        assert_eq!(config.source.base_url(), "http://source.local:32400");
        assert_eq!(config.interval, Duration::from_secs(30 * 60));
        assert_eq!(config.ssh.key_path, "/test/keys/id_rsa");
        assert_eq!(config.log_level, "DEBUG");
        assert!(config.dry_run);
        assert!(config.transfers_enabled());
        assert_eq!(config.transfer_method, TransferMethod::Rsync);
    }

    #[test]
    fn test_validate_missing_required() {
        let pairs: Vec<_> = base_pairs().into_iter().filter(|(k, _)| *k != "SYNC_LABEL").collect();
        let config = Config::from_lookup(lookup(&pairs)).unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Missing(key)) if key == "SYNC_LABEL"));
    }

    #[test]
    fn test_validate_replace_pair() {
        let mut pairs = base_pairs();
        pairs.push(("SOURCE_REPLACE_FROM", "/data"));
        let config = Config::from_lookup(lookup(&pairs)).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_ssh_requires_dest_root() {
        let mut pairs = base_pairs();
        pairs.extend([("SSH_USER", "u"), ("SSH_PASSWORD", "p")]);
        let config = Config::from_lookup(lookup(&pairs)).unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Missing(key)) if key == "DEST_ROOT_DIR"));
    }

    #[test]
    fn test_validate_log_level() {
        let mut pairs = base_pairs();
        pairs.push(("LOG_LEVEL", "verbose"));
        let config = Config::from_lookup(lookup(&pairs)).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_number_is_reported() {
        let mut pairs = base_pairs();
        pairs.push(("SSH_PORT", "twenty-two"));
        let err = Config::from_lookup(lookup(&pairs)).unwrap_err();
        assert!(err.to_string().contains("SSH_PORT"));
    }

    #[test]
    fn test_oversized_interval_is_rejected() {
        let mut pairs = base_pairs();
        pairs.push(("SYNC_INTERVAL", "18446744073709551615"));
        let err = Config::from_lookup(lookup(&pairs)).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "SYNC_INTERVAL"));
    }

    #[test]
    fn test_file_values_fill_unset_keys() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "sync_label = \"from-file\"").unwrap();
        writeln!(file, "sync_interval = 15").unwrap();
        writeln!(file, "dry_run = true").unwrap();

        let values = load_file_values(file.path()).unwrap();
        assert_eq!(values.get("sync_label").map(String::as_str), Some("from-file"));
        assert_eq!(values.get("sync_interval").map(String::as_str), Some("15"));
        assert_eq!(values.get("dry_run").map(String::as_str), Some("true"));
    }

    #[test]
    fn test_secrets_are_masked_when_serialized() {
        let mut pairs = base_pairs();
        pairs.push(("SSH_PASSWORD", "hunter2"));
        let config = Config::from_lookup(lookup(&pairs)).unwrap();
        let rendered = serde_json::to_string(&config).unwrap();
        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains("source-token"));
    }
}
