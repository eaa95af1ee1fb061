use serde::Serialize;

use crate::error::ConfigError;

/// Source-reported path -> local path -> destination path.
///
/// Paths are POSIX strings on both hosts, so this works on `str` rather than
/// `std::path` to stay independent of the platform running the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PathMapping {
    pub source_replace_from: Option<String>,
    pub source_replace_to: Option<String>,
    pub dest_root: Option<String>,
}

/// Strip `prefix` only at a directory boundary; returns the remainder without a leading `/`.
fn strip_dir_prefix<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    let prefix = prefix.trim_end_matches('/');
    let rest = path.strip_prefix(prefix)?;
    if prefix.is_empty() || rest.is_empty() || rest.starts_with('/') {
        Some(rest.trim_start_matches('/'))
    } else {
        None
    }
}

fn join(root: &str, rel: &str) -> String {
    format!("{}/{}", root.trim_end_matches('/'), rel.trim_start_matches('/'))
}

impl PathMapping {
    /// Translate a path as the source catalog reports it into the local filesystem.
    pub fn to_local(&self, source_path: &str) -> Result<String, ConfigError> {
        match (&self.source_replace_from, &self.source_replace_to) {
            (Some(from), Some(to)) => {
                let rel = strip_dir_prefix(source_path, from).ok_or_else(|| {
                    ConfigError::PathOutsidePrefix {
                        path: source_path.to_string(),
                        prefix: from.clone(),
                    }
                })?;
                Ok(join(to, rel))
            }
            _ => Ok(source_path.to_string()),
        }
    }

    /// Translate a local path into its location under the destination root.
    pub fn to_dest(&self, local_path: &str) -> Result<String, ConfigError> {
        let root = self
            .dest_root
            .as_deref()
            .ok_or_else(|| ConfigError::Missing("DEST_ROOT_DIR".to_string()))?;

        let local_root = self
            .source_replace_to
            .as_deref()
            .or(self.source_replace_from.as_deref());

        let rel = match local_root {
            Some(prefix) => strip_dir_prefix(local_path, prefix).ok_or_else(|| {
                ConfigError::PathOutsidePrefix {
                    path: local_path.to_string(),
                    prefix: prefix.to_string(),
                }
            })?,
            None => local_path.rsplit('/').next().unwrap_or(local_path),
        };

        Ok(join(root, rel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping() -> PathMapping {
        PathMapping {
            source_replace_from: Some("/data/media".to_string()),
            source_replace_to: Some("/mnt/nas/media/".to_string()),
            dest_root: Some("/srv/plex/".to_string()),
        }
    }

    #[test]
    fn test_identity_when_unconfigured() {
        let m = PathMapping::default();
        assert_eq!(m.to_local("/data/a.mkv").unwrap(), "/data/a.mkv");
    }

    #[test]
    fn test_to_local_swaps_prefix() {
        assert_eq!(
            mapping().to_local("/data/media/Movies/Heat.mkv").unwrap(),
            "/mnt/nas/media/Movies/Heat.mkv"
        );
    }

    #[test]
    fn test_prefix_must_end_at_directory_boundary() {
        assert!(mapping().to_local("/data/mediaextra/Heat.mkv").is_err());
        assert!(mapping().to_local("/other/Heat.mkv").is_err());
    }

    #[test]
    fn test_to_dest_requires_root() {
        let m = PathMapping {
            dest_root: None,
            ..mapping()
        };
        assert!(matches!(m.to_dest("/mnt/nas/media/a.mkv"), Err(ConfigError::Missing(_))));
    }

    #[test]
    fn test_to_dest_without_prefixes_keeps_file_name() {
        let m = PathMapping {
            dest_root: Some("/dest".to_string()),
            ..PathMapping::default()
        };
        assert_eq!(m.to_dest("/some/where/a.mkv").unwrap(), "/dest/a.mkv");
    }

    #[test]
    fn test_to_dest_falls_back_to_source_prefix() {
        let m = PathMapping {
            source_replace_to: None,
            ..mapping()
        };
        assert_eq!(m.to_dest("/data/media/TV/x.mkv").unwrap(), "/srv/plex/TV/x.mkv");
    }

    #[test]
    fn test_round_trip_preserves_suffix_under_dest_root() {
        let m = mapping();
        let source = "/data/media/TV/Show/Season 01/Show.S01E01.mkv";
        let local = m.to_local(source).unwrap();
        let dest = m.to_dest(&local).unwrap();

        let local_suffix = local.strip_prefix("/mnt/nas/media/").unwrap();
        assert!(dest.starts_with("/srv/plex/"));
        assert_eq!(dest.strip_prefix("/srv/plex/").unwrap(), local_suffix);
        assert_eq!(dest, "/srv/plex/TV/Show/Season 01/Show.S01E01.mkv");
    }
}
