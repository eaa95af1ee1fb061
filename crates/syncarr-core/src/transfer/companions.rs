use std::path::{Path, PathBuf};
use tracing::debug;

/// Name prefix up to the first `.`; `None` when the name has no dot.
fn companion_prefix(file_name: &str) -> Option<&str> {
    file_name.split_once('.').map(|(prefix, _)| prefix)
}

/// Sibling files sharing `main`'s name prefix (subtitles, extra streams), sorted.
///
/// The main file itself is excluded. A missing or unreadable directory yields
/// no companions.
pub async fn companion_files(main: &Path) -> Vec<PathBuf> {
    let Some(file_name) = main.file_name().and_then(|n| n.to_str()) else {
        return Vec::new();
    };
    let Some(prefix) = companion_prefix(file_name) else {
        return Vec::new();
    };
    let wanted = format!("{}.", prefix);
    let dir = main.parent().unwrap_or_else(|| Path::new("."));

    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) => {
            debug!(dir = %dir.display(), error = %e, "Cannot list directory for companion files");
            return Vec::new();
        }
    };

    let mut companions = Vec::new();
    while let Ok(Some(entry)) = entries.next_entry().await {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if name == file_name || !name.starts_with(&wanted) {
            continue;
        }
        let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
        if is_file {
            companions.push(entry.path());
        }
    }
    companions.sort();
    companions
}
