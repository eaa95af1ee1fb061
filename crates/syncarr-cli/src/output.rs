use clap::ValueEnum;
use comfy_table::{Cell, Table};
use owo_colors::OwoColorize;
use serde_json::{json, Value};
use syncarr_models::SyncStats;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Human,
    Json,
    #[value(name = "json-pretty")]
    JsonPretty,
}

pub struct Output {
    format: OutputFormat,
    quiet: bool,
}

impl Output {
    pub fn new(format: OutputFormat, quiet: bool) -> Self {
        Self { format, quiet }
    }

    pub fn success(&self, msg: impl AsRef<str>) {
        if self.quiet {
            return;
        }

        match self.format {
            OutputFormat::Human => println!("{} {}", "✓".green(), msg.as_ref()),
            OutputFormat::Json | OutputFormat::JsonPretty => {
                self.print_json(&json!({ "type": "success", "message": msg.as_ref() }))
            }
        }
    }

    pub fn error(&self, msg: impl AsRef<str>) {
        // Errors are shown even in quiet mode
        match self.format {
            OutputFormat::Human => eprintln!("{} {}", "✗".red(), msg.as_ref()),
            OutputFormat::Json | OutputFormat::JsonPretty => {
                self.print_json(&json!({ "type": "error", "message": msg.as_ref() }))
            }
        }
    }

    pub fn warn(&self, msg: impl AsRef<str>) {
        if self.quiet {
            return;
        }

        match self.format {
            OutputFormat::Human => println!("{} {}", "⚠".yellow(), msg.as_ref()),
            OutputFormat::Json | OutputFormat::JsonPretty => {
                self.print_json(&json!({ "type": "warning", "message": msg.as_ref() }))
            }
        }
    }

    /// Cycle summary: a table for humans, the raw counters otherwise.
    pub fn stats(&self, stats: &SyncStats) {
        if self.quiet {
            return;
        }

        match self.format {
            OutputFormat::Human => println!("{}", stats_table(stats)),
            OutputFormat::Json | OutputFormat::JsonPretty => {
                let data = serde_json::to_value(stats).unwrap_or(Value::Null);
                self.print_json(&json!({ "type": "summary", "stats": data }));
            }
        }
    }

    /// Effective configuration; secrets arrive already masked.
    pub fn config(&self, config: &Value) {
        match self.format {
            OutputFormat::Human => {
                let mut table = Table::new();
                table.set_header(vec![
                    Cell::new("Setting").add_attribute(comfy_table::Attribute::Bold),
                    Cell::new("Value").add_attribute(comfy_table::Attribute::Bold),
                ]);
                for (key, value) in flatten(config) {
                    table.add_row(vec![Cell::new(key), Cell::new(value)]);
                }
                table.load_preset(comfy_table::presets::UTF8_FULL);
                table.apply_modifier(comfy_table::modifiers::UTF8_ROUND_CORNERS);
                println!("{}", table);
            }
            OutputFormat::Json | OutputFormat::JsonPretty => {
                self.print_json(&json!({ "type": "config", "config": config }))
            }
        }
    }

    fn print_json(&self, data: &Value) {
        match self.format {
            OutputFormat::JsonPretty => println!("{}", serde_json::to_string_pretty(data).unwrap_or_default()),
            _ => println!("{}", serde_json::to_string(data).unwrap_or_default()),
        }
    }
}

fn stats_table(stats: &SyncStats) -> Table {
    let mut table = Table::new();
    table.set_header(vec![
        Cell::new("Sync Summary")
            .fg(comfy_table::Color::Cyan)
            .add_attribute(comfy_table::Attribute::Bold),
        Cell::new(""),
    ]);

    let rows: [(&str, String); 11] = [
        ("Items discovered", stats.items_discovered.to_string()),
        ("Files transferred", stats.files_transferred.to_string()),
        ("Files skipped", stats.files_skipped.to_string()),
        ("Files failed", stats.files_failed.to_string()),
        ("Transferred", format!("{:.2} MB", stats.bytes_transferred as f64 / (1024.0 * 1024.0))),
        ("Orphans deleted", stats.orphans_deleted.to_string()),
        ("Matches", stats.matches.to_string()),
        ("Metadata synced", stats.metadata_synced.to_string()),
        ("Metadata errors", stats.metadata_errors.to_string()),
        ("Watch states synced", stats.watch_states_synced.to_string()),
        ("Duration", format!("{:.1}s", stats.duration.as_secs_f64())),
    ];
    for (label, value) in rows {
        table.add_row(vec![Cell::new(label), Cell::new(value)]);
    }
    if stats.refresh_timed_out {
        table.add_row(vec![Cell::new("Library refresh"), Cell::new("timed out".yellow().to_string())]);
    }

    table.load_preset(comfy_table::presets::UTF8_FULL);
    table.apply_modifier(comfy_table::modifiers::UTF8_ROUND_CORNERS);
    table
}

/// Dotted key paths for every leaf of a JSON object.
fn flatten(value: &Value) -> Vec<(String, String)> {
    fn walk(prefix: &str, value: &Value, out: &mut Vec<(String, String)>) {
        match value {
            Value::Object(map) => {
                for (key, child) in map {
                    let path = if prefix.is_empty() {
                        key.clone()
                    } else {
                        format!("{}.{}", prefix, key)
                    };
                    walk(&path, child, out);
                }
            }
            Value::Null => out.push((prefix.to_string(), "-".to_string())),
            Value::String(s) => out.push((prefix.to_string(), s.clone())),
            other => out.push((prefix.to_string(), other.to_string())),
        }
    }

    let mut out = Vec::new();
    walk("", value, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flatten_nested_config() {
        let value = json!({
            "source": { "host": "plex.local", "port": 32400 },
            "dry_run": false,
            "log_file": null,
        });

        let rows = flatten(&value);

        assert!(rows.contains(&("source.host".to_string(), "plex.local".to_string())));
        assert!(rows.contains(&("source.port".to_string(), "32400".to_string())));
        assert!(rows.contains(&("dry_run".to_string(), "false".to_string())));
        assert!(rows.contains(&("log_file".to_string(), "-".to_string())));
    }

    #[test]
    fn test_stats_table_flags_refresh_timeout() {
        let stats = SyncStats {
            files_transferred: 3,
            refresh_timed_out: true,
            ..SyncStats::default()
        };

        let rendered = stats_table(&stats).to_string();

        assert!(rendered.contains("Files transferred"));
        assert!(rendered.contains("timed out"));
    }
}
