use anyhow::Result;
use std::io;
use std::io::IsTerminal;
use std::path::PathBuf;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::{self, time::ChronoUtc};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Filter directive used when `RUST_LOG` is not set.
///
/// 0 = `LOG_LEVEL`, 1 = debug (with hyper internals suppressed), 2+ = trace.
fn default_directive(verbose_level: u8, quiet: bool, level: &str) -> String {
    if quiet {
        return "error".to_string();
    }

    match verbose_level {
        0 => match level.to_ascii_uppercase().as_str() {
            "DEBUG" => "debug",
            "WARN" | "WARNING" => "warn",
            "ERROR" => "error",
            _ => "info",
        }
        .to_string(),
        1 => "debug,hyper::proto::h1=warn,hyper::client::pool=warn".to_string(),
        _ => "trace".to_string(),
    }
}

/// Log file name without extension, used as the rotation prefix
/// (`syncarr.log` rotates to `syncarr.2026-01-17`).
fn rotation_prefix(file_name: &str) -> &str {
    file_name.rsplitn(2, '.').nth(1).unwrap_or(file_name)
}

pub fn init_logging(verbose_level: u8, quiet: bool, level: &str, log_file: Option<PathBuf>) -> Result<()> {
    let directive = default_directive(verbose_level, quiet, level);
    let filter = if quiet {
        EnvFilter::new(directive)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive))
    };

    let json = std::env::var("RUST_LOG_JSON")
        .map(|v| v == "true")
        .unwrap_or_else(|_| !io::stdout().is_terminal());

    let registry = Registry::default().with(filter);

    if let Some(log_path) = log_file {
        let log_dir = log_path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("Log file path has no parent directory"))?;
        std::fs::create_dir_all(log_dir)?;
        let log_filename = log_path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| anyhow::anyhow!("Invalid log filename"))?;

        let file_appender = RollingFileAppender::new(Rotation::DAILY, log_dir, rotation_prefix(log_filename));

        if json {
            let json_layer = fmt::layer()
                .json()
                .with_timer(ChronoUtc::rfc_3339())
                .with_writer(file_appender);

            registry.with(json_layer).init();
        } else {
            let fmt_layer = fmt::layer()
                .with_timer(ChronoUtc::rfc_3339())
                .with_ansi(false)
                .with_writer(file_appender);

            registry.with(fmt_layer).init();
        }
    } else if json {
        let json_layer = fmt::layer()
            .json()
            .with_timer(ChronoUtc::rfc_3339())
            .with_writer(io::stderr);

        registry.with(json_layer).init();
    } else {
        let fmt_layer = fmt::layer()
            .with_timer(ChronoUtc::rfc_3339())
            .with_writer(io::stderr);

        registry.with(fmt_layer).init();
    }

    Ok(())
}
