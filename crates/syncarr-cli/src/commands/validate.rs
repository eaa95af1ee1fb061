use crate::output::Output;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use syncarr_config::Config;

/// Check the configuration, print it with secrets masked, and report.
pub fn run_validate(config: &Config, output: &Output) -> Result<()> {
    let rendered = serde_json::to_value(config)?;
    output.config(&rendered);

    match config.validate() {
        Ok(()) => {
            if !config.transfers_enabled() {
                output.warn("SSH is not configured; runs will only sync metadata");
            }
            output.success("Configuration is valid");
            Ok(())
        }
        Err(e) => {
            output.error(format!("Configuration is invalid: {}", e));
            Err(eyre!("Configuration validation failed: {}", e))
        }
    }
}
