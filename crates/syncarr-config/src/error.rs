use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("required setting {0} is not set")]
    Missing(String),

    #[error("invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("{0}")]
    Invalid(String),

    #[error("path '{path}' is not under '{prefix}'")]
    PathOutsidePrefix { path: String, prefix: String },
}
