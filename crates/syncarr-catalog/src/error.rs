use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("{method} {path} returned HTTP {status}: {body}")]
    Status {
        method: String,
        path: String,
        status: u16,
        body: String,
    },

    #[error("request to {path} failed")]
    Http {
        path: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to decode response from {path}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("item {0} not found")]
    NotFound(String),
}

impl CatalogError {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            CatalogError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}
