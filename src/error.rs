use thiserror::Error;

/// Errors from the Kasa wire driver.
///
/// `Clone` because a single in-flight request is shared by every poller
/// waiting on the state cache, and each of them receives the outcome.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KasaError {
    #[error("connection to {addr} failed: {reason}")]
    Connect { addr: String, reason: String },

    #[error("socket error: {0}")]
    Io(String),

    #[error("request timed out after {0}ms")]
    Timeout(u64),

    #[error("connection closed before a complete frame arrived")]
    ConnectionClosed,

    #[error("invalid JSON payload: {0}")]
    Json(String),

    #[error("unexpected response shape: {0}")]
    InvalidResponse(String),

    #[error("child outlet {0} not found")]
    ChildNotFound(String),
}

impl From<std::io::Error> for KasaError {
    fn from(e: std::io::Error) -> Self {
        KasaError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for KasaError {
    fn from(e: serde_json::Error) -> Self {
        KasaError::Json(e.to_string())
    }
}

/// Failure of a device capability call (`turn_on` / `turn_off`).
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("no backend registered for brand '{0}'")]
    UnsupportedBrand(String),

    #[error("{0}")]
    Backend(String),

    #[error(transparent)]
    Kasa(#[from] KasaError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid settings JSON: {0}")]
    Parse(#[from] serde_json::Error),
}
