use std::error::Error;
use std::fmt;

/// Error type for explorer client operations
#[derive(Debug)]
pub enum ExplorerClientError {
    /// Error from the reqwest HTTP client
    HttpError(reqwest::Error),
    /// Error parsing JSON
    JsonError(serde_json::Error),
    /// Non-success status from the explorer
    ApiError { status: u16, body: String },
    /// The explorer refused to relay a transaction
    BroadcastRejected(String),
    /// Configuration error
    ConfigError(String),
    /// Other error
    Other(String),
}

impl fmt::Display for ExplorerClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Wording feeds error classification: keep "network" and "broadcast"
        match self {
            ExplorerClientError::HttpError(e) => write!(f, "Network error: {}", e),
            ExplorerClientError::JsonError(e) => write!(f, "Explorer JSON error: {}", e),
            ExplorerClientError::ApiError { status, body } => {
                write!(f, "Explorer API error (status {}): {}", status, body)
            }
            ExplorerClientError::BroadcastRejected(msg) => write!(f, "Broadcast failed: {}", msg),
            ExplorerClientError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            ExplorerClientError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl Error for ExplorerClientError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ExplorerClientError::HttpError(e) => Some(e),
            ExplorerClientError::JsonError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ExplorerClientError {
    fn from(error: reqwest::Error) -> Self {
        ExplorerClientError::HttpError(error)
    }
}

impl From<serde_json::Error> for ExplorerClientError {
    fn from(error: serde_json::Error) -> Self {
        ExplorerClientError::JsonError(error)
    }
}
