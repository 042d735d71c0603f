use std::error::Error;
use std::fmt;

/// Error type for prover client operations
#[derive(Debug)]
pub enum ProverClientError {
    /// Error from the reqwest HTTP client
    HttpError(reqwest::Error),
    /// Error parsing JSON
    JsonError(serde_json::Error),
    /// The prover answered with a non-success status
    Rejected { status: u16, body: String },
    /// The prover answered 2xx with an unusable body
    InvalidResponse(String),
    /// Configuration error
    ConfigError(String),
}

impl fmt::Display for ProverClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProverClientError::HttpError(e) => {
                if e.is_timeout() {
                    write!(f, "Prover request timed out: {}", e)
                } else {
                    write!(f, "Network error calling prover: {}", e)
                }
            }
            ProverClientError::JsonError(e) => write!(f, "Prover JSON error: {}", e),
            ProverClientError::Rejected { status, body } => {
                write!(f, "Prover error (status {}): {}", status, body)
            }
            ProverClientError::InvalidResponse(msg) => {
                write!(f, "Unexpected prover response: {}", msg)
            }
            ProverClientError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl Error for ProverClientError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ProverClientError::HttpError(e) => Some(e),
            ProverClientError::JsonError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ProverClientError {
    fn from(error: reqwest::Error) -> Self {
        ProverClientError::HttpError(error)
    }
}

impl From<serde_json::Error> for ProverClientError {
    fn from(error: serde_json::Error) -> Self {
        ProverClientError::JsonError(error)
    }
}
