use listing_core::EngineError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OracleError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Rate limited")]
    RateLimited,

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Missing API key")]
    MissingApiKey,

    #[error("Timeout")]
    Timeout,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl OracleError {
    /// Transient failures worth another attempt
    pub fn is_retryable(&self) -> bool {
        match self {
            OracleError::RequestFailed(e) => !e.is_builder() && !e.is_decode(),
            OracleError::ServiceUnavailable(_) | OracleError::RateLimited | OracleError::Timeout => true,
            OracleError::InvalidResponse(_)
            | OracleError::MissingApiKey
            | OracleError::Serialization(_) => false,
        }
    }
}

/// Transient errors become `OracleUnavailable` and unparseable replies
/// `InvalidEstimate`; both are retried by `RetryingOracle`. Anything else is
/// a configuration problem and maps to `InvalidData`.
impl From<OracleError> for EngineError {
    fn from(e: OracleError) -> Self {
        match e {
            OracleError::InvalidResponse(_) | OracleError::Serialization(_) => {
                EngineError::InvalidEstimate(e.to_string())
            }
            _ if e.is_retryable() => EngineError::OracleUnavailable(e.to_string()),
            _ => EngineError::InvalidData(format!("oracle: {}", e)),
        }
    }
}

pub type OracleResult<T> = Result<T, OracleError>;
