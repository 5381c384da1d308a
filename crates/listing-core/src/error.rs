use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("Oracle unavailable: {0}")]
    OracleUnavailable(String),

    #[error("Invalid estimate: {0}")]
    InvalidEstimate(String),

    #[error("No comparables for listing {0}")]
    NoComparables(String),

    #[error("Registry unavailable: {0}")]
    RegistryUnavailable(String),

    #[error("Listing source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Store error: {0}")]
    StoreError(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

impl EngineError {
    /// Errors that end in a zero-confidence result for the listing instead of
    /// being surfaced to the caller.
    pub fn degrades_to_no_signal(&self) -> bool {
        matches!(
            self,
            EngineError::OracleUnavailable(_)
                | EngineError::InvalidEstimate(_)
                | EngineError::NoComparables(_)
        )
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
