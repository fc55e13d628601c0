use thiserror::Error;

/// Fraud screening runtime errors.
///
/// Most of these never cross the coordinator boundary: detector failures and
/// timeouts degrade to neutral subscores, and storage hiccups retry before
/// surfacing as `StorageUnavailable`. Only `InvalidRequest`, `AlreadyReviewed`,
/// and `NotFound` are meant to reach a caller.
#[derive(Debug, Error)]
pub enum FraudError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("detector unavailable: {0}")]
    DetectorUnavailable(String),

    #[error("detector timed out: {0}")]
    Timeout(String),

    #[error("storage transient failure: {0}")]
    StorageTransient(String),

    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("review '{0}' already decided")]
    AlreadyReviewed(String),

    #[error("review '{0}' not found")]
    NotFound(String),

    #[error("configuration error: {0}")]
    ConfigurationError(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl FraudError {
    pub fn invalid(detail: impl Into<String>) -> Self {
        Self::InvalidRequest(detail.into())
    }
}
