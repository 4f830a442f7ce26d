use thiserror::Error;

/// Errors returned by approval-guard operations.
///
/// Only `InvalidAddress`, `ProviderUnavailable`, `MixedStandards`,
/// `BatchInProgress` and `ConfigError` cross an engine boundary. Probe and
/// revocation failures are recorded per item and never abort a scan or batch.
#[derive(Debug, Error)]
pub enum GuardError {
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("probe failed: {0}")]
    ProbeFailed(String),

    #[error("revocation failed: {0}")]
    RevocationFailed(String),

    #[error("stale selection: {0}")]
    StaleSelection(String),

    #[error("mixed token standards in one revocation batch: {0}")]
    MixedStandards(String),

    #[error("a revocation batch is already in progress")]
    BatchInProgress,

    #[error("config error: {0}")]
    ConfigError(String),

    #[error("chain error: {0}")]
    ChainError(String),

    #[error("serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
}
