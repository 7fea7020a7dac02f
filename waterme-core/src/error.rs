use std::path::PathBuf;
use thiserror::Error;

use crate::push::MAX_TOKENS_PER_CALL;

/// Failures of the care-item / notification-config store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database query failed: {0}")]
    Query(#[from] diesel::result::Error),

    #[error("failed to get database connection: {0}")]
    Pool(String),

    #[error("failed to decode stored document: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("notification config not found for user {0}")]
    NotFound(String),

    #[error("store operation exceeded the cycle deadline")]
    Timeout,

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Whole-call failures of a push provider. Per-token results are not
/// errors, they come back as [`crate::TokenOutcome`]s.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("push batch must contain 1..={max} tokens, got {0}", max = MAX_TOKENS_PER_CALL)]
    InvalidBatch(usize),

    #[error("push provider authentication failed: {0}")]
    Auth(String),

    #[error("push provider transport error: {0}")]
    Transport(String),

    #[error("push provider call exceeded the cycle deadline")]
    Timeout,

    #[error("push provider misconfigured: {0}")]
    Misconfigured(String),
}

/// Raised while loading message templates at startup. Always fatal.
#[derive(Debug, Error)]
pub enum TemplateLoadError {
    #[error("failed to read template file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse template file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("{0} is required")]
    MissingField(&'static str),

    #[error(transparent)]
    Store(#[from] StoreError),
}
