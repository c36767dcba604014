use thiserror::Error;

/// Failure modes of the cache/index engine.
///
/// `NotFound` is an expected lookup outcome, not an infrastructure fault;
/// callers translate it (typically to a 404). `TxExhausted` means an
/// optimistic transaction lost its commit race more times than the retry
/// bound allows and is retryable by the caller.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(&'static str),

    #[error("transaction retries exhausted")]
    TxExhausted,

    #[error("operation is only allowed in development or test environments")]
    EnvRestricted,

    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("wrong value type at key {0}")]
    WrongType(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;
