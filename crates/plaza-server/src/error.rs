use axum::http::StatusCode;
use plaza_store::StoreError;
use tracing::{error, warn};

/// Translate a store failure into a response status.
///
/// `NotFound` and `Conflict` are expected outcomes; `TxExhausted` is
/// retryable by the client; the rest are server faults.
pub fn store_status(err: StoreError) -> StatusCode {
    match err {
        StoreError::NotFound => StatusCode::NOT_FOUND,
        StoreError::Conflict(reason) => {
            warn!(reason, "conflicting write rejected");
            StatusCode::CONFLICT
        }
        StoreError::TxExhausted => {
            warn!("store transaction exhausted its retries");
            StatusCode::SERVICE_UNAVAILABLE
        }
        StoreError::EnvRestricted => StatusCode::FORBIDDEN,
        err @ (StoreError::Codec(_) | StoreError::WrongType(_)) => {
            error!(%err, "store corruption");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
