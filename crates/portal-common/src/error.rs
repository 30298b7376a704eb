/// Error types shared across the portal crates.
///
/// `RemoteError` is what the guide service reports. It is `Clone` because a
/// single shared fetch hands the same failure to every waiting caller.
/// `CommonError` covers local infrastructure (Redis, seed data). Application
/// errors live in the binary crate and wrap both via `#[from]`.

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    #[error("guide service unavailable: {0}")]
    Unavailable(String),

    #[error("guide service request failed ({code}): {message}")]
    Request { code: String, message: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("guide service request timed out")]
    Timeout,
}

#[derive(Debug, thiserror::Error)]
pub enum CommonError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("redis unavailable, degrading gracefully")]
    RedisUnavailable,

    #[error("failed to load seed data: {0}")]
    Seed(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
