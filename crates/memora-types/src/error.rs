use thiserror::Error;

/// Errors from model endpoint operations.
#[derive(Debug, Error)]
pub enum ModelError {
    /// A connect, read, or overall request deadline was breached.
    #[error("model request timed out")]
    Timeout,

    #[error("model transport failure: {0}")]
    Transport(String),

    #[error("model endpoint rate limited (retry after {retry_after_ms:?}ms)")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("model authentication failed")]
    AuthenticationFailed,

    #[error("model api error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("model stream error: {0}")]
    Stream(String),

    #[error("model response decode error: {0}")]
    Decode(String),
}

/// Errors from memory store operations.
///
/// `Clone` because a single failed retrieval is fanned out to every
/// caller coalesced onto the same in-flight request.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("store transport failure: {0}")]
    Http(String),

    #[error("store engine failure: {0}")]
    Engine(String),

    #[error("store response decode error: {0}")]
    Decode(String),

    #[error("store unavailable")]
    Unavailable,
}

/// Error returned by the generic circuit breaker wrapper.
#[derive(Debug, Error)]
pub enum BreakerError<E> {
    /// The breaker is open (or a half-open probe is already in flight);
    /// the wrapped operation was not invoked.
    #[error("circuit breaker is open")]
    Open,

    /// The wrapped operation ran and failed.
    #[error(transparent)]
    Inner(E),
}
