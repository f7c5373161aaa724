//! Telemetry error types.
//!
//! None of these errors ever reach the caller of `track()`. They exist so
//! internal layers (transport, identity) can report failures through `Result`
//! and the pipeline can classify and log them. Delivery-failure
//! classification itself lives in the dispatcher, which maps HTTP status
//! classes and transport errors onto drop/retry decisions.

use thiserror::Error;

/// Errors raised by a [`crate::transport::Transport`] implementation.
///
/// Any transport error is treated as a retryable delivery failure by the
/// dispatcher; HTTP status codes are carried in the receipt instead and
/// classified separately.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Failed to construct the underlying HTTP client.
    #[error("failed to construct HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    /// The proxy URL could not be parsed.
    #[error("invalid proxy URL: {0}")]
    Proxy(#[source] reqwest::Error),
    /// The request failed below the HTTP layer (connect, timeout, reset).
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// Errors raised by an [`crate::identity::IdentityProvider`].
///
/// The identity cache absorbs these: a failed resolution falls back to a
/// process-temporary value and is logged, never surfaced.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// Reading or writing the persisted device id failed.
    #[error("device identity I/O: {0}")]
    Io(#[from] std::io::Error),
    /// The provider could not produce a value.
    #[error("identity unavailable: {0}")]
    Unavailable(String),
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_io_display() {
        let err = IdentityError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "not found",
        ));
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn identity_io_from_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: IdentityError = io_err.into();
        assert!(matches!(err, IdentityError::Io(_)));
    }

    #[test]
    fn identity_unavailable_display() {
        let err = IdentityError::Unavailable("no backing store".to_string());
        assert_eq!(err.to_string(), "identity unavailable: no backing store");
    }
}
