//! Error types for the signal pipeline

use thiserror::Error;

/// Result type alias using our custom Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the signal pipeline
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    // Upstream HTTP errors
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("HTTP request timed out: {0}")]
    Timeout(String),

    #[error("Upstream returned status {status} for {url}")]
    UpstreamStatus { status: u16, url: String },

    // JSON-RPC errors
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("RPC returned error {code}: {message}")]
    RpcResponse { code: i64, message: String },

    // Input errors
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid regex pattern: {0}")]
    InvalidRegex(String),

    // Persistence errors
    #[error("Store persistence failed: {0}")]
    StorePersistence(String),

    #[error("Feed write failed: {path}: {reason}")]
    FeedWrite { path: String, reason: String },

    // Notification errors
    #[error("Notification delivery failed: {0}")]
    Notification(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Upstream failures that are swallowed and treated as an empty cycle
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Http(_)
                | Error::Timeout(_)
                | Error::UpstreamStatus { .. }
                | Error::Rpc(_)
                | Error::RpcResponse { .. }
                | Error::Deserialization(_)
                | Error::Notification(_)
        )
    }
}

// Conversion from reqwest errors
impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            let url = e.url().map(|u| u.to_string()).unwrap_or_default();
            return Error::Timeout(url);
        }
        if e.is_decode() {
            return Error::Deserialization(e.to_string());
        }
        if let Some(status) = e.status() {
            return Error::UpstreamStatus {
                status: status.as_u16(),
                url: e.url().map(|u| u.to_string()).unwrap_or_default(),
            };
        }
        Error::Http(e.to_string())
    }
}

// Conversion from serde_json errors
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

// Conversion from I/O errors
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_errors_are_transient() {
        assert!(Error::Http("connection reset".into()).is_transient());
        assert!(Error::Timeout("https://api.dexscreener.com".into()).is_transient());
        assert!(Error::UpstreamStatus {
            status: 429,
            url: "x".into()
        }
        .is_transient());
    }

    #[test]
    fn test_local_errors_propagate() {
        let err = Error::StorePersistence("disk full".into());
        assert!(!err.is_transient());

        let io: Error = std::io::Error::new(std::io::ErrorKind::Other, "boom").into();
        assert!(matches!(io, Error::Io(_)));
        assert!(!io.is_transient());
    }
}
