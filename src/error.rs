//! Error types for the edge worker
//!
//! This module provides the error type hierarchy using `thiserror`
//! for proper error handling across all components.

use thiserror::Error;

/// The main error type for edge worker operations
#[derive(Error, Debug)]
pub enum Error {
    /// Key-value store errors
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    /// Tenant registration errors
    #[error("Registration error: {0}")]
    Registration(#[from] RegistrationError),

    /// Billing webhook errors
    #[error("Billing error: {0}")]
    Billing(#[from] BillingError),

    /// Static proxy errors
    #[error("Proxy error: {0}")]
    Proxy(#[from] ProxyError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with message
    #[error("{0}")]
    Generic(String),
}

/// Key-value store access errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// The backing store could not be reached or rejected the operation
    #[error("Store backend failure: {0}")]
    Backend(String),

    /// A stored value could not be encoded or decoded
    #[error("Codec failure for key '{key}': {reason}")]
    Codec {
        /// Fully prefixed storage key
        key: String,
        /// Underlying serde error message
        reason: String,
    },
}

/// Tenant registration errors
#[derive(Error, Debug)]
pub enum RegistrationError {
    /// A required field was absent from the request body
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// The subdomain is not a valid lowercase DNS label
    #[error("Invalid subdomain: {0}")]
    InvalidSubdomain(String),

    /// The subdomain is already owned by a different user
    #[error("Subdomain already taken: {0}")]
    SubdomainTaken(String),
}

/// Billing webhook errors
#[derive(Error, Debug)]
pub enum BillingError {
    /// The event envelope could not be parsed
    #[error("Malformed event envelope: {0}")]
    MalformedEnvelope(String),

    /// A handled event type arrived without the data its handler requires
    #[error("Invalid event payload: {0}")]
    InvalidPayload(String),

    /// The signature header was absent while a secret is configured
    #[error("Missing webhook signature header")]
    MissingSignature,

    /// The signature header could not be parsed
    #[error("Malformed webhook signature header: {0}")]
    MalformedSignature(String),

    /// The signature did not match the payload
    #[error("Webhook signature verification failed")]
    SignatureMismatch,

    /// The signed timestamp was outside the acceptance window
    #[error("Webhook timestamp {0} outside acceptance window")]
    StaleTimestamp(i64),
}

/// Static proxy errors
#[derive(Error, Debug)]
pub enum ProxyError {
    /// Building the upstream URL failed
    #[error("Invalid upstream target: {0}")]
    InvalidTarget(String),

    /// The forwarded request to the origin failed
    #[error("Upstream request failed: {0}")]
    Upstream(#[from] reqwest::Error),
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A required environment variable was absent
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),

    /// An environment variable held an unusable value
    #[error("Invalid value for {var}: {reason}")]
    InvalidVar {
        /// Variable name
        var: &'static str,
        /// Why the value was rejected
        reason: String,
    },
}

/// Result type alias for edge worker operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a generic error from a string
    pub fn generic<S: Into<String>>(msg: S) -> Self {
        Error::Generic(msg.into())
    }
}

impl StoreError {
    /// Create a backend error from any displayable cause
    pub fn backend<S: Into<String>>(msg: S) -> Self {
        StoreError::Backend(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Store(StoreError::Backend("connection refused".to_string()));
        assert!(err.to_string().contains("Store backend failure"));
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn test_registration_conflict_display() {
        let err = RegistrationError::SubdomainTaken("alice".to_string());
        assert_eq!(err.to_string(), "Subdomain already taken: alice");
    }

    #[test]
    fn test_missing_field_display() {
        let err = RegistrationError::MissingField("userId");
        assert!(err.to_string().contains("userId"));
    }

    #[test]
    fn test_billing_error_display() {
        let err = BillingError::StaleTimestamp(1_700_000_000);
        assert!(err.to_string().contains("1700000000"));
        assert!(err.to_string().contains("acceptance window"));
    }

    #[test]
    fn test_codec_error_display() {
        let err = StoreError::Codec {
            key: "demo.example:tenant:alice".to_string(),
            reason: "expected value".to_string(),
        };
        assert!(err.to_string().contains("demo.example:tenant:alice"));
    }

    #[test]
    fn test_generic_error() {
        let err = Error::generic("something went wrong");
        assert_eq!(err.to_string(), "something went wrong");
    }
}
