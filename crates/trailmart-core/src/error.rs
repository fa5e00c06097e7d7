//! Error types for trailmart.

use thiserror::Error;

/// Result type alias using trailmart's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for trailmart operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Distributed cache operation failed
    #[error("Cache error: {0}")]
    Cache(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// A catalog product referenced by id does not exist
    #[error("Product not found: {0}")]
    ProductNotFound(i64),

    /// Catalog input rejected before any write
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Embedding generation failed
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Inference/generation failed
    #[error("Inference error: {0}")]
    Inference(String),

    /// Search operation failed
    #[error("Search error: {0}")]
    Search(String),

    /// Integration event could not be published
    #[error("Event bus error: {0}")]
    Bus(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// Upstream service answered with an unusable response
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// Signature or credential check failed
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
}

impl Error {
    /// True for failures of remote collaborators that a later attempt may not hit.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Embedding(_)
                | Error::Inference(_)
                | Error::Request(_)
                | Error::Upstream(_)
                | Error::Cache(_)
                | Error::Bus(_)
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Request(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_not_found() {
        let err = Error::NotFound("basket alice".to_string());
        assert_eq!(err.to_string(), "Not found: basket alice");
    }

    #[test]
    fn test_error_display_product_not_found() {
        let err = Error::ProductNotFound(42);
        assert_eq!(err.to_string(), "Product not found: 42");
    }

    #[test]
    fn test_error_display_validation() {
        let err = Error::Validation("variant SKU must not be blank".to_string());
        assert_eq!(
            err.to_string(),
            "Validation failed: variant SKU must not be blank"
        );
    }

    #[test]
    fn test_error_display_cache() {
        let err = Error::Cache("connection refused".to_string());
        assert_eq!(err.to_string(), "Cache error: connection refused");
    }

    #[test]
    fn test_error_display_bus() {
        let err = Error::Bus("no route".to_string());
        assert_eq!(err.to_string(), "Event bus error: no route");
    }

    #[test]
    fn test_error_display_embedding() {
        let err = Error::Embedding("failed to generate".to_string());
        assert_eq!(err.to_string(), "Embedding error: failed to generate");
    }

    #[test]
    fn test_error_display_inference() {
        let err = Error::Inference("model timeout".to_string());
        assert_eq!(err.to_string(), "Inference error: model timeout");
    }

    #[test]
    fn test_error_display_config() {
        let err = Error::Config("KEYCLOAK_REALM is required".to_string());
        assert_eq!(
            err.to_string(),
            "Configuration error: KEYCLOAK_REALM is required"
        );
    }

    #[test]
    fn test_error_display_unauthorized() {
        let err = Error::Unauthorized("signature mismatch".to_string());
        assert_eq!(err.to_string(), "Unauthorized: signature mismatch");
    }

    #[test]
    fn test_error_display_upstream() {
        let err = Error::Upstream("token endpoint returned 500".to_string());
        assert_eq!(err.to_string(), "Upstream error: token endpoint returned 500");
    }

    #[test]
    fn test_transient_classification() {
        assert!(Error::Inference("x".into()).is_transient());
        assert!(Error::Embedding("x".into()).is_transient());
        assert!(Error::Request("x".into()).is_transient());
        assert!(Error::Upstream("x".into()).is_transient());
        assert!(!Error::Validation("x".into()).is_transient());
        assert!(!Error::ProductNotFound(1).is_transient());
        assert!(!Error::Unauthorized("x".into()).is_transient());
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Serialization(_)));
        assert!(err.to_string().starts_with("Serialization error:"));
    }

    #[test]
    fn test_error_is_debug() {
        let err = Error::Internal("test".to_string());
        let debug_str = format!("{:?}", err);
        assert!(debug_str.contains("Internal"));
    }
}
