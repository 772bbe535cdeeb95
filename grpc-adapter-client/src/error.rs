//! Client-side error types.
//!
//! Call failures are plain [`tonic::Status`] values and are never wrapped;
//! the types here only cover building a [`Client`](crate::Client) and
//! assembling metadata.

/// Error type for client building failures.
#[derive(Debug, thiserror::Error)]
pub enum ClientBuildError {
    /// The target could not be turned into an endpoint URI.
    #[error("invalid target {target:?}: {source}")]
    InvalidTarget {
        target: String,
        #[source]
        source: tonic::transport::Error,
    },

    /// The TLS configuration was rejected by the transport.
    #[cfg(feature = "tls")]
    #[error("invalid channel credentials: {0}")]
    Credentials(#[source] tonic::transport::Error),
}

/// Error returned when a metadata pair cannot be sent over gRPC.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum MetadataError {
    /// The key is not a valid ASCII metadata key.
    #[error("invalid metadata key {0:?}")]
    InvalidKey(String),

    /// The value for the given key contains characters not allowed in ASCII metadata.
    #[error("invalid metadata value for key {0:?}")]
    InvalidValue(String),
}
