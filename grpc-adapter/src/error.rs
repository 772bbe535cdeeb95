//! Server start errors.

/// Reason [`Server::start`](crate::Server::start) failed.
#[derive(Debug, thiserror::Error)]
pub enum StartError {
    /// `start` was already called on this server, successfully or not.
    #[error("server was already started")]
    AlreadyStarted,

    /// Two registered services share a name.
    #[error("service {service:?} is registered more than once")]
    Registration { service: String },

    /// The reflection service rejected a descriptor set.
    #[cfg(feature = "reflection")]
    #[error("failed to build reflection service: {0}")]
    Reflection(#[from] tonic_reflection::server::Error),

    /// The TLS configuration was rejected by the transport.
    #[cfg(feature = "tls")]
    #[error("invalid server credentials: {0}")]
    Credentials(#[source] tonic::transport::Error),

    /// The listening socket could not be opened.
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },
}
