//! Message size limits for registered services.
//!
//! tonic has no server-wide message size setting: every generated server
//! carries its own `max_decoding_message_size` / `max_encoding_message_size`.
//! [`MessageLimits`] holds the configured caps and [`ServiceHandler`] lets the
//! [`Server`](crate::Server) apply them to each service it registers.

/// tonic's default maximum size of a decoded message (4 MB).
pub const DEFAULT_MAX_DECODING_MESSAGE_SIZE: usize = 4 * 1024 * 1024;

/// Configured message size caps.
///
/// `None` keeps tonic's default for that direction: 4 MB when decoding,
/// unbounded when encoding.
///
/// # Example
///
/// ```rust
/// use grpc_adapter::MessageLimits;
///
/// // Non-positive sizes keep the defaults.
/// let limits = MessageLimits::from_sizes(-1, 0);
/// assert_eq!(limits, MessageLimits::default());
///
/// let limits = MessageLimits::from_sizes(16 * 1024 * 1024, 1024);
/// assert_eq!(limits.max_decoding(), Some(16 * 1024 * 1024));
/// assert_eq!(limits.max_encoding(), Some(1024));
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MessageLimits {
    max_decoding: Option<usize>,
    max_encoding: Option<usize>,
}

impl MessageLimits {
    /// Limits keeping tonic's defaults in both directions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Convert the receive and send sizes of
    /// [`ServerOptions`](crate::ServerOptions). Values `<= 0` keep the default.
    pub fn from_sizes(max_receive: i64, max_send: i64) -> Self {
        Self {
            max_decoding: positive(max_receive),
            max_encoding: positive(max_send),
        }
    }

    /// Cap the size of decoded (received) messages.
    pub fn max_decoding_message_size(mut self, limit: usize) -> Self {
        self.max_decoding = Some(limit);
        self
    }

    /// Cap the size of encoded (sent) messages.
    pub fn max_encoding_message_size(mut self, limit: usize) -> Self {
        self.max_encoding = Some(limit);
        self
    }

    pub fn max_decoding(&self) -> Option<usize> {
        self.max_decoding
    }

    pub fn max_encoding(&self) -> Option<usize> {
        self.max_encoding
    }

    /// Apply the configured caps to `service`.
    pub fn apply<S: ServiceHandler>(&self, service: S) -> S {
        let service = match self.max_decoding {
            Some(limit) => service.max_decoding_message_size(limit),
            None => service,
        };
        match self.max_encoding {
            Some(limit) => service.max_encoding_message_size(limit),
            None => service,
        }
    }
}

fn positive(size: i64) -> Option<usize> {
    usize::try_from(size).ok().filter(|size| *size > 0)
}

/// A service whose message size caps can be configured.
///
/// Implemented for tonic generated servers with [`service_handler!`].
pub trait ServiceHandler: Sized {
    fn max_decoding_message_size(self, limit: usize) -> Self;

    fn max_encoding_message_size(self, limit: usize) -> Self;
}

/// Implement [`ServiceHandler`] for a tonic generated server.
///
/// The generated inherent methods of the same name are forwarded to.
///
/// ```rust,ignore
/// use echo_server::{Echo, EchoServer};
///
/// grpc_adapter::service_handler!(EchoServer<T: Echo>);
/// ```
#[macro_export]
macro_rules! service_handler {
    ($server:ident < $param:ident : $bound:path >) => {
        impl<$param: $bound> $crate::ServiceHandler for $server<$param> {
            fn max_decoding_message_size(self, limit: usize) -> Self {
                $server::max_decoding_message_size(self, limit)
            }

            fn max_encoding_message_size(self, limit: usize) -> Self {
                $server::max_encoding_message_size(self, limit)
            }
        }
    };
}

#[cfg(feature = "health")]
mod health {
    use tonic_health::pb::health_server::{Health, HealthServer};

    service_handler!(HealthServer<T: Health>);
}

#[cfg(feature = "reflection")]
mod reflection {
    mod v1 {
        use tonic_reflection::pb::v1::server_reflection_server::{
            ServerReflection, ServerReflectionServer,
        };

        service_handler!(ServerReflectionServer<T: ServerReflection>);
    }

    mod v1alpha {
        use tonic_reflection::pb::v1alpha::server_reflection_server::{
            ServerReflection, ServerReflectionServer,
        };

        service_handler!(ServerReflectionServer<T: ServerReflection>);
    }
}
