//! Server configuration.

use serde::Deserialize;

use crate::MessageLimits;

/// Address used when [`ServerOptions::address`] is empty.
pub const DEFAULT_ADDRESS: &str = "0.0.0.0:50051";

/// Configuration for a [`Server`](crate::Server).
///
/// Deserializable with serde; missing fields keep their defaults.
///
/// ```
/// use grpc_adapter::ServerOptions;
///
/// let options: ServerOptions =
///     serde_json::from_str(r#"{"address": "127.0.0.1:0", "enable_reflection": false}"#).unwrap();
/// assert!(options.enable_health);
/// assert_eq!(options.max_receive_message_size, -1);
/// ```
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ServerOptions {
    /// Bind address, `host:port`. Host names are resolved.
    pub address: String,

    /// Serve `grpc.reflection.v1` and `grpc.reflection.v1alpha`.
    pub enable_reflection: bool,

    /// Serve `grpc.health.v1.Health`.
    pub enable_health: bool,

    /// Largest accepted request message in bytes. `<= 0` keeps tonic's 4 MB default.
    pub max_receive_message_size: i64,

    /// Largest response message in bytes. `<= 0` keeps tonic's default (unbounded).
    pub max_send_message_size: i64,

    /// TLS configuration. Plaintext is served when absent.
    #[cfg(feature = "tls")]
    #[serde(skip)]
    pub credentials: Option<tonic::transport::ServerTlsConfig>,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            enable_reflection: true,
            enable_health: true,
            max_receive_message_size: -1,
            max_send_message_size: -1,
            #[cfg(feature = "tls")]
            credentials: None,
        }
    }
}

impl ServerOptions {
    /// Options for `address` with every other field at its default.
    pub fn new<S: Into<String>>(address: S) -> Self {
        Self {
            address: address.into(),
            ..Default::default()
        }
    }

    /// Message size caps applied to every registered service.
    pub fn message_limits(&self) -> MessageLimits {
        MessageLimits::from_sizes(self.max_receive_message_size, self.max_send_message_size)
    }

    pub(crate) fn effective_address(&self) -> &str {
        let address = self.address.trim();
        if address.is_empty() {
            DEFAULT_ADDRESS
        } else {
            address
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = ServerOptions::default();
        assert_eq!(options.address, "0.0.0.0:50051");
        assert!(options.enable_reflection);
        assert!(options.enable_health);
        assert_eq!(options.max_receive_message_size, -1);
        assert_eq!(options.max_send_message_size, -1);
        assert_eq!(options.message_limits(), MessageLimits::default());
    }

    #[test]
    fn test_message_limits() {
        let options = ServerOptions {
            max_receive_message_size: 8 * 1024 * 1024,
            max_send_message_size: 0,
            ..Default::default()
        };
        let limits = options.message_limits();
        assert_eq!(limits.max_decoding(), Some(8 * 1024 * 1024));
        assert_eq!(limits.max_encoding(), None);
    }

    #[test]
    fn test_effective_address() {
        assert_eq!(ServerOptions::new("").effective_address(), DEFAULT_ADDRESS);
        assert_eq!(
            ServerOptions::new("127.0.0.1:9000").effective_address(),
            "127.0.0.1:9000"
        );
    }

    #[test]
    fn test_deserialize_partial() {
        let options: ServerOptions =
            serde_json::from_str(r#"{"address": "[::1]:7000", "max_send_message_size": 64}"#)
                .unwrap();
        assert_eq!(options.address, "[::1]:7000");
        assert_eq!(options.max_send_message_size, 64);
        assert!(options.enable_reflection);
        assert!(options.enable_health);
    }
}
