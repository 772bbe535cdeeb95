//! Client configuration.
//!
//! [`ClientOptions`] is the single configuration value handed to
//! [`Client::new`](crate::Client::new). It can be built in code or
//! deserialized with serde, in which case every field that is not present
//! keeps its default.

use serde::Deserialize;
use std::time::Duration;

use crate::Metadata;

/// Target used when [`ClientOptions::target`] is empty.
pub const DEFAULT_TARGET: &str = "localhost:50051";

/// Deadline applied to calls that give no override, in milliseconds.
pub const DEFAULT_DEADLINE_MS: u64 = 3000;

/// Smallest backoff the retry policy accepts, in milliseconds.
pub const MIN_BACKOFF_MS: u64 = 1;

/// Fixed HTTP/2 keep-alive parameters applied to every channel.
pub mod keepalive {
    use std::time::Duration;

    /// Interval between HTTP/2 PING frames.
    pub const INTERVAL: Duration = Duration::from_millis(20_000);

    /// How long to wait for a PING acknowledgement before closing the connection.
    pub const TIMEOUT: Duration = Duration::from_millis(10_000);

    /// Send keep-alive pings even when no call is active.
    pub const WHILE_IDLE: bool = true;
}

/// Configuration for a [`Client`](crate::Client).
///
/// # Example
///
/// ```
/// use grpc_adapter_client::ClientOptions;
///
/// let options = ClientOptions {
///     target: "localhost:50051".into(),
///     default_deadline_ms: 2000,
///     max_retry_attempts: 3,
///     ..Default::default()
/// };
/// assert!(options.enable_retries);
/// ```
///
/// Loading from JSON:
///
/// ```
/// use grpc_adapter_client::ClientOptions;
///
/// let options: ClientOptions = serde_json::from_str(
///     r#"{"target": "echo:50051", "default_metadata": [["x-tenant", "blue"]]}"#,
/// ).unwrap();
/// assert_eq!(options.default_deadline_ms, 3000);
/// assert_eq!(options.default_metadata.len(), 1);
/// ```
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ClientOptions {
    /// Server address, `host:port` or a full URI.
    pub target: String,

    /// Deadline for calls that do not override it. `0` falls back to
    /// [`DEFAULT_DEADLINE_MS`].
    pub default_deadline_ms: u64,

    /// Attach a retry policy to the channel.
    pub enable_retries: bool,

    /// Total attempts per call, including the first one. Values `<= 1`
    /// disable the retry policy.
    pub max_retry_attempts: u32,

    /// Backoff before the first retry.
    pub initial_backoff_ms: u64,

    /// Upper bound for the backoff between retries.
    pub max_backoff_ms: u64,

    /// Metadata copied into every call context.
    pub default_metadata: Metadata,

    /// TLS configuration. Plaintext is used when absent.
    #[cfg(feature = "tls")]
    #[serde(skip)]
    pub credentials: Option<tonic::transport::ClientTlsConfig>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            target: DEFAULT_TARGET.to_string(),
            default_deadline_ms: DEFAULT_DEADLINE_MS,
            enable_retries: true,
            max_retry_attempts: 3,
            initial_backoff_ms: 200,
            max_backoff_ms: 2000,
            default_metadata: Metadata::new(),
            #[cfg(feature = "tls")]
            credentials: None,
        }
    }
}

impl ClientOptions {
    /// Create options for `target` with every other field at its default.
    pub fn new<S: Into<String>>(target: S) -> Self {
        Self {
            target: target.into(),
            ..Default::default()
        }
    }

    /// Whether a retry policy will be generated for these options.
    pub fn retries_enabled(&self) -> bool {
        self.enable_retries && self.max_retry_attempts > 1
    }

    /// The deadline used when a call does not override it.
    pub fn default_deadline(&self) -> Duration {
        if self.default_deadline_ms == 0 {
            Duration::from_millis(DEFAULT_DEADLINE_MS)
        } else {
            Duration::from_millis(self.default_deadline_ms)
        }
    }

    /// Initial and maximum backoff after clamping.
    ///
    /// The initial backoff is at least [`MIN_BACKOFF_MS`] and the maximum is
    /// never below the initial one.
    pub fn effective_backoff(&self) -> (Duration, Duration) {
        let initial = self.initial_backoff_ms.max(MIN_BACKOFF_MS);
        let max = self.max_backoff_ms.max(initial);
        (Duration::from_millis(initial), Duration::from_millis(max))
    }

    /// Warn about every value that will be clamped.
    pub(crate) fn warn_clamped(&self) {
        if self.default_deadline_ms == 0 {
            tracing::warn!(
                fallback_ms = DEFAULT_DEADLINE_MS,
                "default_deadline_ms is 0, using fallback deadline"
            );
        }
        if !self.retries_enabled() {
            return;
        }
        if self.initial_backoff_ms < MIN_BACKOFF_MS {
            tracing::warn!(
                initial_backoff_ms = self.initial_backoff_ms,
                clamped_ms = MIN_BACKOFF_MS,
                "initial backoff below minimum, clamping"
            );
        }
        let (initial, _) = self.effective_backoff();
        if (self.max_backoff_ms as u128) < initial.as_millis() {
            tracing::warn!(
                max_backoff_ms = self.max_backoff_ms,
                clamped_ms = initial.as_millis() as u64,
                "max backoff below initial backoff, clamping"
            );
        }
    }

    /// The target with empty values replaced by [`DEFAULT_TARGET`].
    pub(crate) fn effective_target(&self) -> &str {
        let target = self.target.trim();
        if target.is_empty() {
            DEFAULT_TARGET
        } else {
            target
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = ClientOptions::default();
        assert_eq!(options.target, "localhost:50051");
        assert_eq!(options.default_deadline_ms, 3000);
        assert!(options.enable_retries);
        assert_eq!(options.max_retry_attempts, 3);
        assert_eq!(options.initial_backoff_ms, 200);
        assert_eq!(options.max_backoff_ms, 2000);
        assert!(options.default_metadata.is_empty());
    }

    #[test]
    fn test_retries_enabled() {
        assert!(ClientOptions::default().retries_enabled());

        let disabled = ClientOptions {
            enable_retries: false,
            ..Default::default()
        };
        assert!(!disabled.retries_enabled());

        for attempts in [0, 1] {
            let single = ClientOptions {
                max_retry_attempts: attempts,
                ..Default::default()
            };
            assert!(!single.retries_enabled());
        }
    }

    #[test]
    fn test_zero_deadline_falls_back() {
        let options = ClientOptions {
            default_deadline_ms: 0,
            ..Default::default()
        };
        assert_eq!(
            options.default_deadline(),
            Duration::from_millis(DEFAULT_DEADLINE_MS)
        );
    }

    #[test]
    fn test_effective_backoff_clamping() {
        let zero = ClientOptions {
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
            ..Default::default()
        };
        assert_eq!(
            zero.effective_backoff(),
            (Duration::from_millis(1), Duration::from_millis(1))
        );

        let inverted = ClientOptions {
            initial_backoff_ms: 500,
            max_backoff_ms: 100,
            ..Default::default()
        };
        assert_eq!(
            inverted.effective_backoff(),
            (Duration::from_millis(500), Duration::from_millis(500))
        );
    }

    #[test]
    fn test_max_backoff_never_below_initial() {
        for initial in [0, 1, 7, 200, 5000] {
            for max in [0, 1, 7, 200, 5000] {
                let options = ClientOptions {
                    initial_backoff_ms: initial,
                    max_backoff_ms: max,
                    ..Default::default()
                };
                let (initial, max) = options.effective_backoff();
                assert!(initial >= Duration::from_millis(MIN_BACKOFF_MS));
                assert!(max >= initial);
            }
        }
    }

    #[test]
    fn test_effective_target() {
        assert_eq!(ClientOptions::new("").effective_target(), DEFAULT_TARGET);
        assert_eq!(ClientOptions::new("  ").effective_target(), DEFAULT_TARGET);
        assert_eq!(ClientOptions::new("echo:9000").effective_target(), "echo:9000");
    }

    #[test]
    fn test_deserialize_partial() {
        let options: ClientOptions = serde_json::from_str(
            r#"{"target": "echo:9000", "enable_retries": false, "max_backoff_ms": 750}"#,
        )
        .unwrap();
        assert_eq!(options.target, "echo:9000");
        assert!(!options.enable_retries);
        assert_eq!(options.max_backoff_ms, 750);
        assert_eq!(options.initial_backoff_ms, 200);
        assert_eq!(options.default_deadline_ms, 3000);
    }

    #[test]
    fn test_deserialize_rejects_invalid_metadata() {
        let result: Result<ClientOptions, _> =
            serde_json::from_str(r#"{"default_metadata": [["bad key", "v"]]}"#);
        assert!(result.is_err());
    }

    /// Everything `warn_clamped` logs for `options`.
    fn clamp_warnings(options: &ClientOptions) -> String {
        use std::io;
        use std::sync::{Arc, Mutex};

        #[derive(Clone, Default)]
        struct Captured(Arc<Mutex<Vec<u8>>>);

        impl io::Write for Captured {
            fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
                self.0.lock().unwrap().extend_from_slice(buf);
                Ok(buf.len())
            }

            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .without_time()
            .finish();
        tracing::subscriber::with_default(subscriber, || options.warn_clamped());

        let bytes = captured.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn test_defaults_log_no_clamp_warning() {
        assert_eq!(clamp_warnings(&ClientOptions::default()), "");
    }

    #[test]
    fn test_zero_deadline_warns() {
        let logs = clamp_warnings(&ClientOptions {
            default_deadline_ms: 0,
            ..Default::default()
        });
        assert!(logs.contains("WARN"), "{logs}");
        assert!(logs.contains("default_deadline_ms is 0"), "{logs}");
        assert!(logs.contains("fallback_ms=3000"), "{logs}");
    }

    #[test]
    fn test_zero_initial_backoff_warns() {
        let logs = clamp_warnings(&ClientOptions {
            initial_backoff_ms: 0,
            ..Default::default()
        });
        assert!(logs.contains("initial backoff below minimum"), "{logs}");
        assert!(!logs.contains("max backoff below initial"), "{logs}");
    }

    #[test]
    fn test_max_below_initial_backoff_warns() {
        let logs = clamp_warnings(&ClientOptions {
            initial_backoff_ms: 500,
            max_backoff_ms: 100,
            ..Default::default()
        });
        assert!(logs.contains("max backoff below initial backoff"), "{logs}");
        assert!(logs.contains("clamped_ms=500"), "{logs}");
        assert!(!logs.contains("initial backoff below minimum"), "{logs}");
    }

    #[test]
    fn test_backoff_not_checked_without_retries() {
        let logs = clamp_warnings(&ClientOptions {
            enable_retries: false,
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
            ..Default::default()
        });
        assert_eq!(logs, "");
    }
}
