//! The connection configurator.

use std::future::Future;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use tonic::Status;
use tonic::transport::{Channel, Endpoint};

use crate::config::retry;
use crate::context::MAX_TIMEOUT;
use crate::options::keepalive;
use crate::{
    CallContext, ClientBuildError, ClientOptions, Metadata, RetryPolicy, ServiceConfig,
    retry_with_policy,
};

/// Pause between connection probes in [`Client::wait_for_ready`].
const PROBE_INTERVAL: Duration = Duration::from_millis(100);

/// A configured channel to one target.
///
/// The channel is created once, lazily, in [`Client::new`] and never
/// replaced. Stubs get a cheap clone through [`Client::channel`]; each call
/// gets its deadline and metadata from a [`CallContext`].
///
/// # Example
///
/// ```ignore
/// use grpc_adapter_client::{Client, ClientOptions};
/// use std::time::Duration;
///
/// let client = Client::new(ClientOptions::new("localhost:50051"))?;
/// client.wait_for_ready(Duration::from_secs(5)).await?;
///
/// let mut stub = EchoClient::new(client.channel());
/// let ctx = client.context();
/// let reply = stub.say(ctx.request(Text { value: "hi".into() })).await?;
/// ```
#[derive(Debug)]
pub struct Client {
    options: ClientOptions,
    target: String,
    endpoint: Endpoint,
    channel: Channel,
    retry_policy: Option<RetryPolicy>,
    service_config: Option<ServiceConfig>,
    default_metadata: RwLock<Metadata>,
}

impl Client {
    /// Build the channel for `options`.
    ///
    /// No connection is attempted; the first call or
    /// [`wait_for_ready`](Self::wait_for_ready) connects. Must be called from
    /// within a tokio runtime.
    pub fn new(options: ClientOptions) -> Result<Self, ClientBuildError> {
        options.warn_clamped();

        let target = normalize_target(options.effective_target(), has_credentials(&options));
        let endpoint = Endpoint::from_shared(target.clone())
            .map_err(|source| ClientBuildError::InvalidTarget {
                target: target.clone(),
                source,
            })?
            .http2_keep_alive_interval(keepalive::INTERVAL)
            .keep_alive_timeout(keepalive::TIMEOUT)
            .keep_alive_while_idle(keepalive::WHILE_IDLE);
        let endpoint = apply_credentials(endpoint, &options)?;

        let retry_policy = RetryPolicy::from_options(&options);
        let service_config = retry_policy.as_ref().map(RetryPolicy::service_config);

        tracing::debug!(
            uri = %target,
            retries = retry_policy.is_some(),
            "creating channel"
        );
        let channel = endpoint.connect_lazy();

        Ok(Self {
            default_metadata: RwLock::new(options.default_metadata.clone()),
            options,
            target,
            endpoint,
            channel,
            retry_policy,
            service_config,
        })
    }

    /// A handle to the channel, for generated client stubs.
    pub fn channel(&self) -> Channel {
        self.channel.clone()
    }

    /// The options the client was built from.
    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// The endpoint URI, scheme included.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// The retry policy, if retries are enabled.
    pub fn retry_policy(&self) -> Option<&RetryPolicy> {
        self.retry_policy.as_ref()
    }

    /// The service config describing the retry policy, if any.
    pub fn service_config(&self) -> Option<&ServiceConfig> {
        self.service_config.as_ref()
    }

    /// Wait until the target accepts a connection.
    ///
    /// Fails with [`Code::Unavailable`](tonic::Code::Unavailable) when no
    /// connection could be established within `timeout`.
    pub async fn wait_for_ready(&self, timeout: Duration) -> Result<(), Status> {
        let probe = async {
            loop {
                match self.endpoint.connect().await {
                    Ok(_) => return,
                    Err(error) => {
                        tracing::debug!(uri = %self.target, %error, "channel not ready");
                        tokio::time::sleep(PROBE_INTERVAL).await;
                    }
                }
            }
        };

        tokio::time::timeout(timeout, probe)
            .await
            .map_err(|_| Status::unavailable("channel not connected before deadline"))
    }

    /// Replace the metadata copied into new contexts.
    ///
    /// Contexts created earlier keep the metadata they were created with.
    pub fn set_default_metadata(&self, metadata: Metadata) {
        *self
            .default_metadata
            .write()
            .unwrap_or_else(PoisonError::into_inner) = metadata;
    }

    /// A copy of the current default metadata.
    pub fn default_metadata(&self) -> Metadata {
        self.default_metadata
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// A fresh context expiring `deadline` from now.
    ///
    /// `Duration::ZERO` selects the configured default deadline.
    pub fn make_context(&self, deadline: Duration) -> CallContext {
        let timeout = if deadline.is_zero() {
            self.options.default_deadline()
        } else {
            deadline
        };
        if timeout > MAX_TIMEOUT {
            tracing::warn!(
                clamped_secs = MAX_TIMEOUT.as_secs(),
                "call deadline above maximum, clamping"
            );
        }
        CallContext::new(timeout, self.default_metadata())
    }

    /// A fresh context with the default deadline.
    pub fn context(&self) -> CallContext {
        self.make_context(Duration::ZERO)
    }

    /// Run `call` under the retry policy with one overall deadline.
    ///
    /// `deadline` follows [`make_context`](Self::make_context). Without a
    /// retry policy this is a single attempt bounded by the deadline.
    pub async fn invoke<T, F, Fut>(&self, deadline: Duration, call: F) -> Result<T, Status>
    where
        F: FnMut(CallContext) -> Fut,
        Fut: Future<Output = Result<T, Status>>,
    {
        let ctx = self.make_context(deadline);
        match &self.retry_policy {
            Some(policy) => retry_with_policy(policy, &ctx, call).await,
            None => {
                let mut call = call;
                retry::attempt(&ctx, &mut call).await
            }
        }
    }
}

/// Prefix `target` with a scheme unless it already has one.
fn normalize_target(target: &str, secure: bool) -> String {
    if target.contains("://") {
        target.to_string()
    } else if secure {
        format!("https://{target}")
    } else {
        format!("http://{target}")
    }
}

#[cfg(feature = "tls")]
fn has_credentials(options: &ClientOptions) -> bool {
    options.credentials.is_some()
}

#[cfg(not(feature = "tls"))]
fn has_credentials(_options: &ClientOptions) -> bool {
    false
}

#[cfg(feature = "tls")]
fn apply_credentials(
    endpoint: Endpoint,
    options: &ClientOptions,
) -> Result<Endpoint, ClientBuildError> {
    match &options.credentials {
        Some(tls) => endpoint
            .tls_config(tls.clone())
            .map_err(ClientBuildError::Credentials),
        None => Ok(endpoint),
    }
}

#[cfg(not(feature = "tls"))]
fn apply_credentials(
    endpoint: Endpoint,
    _options: &ClientOptions,
) -> Result<Endpoint, ClientBuildError> {
    Ok(endpoint)
}
