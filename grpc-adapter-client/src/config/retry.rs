//! Retry policy attached to a channel.
//!
//! The policy follows the shape and semantics of a gRPC service-config
//! `retryPolicy`:
//!
//! - at most `max_attempts` attempts in total, capped at
//!   [`defaults::MAX_ATTEMPTS_LIMIT`] like gRPC does;
//! - only [`Code::Unavailable`] and [`Code::DeadlineExceeded`] are retried;
//! - the n-th retry waits `random(0, min(initial * 2^(n-1), max))`.
//!
//! # Example
//!
//! ```ignore
//! use grpc_adapter_client::{Client, ClientOptions};
//! use std::time::Duration;
//!
//! let client = Client::new(ClientOptions::default())?;
//! let mut stub = EchoClient::new(client.channel());
//!
//! // Retries per the attached policy within one 2s deadline.
//! let reply = client
//!     .invoke(Duration::from_secs(2), |ctx| {
//!         let mut stub = stub.clone();
//!         async move { stub.say(ctx.request(Text { value: "ping".into() })).await }
//!     })
//!     .await?;
//! ```

use std::future::Future;
use std::time::Duration;

use tonic::{Code, Status};

use crate::{CallContext, ClientOptions, ServiceConfig};

/// Fixed parts of the generated policy.
pub mod defaults {
    use tonic::Code;

    /// Multiplier applied to the backoff after every retry.
    pub const BACKOFF_MULTIPLIER: f64 = 2.0;

    /// Status codes that trigger a retry.
    pub const RETRYABLE_CODES: [Code; 2] = [Code::Unavailable, Code::DeadlineExceeded];

    /// gRPC silently lowers `maxAttempts` above this value to it.
    pub const MAX_ATTEMPTS_LIMIT: u32 = 5;
}

/// Retry behaviour derived from [`ClientOptions`].
#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,

    /// Upper bound of the first backoff.
    pub initial_backoff: Duration,

    /// Upper bound of any backoff.
    pub max_backoff: Duration,

    /// Growth factor of the backoff bound.
    pub backoff_multiplier: f64,

    /// Status codes that are retried.
    pub retryable_codes: Vec<Code>,
}

impl RetryPolicy {
    /// Build the policy for `options`.
    ///
    /// Returns `None` when retries are disabled or `max_retry_attempts <= 1`.
    /// Backoffs are clamped as described on
    /// [`ClientOptions::effective_backoff`].
    pub fn from_options(options: &ClientOptions) -> Option<Self> {
        if !options.retries_enabled() {
            return None;
        }
        let (initial_backoff, max_backoff) = options.effective_backoff();
        Some(Self {
            max_attempts: options.max_retry_attempts,
            initial_backoff,
            max_backoff,
            backoff_multiplier: defaults::BACKOFF_MULTIPLIER,
            retryable_codes: defaults::RETRYABLE_CODES.to_vec(),
        })
    }

    /// Attempts actually performed, after applying gRPC's upper limit.
    pub fn effective_attempts(&self) -> u32 {
        self.max_attempts.min(defaults::MAX_ATTEMPTS_LIMIT)
    }

    /// Whether a failure with `code` is retried.
    pub fn is_retryable(&self, code: Code) -> bool {
        self.retryable_codes.contains(&code)
    }

    /// The service-config blob describing this policy.
    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig::for_all_methods(self)
    }

    /// Create a backoff sequence for one call.
    pub fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff::new(self)
    }
}

/// Backoff sequence of a single call.
///
/// Each delay is drawn uniformly from `[0, bound)`, after which the bound
/// grows by the multiplier up to the maximum backoff.
#[derive(Clone, Debug)]
pub struct ExponentialBackoff {
    bound_secs: f64,
    max_secs: f64,
    multiplier: f64,
    retries: u32,
}

impl ExponentialBackoff {
    fn new(policy: &RetryPolicy) -> Self {
        Self {
            bound_secs: policy.initial_backoff.as_secs_f64(),
            max_secs: policy.max_backoff.as_secs_f64(),
            multiplier: policy.backoff_multiplier,
            retries: 0,
        }
    }

    /// Upper bound of the next delay.
    pub fn bound(&self) -> Duration {
        Duration::from_secs_f64(self.bound_secs)
    }

    /// Number of delays handed out so far.
    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Draw the next delay and grow the bound.
    pub fn next_delay(&mut self) -> Duration {
        let delay = rand::random::<f64>() * self.bound_secs;
        self.bound_secs = (self.bound_secs * self.multiplier).min(self.max_secs);
        self.retries += 1;
        Duration::from_secs_f64(delay.max(0.0))
    }
}

/// Run `call` once, bounded by the time left on `ctx`.
pub(crate) async fn attempt<T, F, Fut>(ctx: &CallContext, call: &mut F) -> Result<T, Status>
where
    F: FnMut(CallContext) -> Fut,
    Fut: Future<Output = Result<T, Status>>,
{
    match tokio::time::timeout(ctx.remaining(), call(ctx.clone())).await {
        Ok(result) => result,
        Err(_) => Err(Status::deadline_exceeded(
            "deadline exceeded before the call completed",
        )),
    }
}

/// Run `call` under `policy`, sharing the deadline of `ctx` across attempts.
///
/// Every attempt receives a clone of `ctx`. Non-retryable statuses, the last
/// attempt's status, and any status after which the next backoff would
/// outlive the deadline are returned unchanged.
pub async fn retry_with_policy<T, F, Fut>(
    policy: &RetryPolicy,
    ctx: &CallContext,
    mut call: F,
) -> Result<T, Status>
where
    F: FnMut(CallContext) -> Fut,
    Fut: Future<Output = Result<T, Status>>,
{
    let max_attempts = policy.effective_attempts().max(1);
    let mut backoff = policy.backoff();
    let mut attempts = 0;

    loop {
        attempts += 1;
        let status = match attempt(ctx, &mut call).await {
            Ok(result) => return Ok(result),
            Err(status) => status,
        };

        if !policy.is_retryable(status.code()) || attempts >= max_attempts {
            return Err(status);
        }

        let delay = backoff.next_delay();
        if delay >= ctx.remaining() {
            return Err(status);
        }

        tracing::debug!(
            code = ?status.code(),
            attempt = attempts,
            delay_ms = delay.as_millis() as u64,
            "retrying after transient error"
        );
        tokio::time::sleep(delay).await;
    }
}
