//! Per-call invocation context.

use std::time::{Duration, Instant};

use crate::Metadata;

/// Longest timeout a context carries (100 years).
///
/// Longer timeouts, such as `Duration::MAX`, are lowered to this value so the
/// deadline stays representable and `grpc-timeout` can still be encoded.
pub const MAX_TIMEOUT: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Deadline and metadata for one logical call.
///
/// A context is created by [`Client::make_context`](crate::Client::make_context)
/// and owned by the caller. It is not tied to the client afterwards:
/// changing the client's default metadata does not affect it.
#[derive(Clone, Debug)]
pub struct CallContext {
    deadline: Instant,
    timeout: Duration,
    metadata: Metadata,
}

impl CallContext {
    /// A context expiring `timeout` from now, carrying `metadata`.
    ///
    /// `timeout` is capped at [`MAX_TIMEOUT`].
    pub fn new(timeout: Duration, metadata: Metadata) -> Self {
        let timeout = timeout.min(MAX_TIMEOUT);
        let now = Instant::now();
        Self {
            deadline: now.checked_add(timeout).unwrap_or(now),
            timeout,
            metadata,
        }
    }

    /// Absolute expiry of the call.
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// The timeout the context was created with.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Time left until the deadline, zero once expired.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        self.remaining().is_zero()
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Metadata for this call only.
    pub fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }

    /// Wrap `message` in a request carrying this context.
    ///
    /// The request's `grpc-timeout` is the remaining time and every metadata
    /// pair is appended in order.
    pub fn request<T>(&self, message: T) -> tonic::Request<T> {
        let mut request = tonic::Request::new(message);
        request.set_timeout(self.remaining());
        self.metadata.apply_to(request.metadata_mut());
        request
    }
}
