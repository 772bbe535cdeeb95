//! Channel-level configuration derived from [`ClientOptions`](crate::ClientOptions).

pub mod retry;
pub mod service_config;

pub use retry::{ExponentialBackoff, RetryPolicy, retry_with_policy};
pub use service_config::{MethodConfig, MethodName, RetryPolicyConfig, ServiceConfig, code_name};
