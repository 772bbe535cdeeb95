//! gRPC service-config document.
//!
//! Only the subset needed to describe a channel-wide retry policy is
//! modelled. The serialized form is the JSON accepted by gRPC
//! implementations as a default service config:
//!
//! ```json
//! {"methodConfig":[{"name":[{}],"retryPolicy":{"maxAttempts":3,
//!   "initialBackoff":"0.200s","maxBackoff":"2.000s","backoffMultiplier":2.0,
//!   "retryableStatusCodes":["UNAVAILABLE","DEADLINE_EXCEEDED"]}}]}
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tonic::Code;

use crate::RetryPolicy;

/// Top-level service-config document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConfig {
    pub method_config: Vec<MethodConfig>,
}

/// Per-method configuration block.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodConfig {
    /// Methods this block applies to. A single empty name matches every method.
    pub name: Vec<MethodName>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_policy: Option<RetryPolicyConfig>,
}

/// Method selector. Both fields absent selects every method of every service.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodName {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
}

/// Serialized retry policy. Durations use the protobuf JSON form (`"0.200s"`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicyConfig {
    pub max_attempts: u32,
    pub initial_backoff: String,
    pub max_backoff: String,
    pub backoff_multiplier: f64,
    pub retryable_status_codes: Vec<String>,
}

impl ServiceConfig {
    /// A config applying `policy` to every method on the channel.
    pub fn for_all_methods(policy: &RetryPolicy) -> Self {
        Self {
            method_config: vec![MethodConfig {
                name: vec![MethodName::default()],
                retry_policy: Some(RetryPolicyConfig::from(policy)),
            }],
        }
    }

    /// Serialize to compact JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl From<&RetryPolicy> for RetryPolicyConfig {
    fn from(policy: &RetryPolicy) -> Self {
        Self {
            max_attempts: policy.max_attempts,
            initial_backoff: format_seconds(policy.initial_backoff),
            max_backoff: format_seconds(policy.max_backoff),
            backoff_multiplier: policy.backoff_multiplier,
            retryable_status_codes: policy
                .retryable_codes
                .iter()
                .map(|code| code_name(*code).to_string())
                .collect(),
        }
    }
}

/// Seconds with millisecond precision and an `s` suffix.
fn format_seconds(duration: Duration) -> String {
    format!("{:.3}s", duration.as_secs_f64())
}

/// Canonical upper-case name of a status code.
pub fn code_name(code: Code) -> &'static str {
    match code {
        Code::Ok => "OK",
        Code::Cancelled => "CANCELLED",
        Code::Unknown => "UNKNOWN",
        Code::InvalidArgument => "INVALID_ARGUMENT",
        Code::DeadlineExceeded => "DEADLINE_EXCEEDED",
        Code::NotFound => "NOT_FOUND",
        Code::AlreadyExists => "ALREADY_EXISTS",
        Code::PermissionDenied => "PERMISSION_DENIED",
        Code::ResourceExhausted => "RESOURCE_EXHAUSTED",
        Code::FailedPrecondition => "FAILED_PRECONDITION",
        Code::Aborted => "ABORTED",
        Code::OutOfRange => "OUT_OF_RANGE",
        Code::Unimplemented => "UNIMPLEMENTED",
        Code::Internal => "INTERNAL",
        Code::Unavailable => "UNAVAILABLE",
        Code::DataLoss => "DATA_LOSS",
        Code::Unauthenticated => "UNAUTHENTICATED",
    }
}
