//! Connection configurator for tonic gRPC clients.
//!
//! A [`Client`] turns one [`ClientOptions`] value into a ready-to-use tonic
//! [`Channel`](tonic::transport::Channel):
//!
//! - HTTP/2 keep-alive with fixed parameters;
//! - plaintext or TLS transport credentials (feature `tls`);
//! - a [`RetryPolicy`] and its [`ServiceConfig`] description when retries are enabled;
//! - per-call [`CallContext`]s carrying a deadline and default [`Metadata`].
//!
//! ```ignore
//! use grpc_adapter_client::{Client, ClientOptions};
//! use std::time::Duration;
//!
//! let client = Client::new(ClientOptions::new("localhost:50051"))?;
//! client.wait_for_ready(Duration::from_secs(5)).await?;
//!
//! let mut stub = EchoClient::new(client.channel());
//! let reply = client
//!     .invoke(Duration::from_secs(2), |ctx| {
//!         let mut stub = stub.clone();
//!         async move { stub.say(ctx.request(Text { value: "hello".into() })).await }
//!     })
//!     .await?;
//! ```

mod client;
pub mod config;
mod context;
mod error;
mod metadata;
pub mod options;

pub use client::Client;
pub use config::{ExponentialBackoff, RetryPolicy, ServiceConfig, retry_with_policy};
pub use context::{CallContext, MAX_TIMEOUT};
pub use error::{ClientBuildError, MetadataError};
pub use metadata::Metadata;
pub use options::ClientOptions;

// Re-exported so callers can build stubs and statuses without naming tonic.
pub use tonic::{Code, Status, transport::Channel};
