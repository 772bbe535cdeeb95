//! Listener configurator for tonic gRPC servers.
//!
//! A [`Server`] collects services, then binds one address and serves them
//! together with the standard sub-services:
//!
//! - `grpc.health.v1.Health` (feature `health`), reporting every registered
//!   service as `SERVING` while running;
//! - `grpc.reflection.v1` and `v1alpha` (feature `reflection`), describing the
//!   file descriptor sets handed to the server.
//!
//! Message size caps from [`ServerOptions`] are applied to each service
//! through [`ServiceHandler`], implemented for generated servers with
//! [`service_handler!`].
//!
//! ```rust,ignore
//! use grpc_adapter::{Server, ServerOptions};
//!
//! grpc_adapter::service_handler!(EchoServer<T: Echo>);
//!
//! let mut server = Server::new(ServerOptions::default());
//! server.add_service(EchoServer::new(EchoService::default()));
//! server.start().await?;
//! server.wait().await;
//! ```
//!
//! Unlike process-wide plugin registries, health and reflection are built
//! per server in [`Server::start`], so several servers may run in one
//! process.

mod error;
mod limits;
mod options;
mod server;

pub use error::StartError;
pub use limits::{DEFAULT_MAX_DECODING_MESSAGE_SIZE, MessageLimits, ServiceHandler};
pub use options::{DEFAULT_ADDRESS, ServerOptions};
pub use server::{Server, ShutdownHandle};

#[cfg(feature = "health")]
pub use tonic_health;
#[cfg(feature = "reflection")]
pub use tonic_reflection;
