//! Echo server
//!
//! Serves `echo.Echo` with health checking and reflection enabled.
//!
//! Run with: cargo run --bin echo-server
//! Bind elsewhere with: ECHO_ADDR=127.0.0.1:6000 cargo run --bin echo-server
//! Test with:
//!   grpcurl -plaintext -d '{"value": "hi"}' localhost:50051 echo.Echo/Say
//!   grpcurl -plaintext localhost:50051 grpc.health.v1.Health/Check

use anyhow::Context;
use grpc_adapter::{Server, ServerOptions};
use grpc_adapter_examples::{EchoServer, EchoService, file_descriptor_set, server_addr};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let options = ServerOptions {
        address: server_addr(),
        enable_reflection: true,
        enable_health: true,
        ..Default::default()
    };

    let mut server = Server::new(options);
    server
        .add_service(EchoServer::new(EchoService))
        .add_file_descriptor_set(file_descriptor_set());
    server.start().await.context("failed to start server")?;

    if let Some(addr) = server.local_addr() {
        println!("Server listening on {addr}");
    }

    let shutdown = server.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("received Ctrl-C, shutting down");
            shutdown.shutdown();
        }
    });

    server.wait().await;
    Ok(())
}
