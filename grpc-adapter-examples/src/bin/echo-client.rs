//! Echo client
//!
//! Sends `ping #N` to the echo server every 10 seconds until Ctrl-C.
//! Each call retries transient failures within a 2 second deadline.
//!
//! Usage:
//!   # First, start the server in another terminal:
//!   cargo run --bin echo-server
//!
//!   # Then run the client (defaults to localhost:50051):
//!   cargo run --bin echo-client
//!
//!   # Or point it elsewhere:
//!   ECHO_TARGET=10.0.0.5:50051 cargo run --bin echo-client

use std::time::Duration;

use grpc_adapter_client::{Client, ClientOptions, Code};
use grpc_adapter_examples::{EchoClient, Text, client_target};

const CALL_DEADLINE: Duration = Duration::from_secs(2);
const READY_TIMEOUT: Duration = Duration::from_secs(2);
const SEND_INTERVAL: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let client = Client::new(ClientOptions {
        target: client_target(),
        default_deadline_ms: 2000,
        enable_retries: true,
        max_retry_attempts: 3,
        initial_backoff_ms: 200,
        max_backoff_ms: 2000,
        ..Default::default()
    })?;

    // Not fatal: the loop keeps trying.
    if let Err(status) = client.wait_for_ready(READY_TIMEOUT).await {
        eprintln!("[warn] Channel not ready yet: {}", status.message());
    }

    let stub = EchoClient::new(client.channel());

    println!("Starting echo loop (every 10s). Press Ctrl+C to stop.");
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut ticker = tokio::time::interval(SEND_INTERVAL);
    let mut counter = 0u64;

    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            _ = ticker.tick() => {}
        }

        let value = format!("ping #{counter}");
        counter += 1;

        let result = client
            .invoke(CALL_DEADLINE, |ctx| {
                let mut stub = stub.clone();
                let request = ctx.request(Text {
                    value: value.clone(),
                });
                async move { stub.say(request).await }
            })
            .await;

        match result {
            Ok(response) => println!("[ok] {}", response.into_inner().value),
            Err(status) => {
                eprintln!(
                    "[rpc error] code={:?} msg={}",
                    status.code(),
                    status.message()
                );
                if matches!(status.code(), Code::Unavailable | Code::DeadlineExceeded)
                    && client.wait_for_ready(READY_TIMEOUT).await.is_err()
                {
                    eprintln!("[retry] channel not ready yet.");
                }
            }
        }
    }

    println!("Exiting.");
    Ok(())
}
