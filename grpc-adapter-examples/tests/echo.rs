//! End-to-end tests: a real echo server on an ephemeral port and a client
//! built by the connection configurator.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use grpc_adapter::{Server, ServerOptions, StartError};
use grpc_adapter_client::{Client, ClientOptions, Code, Metadata};
use grpc_adapter_examples::{Echo, EchoClient, EchoServer, EchoService, Text, file_descriptor_set};
use tokio_stream::StreamExt;
use tonic::{Request, Response, Status};
use tonic_health::pb::health_check_response::ServingStatus;
use tonic_health::pb::health_client::HealthClient;
use tonic_health::pb::HealthCheckRequest;
use tonic_reflection::pb::v1::server_reflection_client::ServerReflectionClient;
use tonic_reflection::pb::v1::server_reflection_request::MessageRequest;
use tonic_reflection::pb::v1::server_reflection_response::MessageResponse;
use tonic_reflection::pb::v1::ServerReflectionRequest;

const READY: Duration = Duration::from_secs(5);

fn local_options() -> ServerOptions {
    ServerOptions::new("127.0.0.1:0")
}

async fn start<E: Echo>(options: ServerOptions, echo: E) -> anyhow::Result<(Server, String)> {
    let mut server = Server::new(options);
    server
        .add_service(EchoServer::new(echo))
        .add_file_descriptor_set(file_descriptor_set());
    server.start().await?;

    let addr = server
        .local_addr()
        .ok_or_else(|| anyhow::anyhow!("server has no local address"))?;
    Ok((server, addr.to_string()))
}

async fn connect(options: ClientOptions) -> anyhow::Result<Client> {
    let client = Client::new(options)?;
    client.wait_for_ready(READY).await?;
    Ok(client)
}

/// Fails with UNAVAILABLE until `failures` calls have been made.
#[derive(Clone, Default)]
struct FlakyEcho {
    calls: Arc<AtomicU32>,
    failures: u32,
}

#[tonic::async_trait]
impl Echo for FlakyEcho {
    async fn say(&self, request: Request<Text>) -> Result<Response<Text>, Status> {
        if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
            return Err(Status::unavailable("warming up"));
        }
        Ok(Response::new(request.into_inner()))
    }
}

/// Replies with every `x-tenant` value of the request, comma separated.
struct TenantEcho;

#[tonic::async_trait]
impl Echo for TenantEcho {
    async fn say(&self, request: Request<Text>) -> Result<Response<Text>, Status> {
        let tenants: Vec<_> = request
            .metadata()
            .get_all("x-tenant")
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect();
        Ok(Response::new(Text {
            value: tenants.join(","),
        }))
    }
}

#[tokio::test]
async fn test_echo_round_trip() -> anyhow::Result<()> {
    let (server, target) = start(local_options(), EchoService).await?;
    let client = connect(ClientOptions::new(target)).await?;

    let mut stub = EchoClient::new(client.channel());
    let reply = stub
        .say(client.context().request(Text {
            value: "hello".into(),
        }))
        .await?;
    assert_eq!(reply.into_inner().value, "hello");

    server.shutdown();
    server.wait().await;
    Ok(())
}

#[tokio::test]
async fn test_default_metadata_reaches_server() -> anyhow::Result<()> {
    let (server, target) = start(local_options(), TenantEcho).await?;
    let client = connect(ClientOptions {
        default_metadata: Metadata::from_pairs([("x-tenant", "blue"), ("x-tenant", "green")])?,
        ..ClientOptions::new(target)
    })
    .await?;
    let stub = EchoClient::new(client.channel());

    let call = |ctx: grpc_adapter_client::CallContext| {
        let mut stub = stub.clone();
        async move { stub.say(ctx.request(Text::default())).await }
    };

    let reply = client.invoke(Duration::ZERO, call).await?;
    assert_eq!(reply.into_inner().value, "blue,green");

    client.set_default_metadata(Metadata::from_pairs([("x-tenant", "red")])?);
    let reply = client.invoke(Duration::ZERO, call).await?;
    assert_eq!(reply.into_inner().value, "red");

    server.shutdown();
    Ok(())
}

#[tokio::test]
async fn test_invoke_retries_until_success() -> anyhow::Result<()> {
    let echo = FlakyEcho {
        failures: 2,
        ..Default::default()
    };
    let calls = echo.calls.clone();
    let (server, target) = start(local_options(), echo).await?;
    let client = connect(ClientOptions {
        initial_backoff_ms: 1,
        max_backoff_ms: 10,
        ..ClientOptions::new(target)
    })
    .await?;
    let stub = EchoClient::new(client.channel());

    let reply = client
        .invoke(Duration::from_secs(5), |ctx| {
            let mut stub = stub.clone();
            async move {
                stub.say(ctx.request(Text {
                    value: "third time".into(),
                }))
                .await
            }
        })
        .await?;

    assert_eq!(reply.into_inner().value, "third time");
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    server.shutdown();
    Ok(())
}

#[tokio::test]
async fn test_invoke_without_retries_fails_fast() -> anyhow::Result<()> {
    let echo = FlakyEcho {
        failures: 1,
        ..Default::default()
    };
    let calls = echo.calls.clone();
    let (server, target) = start(local_options(), echo).await?;
    let client = connect(ClientOptions {
        enable_retries: false,
        ..ClientOptions::new(target)
    })
    .await?;
    let stub = EchoClient::new(client.channel());

    let status = client
        .invoke(Duration::from_secs(5), |ctx| {
            let mut stub = stub.clone();
            async move { stub.say(ctx.request(Text::default())).await }
        })
        .await
        .unwrap_err();

    assert_eq!(status.code(), Code::Unavailable);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    server.shutdown();
    Ok(())
}

#[tokio::test]
async fn test_health_reports_serving() -> anyhow::Result<()> {
    let (server, target) = start(local_options(), EchoService).await?;
    let client = connect(ClientOptions::new(target)).await?;
    let mut health = HealthClient::new(client.channel());

    for service in ["", "echo.Echo"] {
        let reply = health
            .check(HealthCheckRequest {
                service: service.into(),
            })
            .await?;
        assert_eq!(reply.into_inner().status(), ServingStatus::Serving);
    }

    let status = health
        .check(HealthCheckRequest {
            service: "unknown.Service".into(),
        })
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::NotFound);

    server.shutdown();
    Ok(())
}

#[tokio::test]
async fn test_health_not_serving_on_shutdown() -> anyhow::Result<()> {
    let (server, target) = start(local_options(), EchoService).await?;
    let client = connect(ClientOptions::new(target)).await?;
    let mut health = HealthClient::new(client.channel());

    let mut updates = health
        .watch(HealthCheckRequest {
            service: String::new(),
        })
        .await?
        .into_inner();
    let first = tokio::time::timeout(READY, updates.next())
        .await?
        .ok_or_else(|| anyhow::anyhow!("health watch ended early"))??;
    assert_eq!(first.status(), ServingStatus::Serving);

    server.shutdown();
    let next = tokio::time::timeout(READY, updates.next())
        .await?
        .ok_or_else(|| anyhow::anyhow!("health watch ended before shutdown status"))??;
    assert_eq!(next.status(), ServingStatus::NotServing);

    drop(updates);
    tokio::time::timeout(READY, server.wait()).await?;
    Ok(())
}

#[tokio::test]
async fn test_health_disabled() -> anyhow::Result<()> {
    let options = ServerOptions {
        enable_health: false,
        ..local_options()
    };
    let (server, target) = start(options, EchoService).await?;
    let client = connect(ClientOptions::new(target)).await?;
    let mut health = HealthClient::new(client.channel());

    let status = health
        .check(HealthCheckRequest {
            service: String::new(),
        })
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::Unimplemented);

    server.shutdown();
    Ok(())
}

#[tokio::test]
async fn test_reflection_lists_services() -> anyhow::Result<()> {
    let (server, target) = start(local_options(), EchoService).await?;
    let client = connect(ClientOptions::new(target)).await?;
    let mut reflection = ServerReflectionClient::new(client.channel());

    let request = ServerReflectionRequest {
        host: String::new(),
        message_request: Some(MessageRequest::ListServices(String::new())),
    };
    let mut responses = reflection
        .server_reflection_info(tokio_stream::iter(vec![request]))
        .await?
        .into_inner();

    let response = responses
        .next()
        .await
        .ok_or_else(|| anyhow::anyhow!("no reflection response"))??;
    let Some(MessageResponse::ListServicesResponse(list)) = response.message_response else {
        anyhow::bail!("unexpected reflection response");
    };
    let names: Vec<_> = list.service.into_iter().map(|s| s.name).collect();
    assert!(names.contains(&"echo.Echo".to_string()), "{names:?}");
    assert!(names.contains(&"grpc.health.v1.Health".to_string()), "{names:?}");

    server.shutdown();
    Ok(())
}

#[tokio::test]
async fn test_max_receive_message_size() -> anyhow::Result<()> {
    let options = ServerOptions {
        max_receive_message_size: 16,
        ..local_options()
    };
    let (server, target) = start(options, EchoService).await?;
    let client = connect(ClientOptions::new(target)).await?;
    let mut stub = EchoClient::new(client.channel());

    let small = stub
        .say(client.context().request(Text { value: "ok".into() }))
        .await?;
    assert_eq!(small.into_inner().value, "ok");

    let status = stub
        .say(client.context().request(Text {
            value: "x".repeat(1024),
        }))
        .await
        .unwrap_err();
    assert!(
        matches!(status.code(), Code::OutOfRange | Code::ResourceExhausted),
        "{status:?}"
    );

    server.shutdown();
    Ok(())
}

#[tokio::test]
async fn test_duplicate_service_fails_start() {
    let mut server = Server::new(local_options());
    server
        .add_service(EchoServer::new(EchoService))
        .add_service(EchoServer::new(EchoService));

    let err = server.start().await.unwrap_err();
    assert!(matches!(err, StartError::Registration { ref service } if service == "echo.Echo"));
    assert!(!server.is_running());
}

#[tokio::test]
async fn test_bind_conflict() -> anyhow::Result<()> {
    let (first, target) = start(local_options(), EchoService).await?;

    let mut second = Server::new(ServerOptions::new(target.clone()));
    second.add_service(EchoServer::new(EchoService));
    let err = second.start().await.unwrap_err();
    assert!(matches!(err, StartError::Bind { .. }));
    assert!(!second.is_running());
    tokio::time::timeout(Duration::from_millis(100), second.wait()).await?;

    // The first server keeps serving.
    let client = connect(ClientOptions::new(target)).await?;
    let mut stub = EchoClient::new(client.channel());
    let reply = stub
        .say(client.context().request(Text { value: "still here".into() }))
        .await?;
    assert_eq!(reply.into_inner().value, "still here");

    first.shutdown();
    Ok(())
}

#[tokio::test]
async fn test_shutdown_stops_serving() -> anyhow::Result<()> {
    let (server, target) = start(local_options(), EchoService).await?;
    let client = connect(ClientOptions::new(target.clone())).await?;
    assert!(server.is_running());

    server.shutdown_handle().shutdown();
    tokio::time::timeout(READY, server.wait()).await?;
    assert!(server.is_running());
    drop(client);

    let fresh = Client::new(ClientOptions::new(target))?;
    let status = fresh
        .wait_for_ready(Duration::from_millis(300))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::Unavailable);
    Ok(())
}

#[tokio::test]
async fn test_dropping_server_stops_serving() -> anyhow::Result<()> {
    let (server, target) = start(local_options(), EchoService).await?;
    drop(server);

    let client = Client::new(ClientOptions::new(target))?;
    let stopped = tokio::time::timeout(READY, async {
        while client
            .wait_for_ready(Duration::from_millis(100))
            .await
            .is_ok()
        {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await;
    assert!(stopped.is_ok(), "server still accepting connections after drop");
    Ok(())
}
