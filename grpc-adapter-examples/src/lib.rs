//! Echo service used by the example binaries and the integration tests.
//!
//! `echo.Echo/Say` returns its `Text` request unchanged.

use prost_types::field_descriptor_proto::{Label, Type};
use prost_types::{
    DescriptorProto, FieldDescriptorProto, FileDescriptorProto, FileDescriptorSet,
    MethodDescriptorProto, ServiceDescriptorProto,
};
use tonic::{Request, Response, Status};

/// Generated client and server (see build.rs).
pub mod echo {
    include!(concat!(env!("OUT_DIR"), "/echo.Echo.rs"));
}

pub use echo::echo_client::EchoClient;
pub use echo::echo_server::{Echo, EchoServer};

grpc_adapter::service_handler!(EchoServer<T: Echo>);

/// Address the echo server binds when `ECHO_ADDR` is unset.
pub const DEFAULT_SERVER_ADDR: &str = "0.0.0.0:50051";

/// Target the echo client dials when `ECHO_TARGET` is unset.
pub const DEFAULT_CLIENT_TARGET: &str = "localhost:50051";

/// `echo.Text`
#[derive(Clone, PartialEq, prost::Message)]
pub struct Text {
    #[prost(string, tag = "1")]
    pub value: String,
}

/// Echoes every request back.
#[derive(Clone, Debug, Default)]
pub struct EchoService;

#[tonic::async_trait]
impl Echo for EchoService {
    async fn say(&self, request: Request<Text>) -> Result<Response<Text>, Status> {
        let text = request.into_inner();
        tracing::debug!(value = %text.value, "echo");
        Ok(Response::new(text))
    }
}

/// Descriptor of `echo.proto`, served through reflection.
pub fn file_descriptor_set() -> FileDescriptorSet {
    let text = DescriptorProto {
        name: Some("Text".into()),
        field: vec![FieldDescriptorProto {
            name: Some("value".into()),
            number: Some(1),
            label: Some(Label::Optional as i32),
            r#type: Some(Type::String as i32),
            json_name: Some("value".into()),
            ..Default::default()
        }],
        ..Default::default()
    };

    let echo = ServiceDescriptorProto {
        name: Some("Echo".into()),
        method: vec![MethodDescriptorProto {
            name: Some("Say".into()),
            input_type: Some(".echo.Text".into()),
            output_type: Some(".echo.Text".into()),
            ..Default::default()
        }],
        ..Default::default()
    };

    FileDescriptorSet {
        file: vec![FileDescriptorProto {
            name: Some("echo.proto".into()),
            package: Some("echo".into()),
            message_type: vec![text],
            service: vec![echo],
            syntax: Some("proto3".into()),
            ..Default::default()
        }],
    }
}

/// Bind address for the echo server, from `ECHO_ADDR`.
///
/// ```ignore
/// let options = ServerOptions::new(grpc_adapter_examples::server_addr());
/// ```
pub fn server_addr() -> String {
    std::env::var("ECHO_ADDR").unwrap_or_else(|_| DEFAULT_SERVER_ADDR.into())
}

/// Target for the echo client, from `ECHO_TARGET`.
pub fn client_target() -> String {
    std::env::var("ECHO_TARGET").unwrap_or_else(|_| DEFAULT_CLIENT_TARGET.into())
}
