// The echo service is described by hand so that building needs no `protoc`.
// Generated code expects `crate::Text` as the message type.
fn main() {
    let echo_service = tonic_build::manual::Service::builder()
        .name("Echo")
        .package("echo")
        .method(
            tonic_build::manual::Method::builder()
                .name("say")
                .route_name("Say")
                .input_type("crate::Text")
                .output_type("crate::Text")
                .codec_path("tonic_prost::ProstCodec")
                .build(),
        )
        .build();

    tonic_build::manual::Builder::new().compile(&[echo_service]);
}
