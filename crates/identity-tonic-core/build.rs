/// Builds the gRPC client and server code for the `identity.proto` definition
/// using `tonic-prost-build`.
///
/// The Protocol Buffer definitions located in the `proto` directory are
/// compiled into Rust modules with gRPC bindings in the crate's `OUT_DIR`. A
/// file descriptor set is emitted next to them so the server can expose gRPC
/// reflection.
///
/// # Files and Paths
///
/// - Proto file: `proto/identity.proto`
/// - Includes: `proto/`
/// - Descriptor: `$OUT_DIR/identity_descriptor.bin`
///
/// # Panics
///
/// Panics if code generation fails, which aborts the build with the
/// `protoc` diagnostics.
///
/// # Output
///
/// Generated code is exposed through:
///
/// ```rust,ignore
/// pub mod proto {
///     tonic::include_proto!("identity");
/// }
/// ```
use std::env;
use std::path::PathBuf;

fn main() {
    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());
    let descriptor_path = out_dir.join("identity_descriptor.bin");

    let mut config = tonic_prost_build::Config::new();
    config.file_descriptor_set_path(&descriptor_path);

    println!("cargo:rerun-if-changed=proto/identity.proto");

    tonic_prost_build::configure()
        .compile_with_config(config, &["proto/identity.proto"], &["proto"])
        .unwrap();
}
