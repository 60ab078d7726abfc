//! gRPC service implementation and call coordination.
//!
//! ## Structure
//!
//! - [`handler`] - gRPC service entry point (`IdentityHandler`).
//! - [`deadline`] - Caller deadline (`grpc-timeout`) propagation.
//! - [`tracker`] - In-flight call accounting for graceful shutdown.

pub mod deadline;
pub mod handler;
pub mod tracker;

use crate::server::auth::interceptor::AuthInterceptor;
use handler::IdentityHandler;
use identity_tonic_core::proto::identity_service_server::IdentityServiceServer;
use tonic::{codec::CompressionEncoding, service::interceptor::InterceptedService};

pub type IdentityServer = IdentityServiceServer<IdentityHandler>;

/// Wraps `handler` into the generated server with compression enabled and
/// `interceptor` in front of every call.
pub fn build_identity_service(
    handler: IdentityHandler,
    interceptor: AuthInterceptor,
) -> InterceptedService<IdentityServer, AuthInterceptor> {
    let server = IdentityServiceServer::new(handler)
        .send_compressed(CompressionEncoding::Zstd)
        .send_compressed(CompressionEncoding::Gzip)
        .send_compressed(CompressionEncoding::Deflate)
        .accept_compressed(CompressionEncoding::Zstd)
        .accept_compressed(CompressionEncoding::Gzip)
        .accept_compressed(CompressionEncoding::Deflate);
    InterceptedService::new(server, interceptor)
}
