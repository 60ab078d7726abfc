//! gRPC service implementation for identity resolution.
//!
//! This module defines [`IdentityHandler`], the concrete implementation of the
//! [`IdentityService`] gRPC service defined in the protobuf schema. It serves
//! the unary `UserInfo` endpoint by handing the call's [`IdentityContext`] to
//! the configured [`IdentityResolver`].
//!
//! ## Responsibilities
//!
//! - Pick up the `IdentityContext` attached by the auth interceptor.
//! - Bound every lookup by the caller's deadline and the server timeout.
//! - Refuse calls once shutdown has begun and let running calls drain.
//! - Translate resolver errors into gRPC status codes.

use super::{deadline::call_deadline, tracker::CallTracker};
use crate::server::telemetry::{increment_errors, increment_requests, record_call_duration};
use core::time::Duration;
use identity_tonic_core::{
    Error, IdentityContext, IdentityResolver,
    proto::{UserInfoRequest, UserInfoResponse, identity_service_server::IdentityService},
};
use std::sync::Arc;
use tokio::time::timeout_at;
use tonic::{Request, Response, Status};

/// Stateless gRPC front of an [`IdentityResolver`].
///
/// Cloning is cheap: clones share the resolver and the call tracker.
#[derive(Clone)]
pub struct IdentityHandler {
    resolver: Arc<dyn IdentityResolver>,
    resolve_timeout: Duration,
    tracker: Arc<CallTracker>,
}

impl IdentityHandler {
    pub fn new(resolver: Arc<dyn IdentityResolver>, resolve_timeout: Duration) -> Self {
        Self {
            resolver,
            resolve_timeout,
            tracker: Arc::new(CallTracker::new()),
        }
    }

    /// Refuses new calls and waits up to `drain_timeout` for running ones.
    pub async fn shutdown(&self, drain_timeout: Duration) -> Result<(), Error> {
        let remaining = self.tracker.shutdown(drain_timeout).await;
        if remaining > 0 {
            return Err(Error::unavailable(format!(
                "{remaining} calls still running after drain"
            )));
        }
        Ok(())
    }

    async fn resolve(&self, mut req: Request<UserInfoRequest>) -> Result<UserInfoResponse, Error> {
        let _guard = self.tracker.enter()?;

        let deadline = call_deadline(&req, self.resolve_timeout);
        let context = req
            .extensions_mut()
            .remove::<IdentityContext>()
            .unwrap_or_default();

        let record = timeout_at(deadline, self.resolver.resolve(&context))
            .await
            .map_err(|_| Error::unavailable("identity lookup exceeded the call deadline"))??;

        #[cfg(feature = "tracing")]
        tracing::Span::current().record("subject", record.subject());

        Ok(record.into())
    }
}

#[tonic::async_trait]
impl IdentityService for IdentityHandler {
    /// Resolves the identity of the caller.
    ///
    /// If `tracing` is enabled, a span is instrumented per call and records
    /// the resolved subject.
    ///
    /// If `metrics` is enabled, emits telemetry for:
    /// - request rate
    /// - concurrent call count
    /// - call duration
    /// - call errors
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, fields(subject = tracing::field::Empty)))]
    async fn user_info(
        &self,
        req: Request<UserInfoRequest>,
    ) -> Result<Response<UserInfoResponse>, Status> {
        let start = std::time::Instant::now();
        increment_requests();

        let result = self.resolve(req).await;
        record_call_duration(start.elapsed().as_secs_f64() * 1000.0);

        match result {
            Ok(resp) => Ok(Response::new(resp)),
            Err(e) => {
                increment_errors();
                #[cfg(feature = "tracing")]
                tracing::warn!("UserInfo failed: {e}");
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::{
        auth::{
            interceptor::AuthInterceptor,
            jwt::{
                JwtValidator,
                tests::{SECRET, create_test_token, hs256_config, now},
            },
        },
        config::CacheConfig,
        resolver::{
            cache::CachingResolver,
            claims::ClaimsResolver,
            userinfo::{
                UserinfoResolver,
                tests::{spawn_userinfo_stub, unreachable_endpoint},
            },
        },
        service::{build_identity_service, deadline::DeadlineLayer},
    };
    use identity_tonic_core::{
        ClaimMapping, Result as IdentityResult, UnimplementedResolver, UserInfoRecord,
        proto::identity_service_client::IdentityServiceClient,
    };
    use serde_json::json;
    use tokio::net::TcpListener;
    use tokio_stream::wrappers::TcpListenerStream;
    use tonic::{
        Code,
        transport::{Channel, Server},
    };

    /// Serves `handler` behind `interceptor` on an ephemeral port.
    async fn serve(
        handler: IdentityHandler,
        interceptor: AuthInterceptor,
    ) -> IdentityServiceClient<Channel> {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            Server::builder()
                .layer(DeadlineLayer)
                .add_service(build_identity_service(handler, interceptor))
                .serve_with_incoming(TcpListenerStream::new(listener))
                .await
                .unwrap();
        });
        IdentityServiceClient::connect(format!("http://{addr}"))
            .await
            .unwrap()
    }

    fn with_token(token: &str) -> Request<UserInfoRequest> {
        let mut req = Request::new(UserInfoRequest {});
        req.metadata_mut()
            .insert("authorization", format!("Bearer {token}").parse().unwrap());
        req
    }

    fn jwt_token(subject: &str, groups: &[&str]) -> String {
        create_test_token(
            &json!({ "sub": subject, "groups": groups, "exp": now() + 600 }),
            SECRET,
        )
    }

    async fn jwt_client() -> IdentityServiceClient<Channel> {
        let handler = IdentityHandler::new(
            Arc::new(ClaimsResolver::new(ClaimMapping::default())),
            Duration::from_secs(5),
        );
        let interceptor =
            AuthInterceptor::with_validator(JwtValidator::new(&hs256_config()).unwrap());
        serve(handler, interceptor).await
    }

    /// Never answers before `delay` elapses.
    struct SlowResolver {
        delay: Duration,
    }

    #[tonic::async_trait]
    impl IdentityResolver for SlowResolver {
        async fn resolve(&self, _context: &IdentityContext) -> IdentityResult<UserInfoRecord> {
            tokio::time::sleep(self.delay).await;
            UserInfoRecord::new("too-late")
        }
    }

    #[tokio::test]
    async fn resolves_alice_with_groups() {
        let mut client = jwt_client().await;

        let resp = client
            .user_info(with_token(&jwt_token("alice@example.com", &["eng", "admin"])))
            .await
            .unwrap()
            .into_inner();

        assert_eq!(resp.subject, "alice@example.com");
        assert_eq!(resp.groups, vec!["eng", "admin"]);
        assert_eq!(resp.name, None);
        assert_eq!(resp.email, None);
    }

    #[tokio::test]
    async fn missing_or_invalid_credentials_are_unauthenticated() {
        let mut client = jwt_client().await;

        let status = client
            .user_info(Request::new(UserInfoRequest {}))
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::Unauthenticated);

        let status = client.user_info(with_token("garbage")).await.unwrap_err();
        assert_eq!(status.code(), Code::Unauthenticated);

        let expired = create_test_token(&json!({ "sub": "alice", "exp": now() - 600 }), SECRET);
        let status = client.user_info(with_token(&expired)).await.unwrap_err();
        assert_eq!(status.code(), Code::Unauthenticated);
    }

    #[tokio::test]
    async fn unconfigured_service_is_unimplemented_for_every_input() {
        let handler = IdentityHandler::new(Arc::new(UnimplementedResolver), Duration::from_secs(5));
        let mut client = serve(handler, AuthInterceptor::passthrough()).await;

        let mut basic = Request::new(UserInfoRequest {});
        basic
            .metadata_mut()
            .insert("authorization", "Basic Zm9vOmJhcg==".parse().unwrap());

        for req in [
            Request::new(UserInfoRequest {}),
            with_token("garbage"),
            with_token(&jwt_token("alice@example.com", &[])),
            basic,
        ] {
            let status = client.user_info(req).await.unwrap_err();
            assert_eq!(status.code(), Code::Unimplemented);
        }
    }

    #[tokio::test]
    async fn concurrent_calls_never_interfere() {
        let client = jwt_client().await;

        let calls = (0..32).map(|i| {
            let mut client = client.clone();
            async move {
                let subject = format!("user-{i}@example.com");
                let group = format!("team-{i}");
                let resp = client
                    .user_info(with_token(&jwt_token(&subject, &[group.as_str()])))
                    .await
                    .unwrap()
                    .into_inner();
                (subject, group, resp)
            }
        });

        for (subject, group, resp) in futures::future::join_all(calls).await {
            assert_eq!(resp.subject, subject);
            assert_eq!(resp.groups, vec![group]);
        }
    }

    #[tokio::test]
    async fn upstream_identity_flows_through_the_rpc() {
        let resolver = CachingResolver::new(
            UserinfoResolver::new(
                spawn_userinfo_stub().await,
                ClaimMapping::default(),
                Duration::from_secs(2),
            )
            .unwrap(),
            CacheConfig {
                ttl: Duration::from_secs(60),
                capacity: 16,
            },
        );
        let handler = IdentityHandler::new(Arc::new(resolver), Duration::from_secs(5));
        let mut client = serve(handler, AuthInterceptor::passthrough()).await;

        let resp = client
            .user_info(with_token("alice-token"))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(resp.subject, "alice@example.com");
        assert_eq!(resp.email.as_deref(), Some("alice@example.com"));
        assert_eq!(resp.groups, vec!["eng", "admin"]);

        let status = client.user_info(with_token("unknown")).await.unwrap_err();
        assert_eq!(status.code(), Code::Unauthenticated);

        let status = client.user_info(with_token("broken-token")).await.unwrap_err();
        assert_eq!(status.code(), Code::Unavailable);
    }

    #[tokio::test]
    async fn unreachable_upstream_is_unavailable() {
        let resolver = UserinfoResolver::new(
            unreachable_endpoint().await,
            ClaimMapping::default(),
            Duration::from_secs(2),
        )
        .unwrap();
        let handler = IdentityHandler::new(Arc::new(resolver), Duration::from_secs(5));
        let mut client = serve(handler, AuthInterceptor::passthrough()).await;

        for token in ["alice-token", "anything"] {
            let status = client.user_info(with_token(token)).await.unwrap_err();
            assert_eq!(status.code(), Code::Unavailable);
        }
    }

    #[tokio::test]
    async fn exceeding_the_deadline_is_unavailable() {
        let handler = IdentityHandler::new(
            Arc::new(SlowResolver {
                delay: Duration::from_secs(10),
            }),
            Duration::from_millis(100),
        );
        let mut client = serve(handler, AuthInterceptor::passthrough()).await;

        let status = client.user_info(with_token("any")).await.unwrap_err();
        assert_eq!(status.code(), Code::Unavailable);
    }

    #[tokio::test]
    async fn exceeding_the_caller_deadline_is_unavailable() {
        let handler = IdentityHandler::new(
            Arc::new(SlowResolver {
                delay: Duration::from_secs(10),
            }),
            Duration::from_secs(5),
        );
        let mut client = serve(handler, AuthInterceptor::passthrough()).await;

        let mut req = with_token("any");
        req.set_timeout(Duration::from_millis(200));
        let status = client.user_info(req).await.unwrap_err();
        assert_eq!(status.code(), Code::Unavailable);
    }

    #[tokio::test]
    async fn caller_deadline_longer_than_the_lookup_succeeds() {
        let handler = IdentityHandler::new(
            Arc::new(SlowResolver {
                delay: Duration::from_millis(50),
            }),
            Duration::from_secs(5),
        );
        let mut client = serve(handler, AuthInterceptor::passthrough()).await;

        let mut req = with_token("any");
        req.set_timeout(Duration::from_secs(2));
        let resp = client.user_info(req).await.unwrap().into_inner();
        assert_eq!(resp.subject, "too-late");
    }

    #[tokio::test]
    async fn shutdown_refuses_new_calls() {
        let handler = IdentityHandler::new(
            Arc::new(ClaimsResolver::default()),
            Duration::from_secs(5),
        );
        handler.shutdown(Duration::from_millis(10)).await.unwrap();

        let status = handler
            .user_info(Request::new(UserInfoRequest {}))
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::Unavailable);
    }

    #[tokio::test]
    async fn calls_without_interceptor_are_anonymous() {
        let handler = IdentityHandler::new(
            Arc::new(ClaimsResolver::default()),
            Duration::from_secs(5),
        );

        let status = handler
            .user_info(Request::new(UserInfoRequest {}))
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::Unauthenticated);
    }
}
