//! Call deadline propagation.
//!
//! Callers announce their deadline with the `grpc-timeout` header: at most
//! eight ASCII digits followed by a unit (`H`, `M`, `S`, `m`, `u`, `n`). The
//! identity lookup never runs longer than that, nor longer than the server's
//! own resolve timeout.
//!
//! Both tonic's server and client arm their own timer from the same header and
//! answer `CANCELLED` when it fires. [`DeadlineLayer`] anchors the caller's
//! deadline as soon as the request reaches the router, and the handler gives
//! up [`REPLY_MARGIN`] before it so the `UNAVAILABLE` status still reaches the
//! caller.

use core::{
    task::{Context, Poll},
    time::Duration,
};
use tokio::time::Instant;
use tonic::{Request, codegen::http};
use tower::{Layer, Service};

const GRPC_TIMEOUT: &str = "grpc-timeout";
const MAX_TIMEOUT_DIGITS: usize = 8;

/// Time reserved to send the reply before the caller's deadline.
pub const REPLY_MARGIN: Duration = Duration::from_millis(25);

/// Parses the caller's `grpc-timeout`, ignoring malformed values.
pub fn grpc_timeout(headers: &http::HeaderMap) -> Option<Duration> {
    let raw = headers.get(GRPC_TIMEOUT)?.to_str().ok()?;
    if raw.len() < 2 || raw.len() > MAX_TIMEOUT_DIGITS + 1 || !raw.is_ascii() {
        return None;
    }
    let (digits, unit) = raw.split_at(raw.len() - 1);
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let value: u64 = digits.parse().ok()?;

    let timeout = match unit {
        "H" => Duration::from_secs(value * 60 * 60),
        "M" => Duration::from_secs(value * 60),
        "S" => Duration::from_secs(value),
        "m" => Duration::from_millis(value),
        "u" => Duration::from_micros(value),
        "n" => Duration::from_nanos(value),
        _ => return None,
    };
    Some(timeout)
}

/// Instant by which the reply to the caller must be on its way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallDeadline(Instant);

impl CallDeadline {
    /// Deadline announced in `headers`, counted from `received`.
    pub fn from_headers(headers: &http::HeaderMap, received: Instant) -> Option<Self> {
        grpc_timeout(headers).map(|t| Self(received + t.saturating_sub(REPLY_MARGIN)))
    }

    pub fn instant(self) -> Instant {
        self.0
    }
}

/// Instant at which the lookup of `req` gives up: the earlier of the caller's
/// deadline and `server_timeout` from now.
///
/// The deadline recorded by [`DeadlineLayer`] is preferred; without it the
/// header is read again and counted from now.
pub fn call_deadline<T>(req: &Request<T>, server_timeout: Duration) -> Instant {
    let now = Instant::now();
    let server = now + server_timeout;
    req.extensions()
        .get::<CallDeadline>()
        .copied()
        .or_else(|| CallDeadline::from_headers(req.metadata().as_ref(), now))
        .map_or(server, |caller| caller.instant().min(server))
}

/// Records the caller's [`CallDeadline`] in the request extensions.
///
/// Install it with `Server::builder().layer(..)`: the deadline is then taken
/// before tonic starts its own timer for the call.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeadlineLayer;

impl<S> Layer<S> for DeadlineLayer {
    type Service = DeadlineService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        DeadlineService { inner }
    }
}

#[derive(Debug, Clone)]
pub struct DeadlineService<S> {
    inner: S,
}

impl<S, B> Service<http::Request<B>> for DeadlineService<S>
where
    S: Service<http::Request<B>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: http::Request<B>) -> Self::Future {
        if let Some(deadline) = CallDeadline::from_headers(req.headers(), Instant::now()) {
            req.extensions_mut().insert(deadline);
        }
        self.inner.call(req)
    }
}
