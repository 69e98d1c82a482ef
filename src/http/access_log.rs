//! Per-request access logging.
//!
//! [`AccessLogLayer`] wraps the router and, once the handler has produced its
//! response, emits exactly one event on the [`ACCESS_TARGET`] target with the
//! final status and body size. The response itself passes through untouched.
//! Where those lines end up (stdout or a file) is decided by the subscriber,
//! see `observability::logging`.

use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use axum::body::HttpBody;
use axum::extract::ConnectInfo;
use axum::http::{Extensions, Request, Response};
use tower::{Layer, Service};

use crate::http::handlers::OperationLabel;
use crate::net::PeerAddr;
use crate::observability::metrics;

/// Tracing target carrying access log lines.
pub const ACCESS_TARGET: &str = "cellgate::access";

/// One completed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessRecord {
    pub remote_addr: Option<SocketAddr>,
    pub method: String,
    pub uri: String,
    pub protocol: String,
    pub status: u16,
    pub bytes: u64,
    pub elapsed: Duration,
}

impl AccessRecord {
    /// Whole milliseconds, truncated.
    pub fn elapsed_millis(&self) -> u128 {
        self.elapsed.as_millis()
    }
}

impl fmt::Display for AccessRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.remote_addr {
            Some(addr) => write!(f, "({})", addr)?,
            None => write!(f, "(-)")?,
        }
        write!(
            f,
            " \"{} {} {}\" {} {} {}",
            self.method,
            self.uri,
            self.protocol,
            self.status,
            self.bytes,
            self.elapsed_millis()
        )
    }
}

/// Remote address from whichever connect info the server attached.
fn peer_addr(extensions: &Extensions) -> Option<SocketAddr> {
    extensions
        .get::<ConnectInfo<PeerAddr>>()
        .map(|ConnectInfo(PeerAddr(addr))| *addr)
        .or_else(|| {
            extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| *addr)
        })
}

/// Layer that wraps services with access logging.
#[derive(Debug, Clone, Copy, Default)]
pub struct AccessLogLayer;

impl AccessLogLayer {
    pub fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for AccessLogLayer {
    type Service = AccessLogService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AccessLogService { inner }
    }
}

/// Service that logs every completed request.
#[derive(Debug, Clone)]
pub struct AccessLogService<S> {
    inner: S,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for AccessLogService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
    S::Future: Send + 'static,
    ResBody: HttpBody,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<ReqBody>) -> Self::Future {
        let start = Instant::now();
        let remote_addr = peer_addr(request.extensions());
        let method = request.method().to_string();
        let uri = request.uri().to_string();
        let protocol = format!("{:?}", request.version());

        let future = self.inner.call(request);

        Box::pin(async move {
            let response = future.await?;

            let hint = response.body().size_hint();
            let record = AccessRecord {
                remote_addr,
                method,
                uri,
                protocol,
                status: response.status().as_u16(),
                bytes: hint.exact().unwrap_or_else(|| hint.lower()),
                elapsed: start.elapsed(),
            };

            tracing::info!(target: ACCESS_TARGET, "{}", record);

            let op = response
                .extensions()
                .get::<OperationLabel>()
                .map_or("none", |label| label.0);
            metrics::record_request(&record.method, record.status, op, start);

            Ok(response)
        })
    }
}
