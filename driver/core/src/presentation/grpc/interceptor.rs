// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Error Logging Layer
//!
//! The single interception stage installed in front of every CSI route. It
//! forwards the call untouched, then inspects the response: any non-OK gRPC
//! status is logged at error level with the method path. The response
//! itself is never altered.
//!
//! Unary calls that fail are sent as trailers-only responses, so the status
//! is already present in the response headers when the inner future
//! resolves.
//!
//! When built with a shutdown token, calls arriving after the token fires
//! are answered with `UNAVAILABLE` and never reach a handler.

use futures::future::{self, BoxFuture};
use std::task::{Context, Poll};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tonic::{Code, Status};
use tower::{Layer, Service};
use tracing::{debug, error};

#[derive(Debug, Clone, Default)]
pub struct ErrorLoggingLayer {
    shutdown: Option<CancellationToken>,
}

impl ErrorLoggingLayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse every call once `token` is cancelled
    pub fn with_shutdown(token: CancellationToken) -> Self {
        Self {
            shutdown: Some(token),
        }
    }
}

impl<S> Layer<S> for ErrorLoggingLayer {
    type Service = ErrorLogging<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ErrorLogging {
            inner,
            shutdown: self.shutdown.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ErrorLogging<S> {
    inner: S,
    shutdown: Option<CancellationToken>,
}

impl<S> ErrorLogging<S> {
    fn stopping(&self) -> bool {
        self.shutdown
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }
}

impl<S, ReqBody, ResBody> Service<http::Request<ReqBody>> for ErrorLogging<S>
where
    S: Service<http::Request<ReqBody>, Response = http::Response<ResBody>>,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
    ResBody: Default + Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: http::Request<ReqBody>) -> Self::Future {
        let method = request.uri().path().to_string();
        let started = Instant::now();
        let future: Self::Future = if self.stopping() {
            let refused = Status::unavailable("CSI driver is stopping").into_http();
            Box::pin(future::ready(Ok(refused)))
        } else {
            Box::pin(self.inner.call(request))
        };

        Box::pin(async move {
            let response = future.await?;
            let code = match response_status(response.headers()) {
                Some(status) => {
                    error!(
                        method = %method,
                        code = ?status.code(),
                        detail = status.message(),
                        "GRPC error"
                    );
                    status.code()
                }
                None => Code::Ok,
            };

            debug!(method = %method, elapsed_ms = started.elapsed().as_millis() as u64, "GRPC call");
            metrics::counter!(
                "fsx_csi_grpc_requests_total",
                "method" => method,
                "code" => format!("{:?}", code)
            )
            .increment(1);

            Ok(response)
        })
    }
}

/// Non-OK status carried in response headers, if any
fn response_status(headers: &http::HeaderMap) -> Option<Status> {
    Status::from_header_map(headers).filter(|status| status.code() != Code::Ok)
}
