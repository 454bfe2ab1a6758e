//! Dispatch instrumentation: a tracing span per call plus `metrics` counters
//! and a latency histogram.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use ::metrics::{counter, histogram};
use opencall_core::CallResponse;
use tower::{Layer, Service};
use tracing::{info_span, Instrument};

use crate::service::dispatcher::CallRequest;

pub const DISPATCH_TOTAL: &str = "opencall_dispatch_total";
pub const DISPATCH_DURATION_SECONDS: &str = "opencall_dispatch_duration_seconds";

/// Label used when the envelope carries no usable op name.
const UNNAMED_OP: &str = "<none>";

// ---------------------------------------------------------------------------
// MetricsLayer
// ---------------------------------------------------------------------------

/// Tower layer that instruments dispatches with timing and outcome.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsLayer;

impl<S> Layer<S> for MetricsLayer {
    type Service = MetricsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MetricsService { inner }
    }
}

// ---------------------------------------------------------------------------
// MetricsService
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct MetricsService<S> {
    inner: S,
}

impl<S> Service<CallRequest> for MetricsService<S>
where
    S: Service<CallRequest, Response = CallResponse> + Send,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
{
    type Response = CallResponse;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<CallResponse, S::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: CallRequest) -> Self::Future {
        let op = request
            .envelope
            .op_name()
            .unwrap_or(UNNAMED_OP)
            .to_string();
        let request_id = request.envelope.ctx.request_id.clone().unwrap_or_default();

        let span = info_span!(
            "dispatch",
            op = %op,
            request_id = %request_id,
            status = tracing::field::Empty,
            state = tracing::field::Empty,
            duration_ms = tracing::field::Empty,
        );

        let fut = self.inner.call(request);

        Box::pin(
            async move {
                let start = Instant::now();
                let result = fut.await;
                let elapsed = start.elapsed();

                if let Ok(response) = &result {
                    let status = response.status;
                    let state = response.body.state.as_str();

                    #[allow(clippy::cast_possible_truncation)]
                    let duration_ms = elapsed.as_millis() as u64;
                    let span = tracing::Span::current();
                    span.record("status", status);
                    span.record("state", state);
                    span.record("duration_ms", duration_ms);

                    tracing::info!(
                        op = %op,
                        request_id = %response.body.request_id,
                        status,
                        state,
                        duration_ms,
                        "dispatch complete"
                    );

                    counter!(DISPATCH_TOTAL, "op" => op.clone(), "status" => status.to_string())
                        .increment(1);
                }
                histogram!(DISPATCH_DURATION_SECONDS, "op" => op).record(elapsed.as_secs_f64());

                result
            }
            .instrument(span),
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
