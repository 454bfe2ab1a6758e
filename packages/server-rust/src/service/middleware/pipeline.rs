//! Pipeline composition: wraps the dispatcher in its middleware stack.

use tower::ServiceBuilder;

use super::metrics::{MetricsLayer, MetricsService};
use crate::service::dispatcher::Dispatcher;

/// The service the transport calls for every `POST /call`.
pub type DispatchService = MetricsService<Dispatcher>;

/// Build the dispatch pipeline.
///
/// Only instrumentation sits in front of the dispatcher. Handlers are never
/// timed out and no load shedding is applied; HTTP-level limits live in the
/// network middleware.
#[must_use]
pub fn build_dispatch_pipeline(dispatcher: Dispatcher) -> DispatchService {
    ServiceBuilder::new().layer(MetricsLayer).service(dispatcher)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
