//! Tower middleware layers for the dispatch pipeline.
//!
//! - [`metrics`]: dispatch timing, tracing span and `metrics` counters
//! - [`pipeline`]: composes the layers around the dispatcher

pub mod metrics;
pub mod pipeline;

pub use metrics::MetricsLayer;
pub use pipeline::{build_dispatch_pipeline, DispatchService};
