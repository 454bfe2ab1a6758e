//! HTTP and WebSocket transport: configuration, middleware, handlers,
//! lifecycle and the server module.

pub mod config;
pub mod handlers;
pub mod middleware;
pub mod module;
pub mod shutdown;

pub use config::{NetworkConfig, DEFAULT_MAX_BODY_BYTES};
pub use handlers::AppState;
pub use module::{build_router, NetworkModule};
pub use shutdown::{HealthState, InFlightGuard, ShutdownController, SHUTDOWN_REASON};
