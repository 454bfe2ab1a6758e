//! `OpenCALL` Server: envelope dispatch over a single `/call` endpoint, async
//! operation instances with chunked results, and WebSocket stream sessions.

pub mod app;
pub mod network;
pub mod service;
pub mod storage;
pub mod stream;
pub mod telemetry;

pub use app::Services;
pub use network::{NetworkConfig, NetworkModule};
pub use service::{DispatchConfig, IdempotencyScope};
