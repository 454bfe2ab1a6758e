//! Network configuration types for the `OpenCALL` server.

use std::time::Duration;

/// Room for a maximum-size media part plus the envelope and multipart framing.
pub const DEFAULT_MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Top-level network configuration for the server.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Bind address for the server.
    pub host: String,
    /// Port to listen on. 0 means OS-assigned.
    pub port: u16,
    /// Allowed CORS origins.
    pub cors_origins: Vec<String>,
    /// Largest accepted request body in bytes.
    pub max_body_bytes: usize,
    /// Mounts `POST /_internal/tokens` for test harnesses.
    pub expose_token_endpoint: bool,
    /// How often expired instances and sessions are swept. `None` leaves
    /// `expiresAt` advisory.
    pub expiry_sweep_interval: Option<Duration>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 0,
            cors_origins: vec!["*".to_string()],
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            expose_token_endpoint: false,
            expiry_sweep_interval: None,
        }
    }
}
