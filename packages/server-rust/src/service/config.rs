use std::time::Duration;

use opencall_core::DEFAULT_CHUNK_SIZE;

/// How idempotency keys are namespaced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IdempotencyScope {
    /// Keys are scoped to a single operation name. The same key used with two
    /// different operations yields two independent cache entries.
    #[default]
    PerOperation,
    /// One key space shared by every side-effecting operation.
    Global,
}

/// Dispatch-level configuration: async timing, chunking, idempotency and
/// stream descriptor defaults.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// `retryAfterMs` advertised on accepted/pending async responses.
    pub retry_after_ms: u64,
    /// Lifetime added to the creation time to compute `expiresAt` for async
    /// instances and stream sessions.
    pub instance_ttl: Duration,
    /// Delay before each of the two async stages (accepted -> pending,
    /// pending -> terminal).
    pub async_stage_delay: Duration,
    /// Slice length used by the chunk builder.
    pub chunk_size: usize,
    pub idempotency_scope: IdempotencyScope,
    /// Bounded mailbox size per stream listener.
    pub listener_mailbox_capacity: usize,
    pub stream_transport: String,
    pub stream_encoding: String,
}

impl DispatchConfig {
    #[must_use]
    pub fn ttl_secs(&self) -> u64 {
        self.instance_ttl.as_secs()
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            retry_after_ms: 100,
            instance_ttl: Duration::from_secs(3600),
            async_stage_delay: Duration::from_millis(50),
            chunk_size: DEFAULT_CHUNK_SIZE,
            idempotency_scope: IdempotencyScope::PerOperation,
            listener_mailbox_capacity: 256,
            stream_transport: "wss".to_string(),
            stream_encoding: "json".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_config_defaults() {
        let config = DispatchConfig::default();
        assert_eq!(config.retry_after_ms, 100);
        assert_eq!(config.ttl_secs(), 3600);
        assert_eq!(config.async_stage_delay, Duration::from_millis(50));
        assert_eq!(config.chunk_size, 512);
        assert_eq!(config.idempotency_scope, IdempotencyScope::PerOperation);
        assert_eq!(config.listener_mailbox_capacity, 256);
        assert_eq!(config.stream_transport, "wss");
        assert_eq!(config.stream_encoding, "json");
    }
}
