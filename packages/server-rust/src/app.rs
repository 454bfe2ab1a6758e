//! Composition root: allocates every store and wires the dispatcher.
//!
//! [`Services`] is built once at startup and shared (behind `Arc`) with the
//! network layer and background workers.

use std::sync::Arc;

use opencall_core::ClockSource;

use crate::service::auth::TokenStore;
use crate::service::config::DispatchConfig;
use crate::service::dispatcher::{DispatchDeps, Dispatcher};
use crate::service::domain::{build_registry, DomainContext};
use crate::service::middleware::{build_dispatch_pipeline, DispatchService};
use crate::service::registry::{OperationRegistry, RegistryError};
use crate::service::scheduler::Scheduler;
use crate::storage::idempotency::IdempotencyCache;
use crate::storage::instances::InstanceStore;
use crate::storage::media::{InMemoryMediaStore, MediaStore};
use crate::storage::todos::TodoStore;
use crate::stream::{Broadcaster, SessionRegistry};

/// Everything a running server holds.
pub struct Services {
    pub dispatch: DispatchService,
    pub registry: Arc<OperationRegistry>,
    pub instances: Arc<InstanceStore>,
    pub todos: Arc<TodoStore>,
    pub media: Arc<dyn MediaStore>,
    /// Also the dispatcher's [`AuthValidator`](crate::service::auth::AuthValidator).
    pub tokens: Arc<TokenStore>,
    pub sessions: Arc<SessionRegistry>,
    pub broadcaster: Arc<Broadcaster>,
    pub clock: Arc<dyn ClockSource>,
}

impl Services {
    /// Builds the reference Todo server.
    ///
    /// # Errors
    ///
    /// Only if the domain registry is inconsistent.
    pub fn build(
        config: DispatchConfig,
        scheduler: Arc<dyn Scheduler>,
        clock: Arc<dyn ClockSource>,
    ) -> Result<Self, RegistryError> {
        let todos = Arc::new(TodoStore::new());
        let media: Arc<dyn MediaStore> = Arc::new(InMemoryMediaStore::new());
        let sessions = Arc::new(SessionRegistry::new());
        let broadcaster = Arc::new(Broadcaster::new(config.listener_mailbox_capacity));
        let tokens = Arc::new(TokenStore::new());
        let instances = Arc::new(InstanceStore::new());

        let domain = Arc::new(DomainContext {
            todos: Arc::clone(&todos),
            media: Arc::clone(&media),
            sessions: Arc::clone(&sessions),
            broadcaster: Arc::clone(&broadcaster),
            clock: Arc::clone(&clock),
            stream_ttl_secs: config.ttl_secs(),
        });
        let registry = Arc::new(build_registry(&domain)?);

        let dispatcher = Dispatcher::new(
            DispatchDeps {
                registry: Arc::clone(&registry),
                auth: Arc::clone(&tokens) as _,
                instances: Arc::clone(&instances),
                idempotency: Arc::new(IdempotencyCache::new()),
                scheduler,
                clock: Arc::clone(&clock),
            },
            config,
        );

        Ok(Self {
            dispatch: build_dispatch_pipeline(dispatcher),
            registry,
            instances,
            todos,
            media,
            tokens,
            sessions,
            broadcaster,
            clock,
        })
    }
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services")
            .field("operations", &self.registry.len())
            .field("instances", &self.instances.len())
            .field("todos", &self.todos.len())
            .field("listeners", &self.broadcaster.count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use opencall_core::{Envelope, ManualClock, ResponseState};
    use serde_json::json;
    use tower::ServiceExt;

    use super::*;
    use crate::service::dispatcher::CallRequest;
    use crate::service::scheduler::ManualScheduler;

    #[tokio::test]
    async fn built_services_dispatch_with_token_auth() {
        let services = Services::build(
            DispatchConfig::default(),
            Arc::new(ManualScheduler::new()),
            Arc::new(ManualClock::new(1_767_225_600_000)),
        )
        .unwrap();
        assert_eq!(services.registry.len(), 12);

        let create = || {
            CallRequest::new(Envelope::new("v1:todos.create", json!({ "title": "wired" })))
        };

        let denied = services.dispatch.clone().oneshot(create()).await.unwrap();
        assert_eq!(denied.status, 401);

        services.tokens.register("tok", ["todos:write"]);
        let created = services
            .dispatch
            .clone()
            .oneshot(create().with_credential("Bearer tok"))
            .await
            .unwrap();
        assert_eq!(created.status, 200);
        assert_eq!(created.body.state, ResponseState::Complete);
        assert_eq!(services.todos.len(), 1);
    }
}
