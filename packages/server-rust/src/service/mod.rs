//! Envelope dispatch and everything it calls into.
//!
//! 1. **Registry** (`registry`): op name -> descriptor + handler
//! 2. **Dispatcher** (`dispatcher`): shape check, lookup, sunset, auth,
//!    idempotency, execution, error normalization
//! 3. **Middleware** (`middleware`): tower layers around the dispatcher
//! 4. **Scheduler** (`scheduler`): deferred async stages
//! 5. **Domain** (`domain`): the reference Todo operations
//! 6. **Background workers** (`worker`): expiry sweeping

pub mod auth;
pub mod config;
pub mod dispatcher;
pub mod domain;
pub mod handler;
pub mod middleware;
pub mod registry;
pub mod scheduler;
pub mod worker;

// Re-export key types for convenient access.
pub use auth::{AuthError, AuthValidator, OpenAccess, TokenStore};
pub use config::{DispatchConfig, IdempotencyScope};
pub use dispatcher::{CallRequest, DispatchDeps, Dispatcher};
pub use domain::{build_registry, DomainContext};
pub use handler::{HandlerError, HandlerResult, MediaPart};
pub use registry::{OperationHandler, OperationRegistry, RegistryError};
pub use scheduler::{ManualScheduler, Scheduler, TokioScheduler};
pub use worker::{BackgroundRunnable, BackgroundWorker, ExpirySweeper};
