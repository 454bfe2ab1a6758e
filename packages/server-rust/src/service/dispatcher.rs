//! Envelope dispatcher.
//!
//! [`Dispatcher::dispatch`] turns one request envelope into a status code and a
//! normalized response body. The steps run in a fixed order and the first
//! failure short-circuits:
//!
//! 1. shape check (`op` present and a string)
//! 2. operation lookup
//! 3. deprecation / sunset
//! 4. authorization
//! 5. idempotency replay (side-effecting operations carrying a key)
//! 6. execution by model (sync, async, stream)
//! 7. error normalization
//! 8. idempotency capture
//!
//! The dispatcher is also a `tower::Service<CallRequest>` so it can be wrapped
//! in the dispatch middleware pipeline.

use std::convert::Infallible;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use opencall_core::{
    Args, CallIdentity, CallResponse, ClockSource, Envelope, EnvelopeResponse, ErrorBody,
    ErrorCause, ExecutionModel, ProtocolCode, StreamDescriptor,
};
use serde_json::{Map, Value};
use tower::Service;
use tracing::{debug, error, warn};
use uuid::Uuid;

use super::auth::AuthValidator;
use super::config::DispatchConfig;
use super::handler::{AsyncJob, HandlerError, HandlerResult, MediaPart};
use super::registry::{OperationHandler, OperationRegistry, RegisteredOperation};
use super::scheduler::{JobHandle, Scheduler, SchedulerError};
use crate::storage::idempotency::{IdempotencyCache, IdempotencyKey};
use crate::storage::instances::InstanceStore;

/// Message returned for any unexpected handler failure. The cause is logged,
/// never sent.
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

/// One call as received by the transport.
#[derive(Debug, Clone, Default)]
pub struct CallRequest {
    pub envelope: Envelope,
    /// Raw `Authorization` header value.
    pub credential: Option<String>,
    pub media: Option<MediaPart>,
}

impl CallRequest {
    #[must_use]
    pub fn new(envelope: Envelope) -> Self {
        Self {
            envelope,
            credential: None,
            media: None,
        }
    }

    #[must_use]
    pub fn with_credential(mut self, credential: impl Into<String>) -> Self {
        self.credential = Some(credential.into());
        self
    }

    #[must_use]
    pub fn with_media(mut self, media: MediaPart) -> Self {
        self.media = Some(media);
        self
    }
}

/// Collaborators the dispatcher reads and writes.
#[derive(Clone)]
pub struct DispatchDeps {
    pub registry: Arc<OperationRegistry>,
    pub auth: Arc<dyn AuthValidator>,
    pub instances: Arc<InstanceStore>,
    pub idempotency: Arc<IdempotencyCache>,
    pub scheduler: Arc<dyn Scheduler>,
    pub clock: Arc<dyn ClockSource>,
}

struct Inner {
    deps: DispatchDeps,
    config: DispatchConfig,
}

/// Cheap to clone; clones share every store.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

impl Dispatcher {
    #[must_use]
    pub fn new(deps: DispatchDeps, config: DispatchConfig) -> Self {
        Self {
            inner: Arc::new(Inner { deps, config }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &DispatchConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<OperationRegistry> {
        &self.inner.deps.registry
    }

    #[must_use]
    pub fn instances(&self) -> &Arc<InstanceStore> {
        &self.inner.deps.instances
    }

    /// Dispatches one envelope.
    pub async fn dispatch(&self, request: CallRequest) -> CallResponse {
        let inner = &self.inner;
        let CallRequest {
            envelope,
            credential,
            media,
        } = request;

        let identity = CallIdentity {
            request_id: envelope
                .ctx
                .request_id
                .clone()
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            session_id: envelope.ctx.session_id.clone(),
        };

        let Some(op) = envelope.op_name() else {
            return CallResponse::protocol_error(
                &identity,
                ProtocolCode::InvalidRequest,
                "Missing or invalid 'op' field",
            );
        };

        let Some(entry) = inner.deps.registry.get(op) else {
            return CallResponse::protocol_error(
                &identity,
                ProtocolCode::UnknownOp,
                format!("Unknown operation: {op}"),
            );
        };
        let descriptor = &entry.descriptor;

        if descriptor.is_removed(inner.deps.clock.now_millis()) {
            let error = ErrorBody::protocol(
                ProtocolCode::OpRemoved,
                format!("Operation {op} has been removed"),
            )
            .with_cause(ErrorCause {
                removed_op: op.to_string(),
                replacement: descriptor.replacement.clone(),
            });
            return CallResponse::new(
                ProtocolCode::OpRemoved.status(),
                EnvelopeResponse::failed(&identity, error),
            );
        }

        if !descriptor.auth_scopes.is_empty() {
            if let Err(err) = inner
                .deps
                .auth
                .validate(credential.as_deref(), &descriptor.auth_scopes)
            {
                return CallResponse::protocol_error(&identity, err.code(), err.to_string());
            }
        }

        let key = envelope
            .ctx
            .idempotency_key
            .as_deref()
            .filter(|_| descriptor.side_effecting);
        let mut slot = match key {
            Some(key) => Some(
                inner
                    .deps
                    .idempotency
                    .acquire(IdempotencyKey::new(inner.config.idempotency_scope, op, key))
                    .await,
            ),
            None => None,
        };
        if let Some(cached) = slot.as_ref().and_then(|slot| slot.cached()) {
            debug!(op, request_id = %identity.request_id, "replaying idempotent response");
            return cached.clone();
        }

        let response = inner.execute(&entry, &identity, &envelope.args, media.as_ref());

        if let Some(slot) = slot.as_mut() {
            if descriptor.execution_model == ExecutionModel::Sync && response.status == 200 {
                slot.store(response.clone());
            }
        }
        response
    }
}

impl Inner {
    fn execute(
        self: &Arc<Self>,
        entry: &RegisteredOperation,
        identity: &CallIdentity,
        args: &Map<String, Value>,
        media: Option<&MediaPart>,
    ) -> CallResponse {
        let op = entry.descriptor.op.as_str();
        let args = Args::new(args);

        match &entry.handler {
            OperationHandler::Sync(handler) => {
                let media = media.filter(|_| entry.descriptor.accepts_media);
                match guarded(|| handler.call(&args, media)) {
                    Ok(result) => {
                        CallResponse::new(200, EnvelopeResponse::complete(identity, result))
                    }
                    Err(err) => render_error(op, identity, err),
                }
            }
            OperationHandler::Async(handler) => {
                match guarded(|| handler.prepare(&args, &identity.request_id)) {
                    Ok(job) => self.accept(op, identity, job),
                    Err(err) => render_error(op, identity, err),
                }
            }
            OperationHandler::Stream(handler) => match guarded(|| handler.open(&args)) {
                Ok(grant) => {
                    let stream = StreamDescriptor {
                        transport: self.config.stream_transport.clone(),
                        location: format!("/streams/{}", grant.session_id),
                        session_id: grant.session_id,
                        encoding: self.config.stream_encoding.clone(),
                        expires_at: grant.expires_at,
                    };
                    CallResponse::new(202, EnvelopeResponse::streaming(identity, stream))
                }
                Err(err) => render_error(op, identity, err),
            },
        }
    }

    /// Records the instance, schedules its stages and answers `202 accepted`.
    fn accept(self: &Arc<Self>, op: &str, identity: &CallIdentity, job: AsyncJob) -> CallResponse {
        let instance = self.deps.instances.create(
            &identity.request_id,
            op,
            self.config.retry_after_ms,
            self.deps.clock.now_secs(),
            self.config.ttl_secs(),
        );

        if let Err(err) = self.schedule_stages(op, &identity.request_id, instance.generation, job) {
            error!(op, request_id = %identity.request_id, error = %err, "failed to schedule async work");
            self.record_failure(
                &identity.request_id,
                instance.generation,
                ErrorBody::protocol(ProtocolCode::InternalError, INTERNAL_ERROR_MESSAGE),
            );
        }

        CallResponse::new(
            202,
            EnvelopeResponse::accepted(identity, instance.retry_after_ms, instance.expires_at),
        )
    }

    /// Stage one moves the instance to `pending` and schedules stage two, which
    /// runs the job and records its outcome.
    fn schedule_stages(
        self: &Arc<Self>,
        op: &str,
        request_id: &str,
        generation: u64,
        job: AsyncJob,
    ) -> Result<JobHandle, SchedulerError> {
        let delay = self.config.async_stage_delay;
        let this = Arc::clone(self);
        let op = op.to_string();
        let request_id = request_id.to_string();

        self.deps.scheduler.submit(
            delay,
            Box::new(move || {
                if let Err(err) = this.deps.instances.mark_pending(&request_id, generation) {
                    warn!(op = %op, request_id = %request_id, error = %err, "async stage skipped");
                    return;
                }

                let finisher = Arc::clone(&this);
                let finish_id = request_id.clone();
                let finish_op = op.clone();
                let submitted = this.deps.scheduler.submit(
                    delay,
                    Box::new(move || finisher.finish(&finish_op, &finish_id, generation, job)),
                );
                if let Err(err) = submitted {
                    error!(op = %op, request_id = %request_id, error = %err, "failed to schedule async completion");
                    this.record_failure(
                        &request_id,
                        generation,
                        ErrorBody::protocol(ProtocolCode::InternalError, INTERNAL_ERROR_MESSAGE),
                    );
                }
            }),
        )
    }

    fn finish(&self, op: &str, request_id: &str, generation: u64, job: AsyncJob) {
        let recorded = match guarded(|| job.run()) {
            Ok(output) => self.deps.instances.complete(
                request_id,
                generation,
                output.result,
                output.text.as_deref(),
                self.config.chunk_size,
            ),
            Err(err) => {
                let (_, body) = normalize(op, request_id, err);
                self.deps.instances.fail(request_id, generation, body)
            }
        };
        match recorded {
            Ok(()) => debug!(op, request_id, "async operation finished"),
            Err(err) => warn!(op, request_id, error = %err, "async result dropped"),
        }
    }

    fn record_failure(&self, request_id: &str, generation: u64, error: ErrorBody) {
        if let Err(err) = self.deps.instances.fail(request_id, generation, error) {
            warn!(request_id, error = %err, "could not record async failure");
        }
    }
}

/// Runs a handler entry point, turning a panic into [`HandlerError::Internal`].
fn guarded<T>(call: impl FnOnce() -> HandlerResult<T>) -> HandlerResult<T> {
    catch_unwind(AssertUnwindSafe(call)).unwrap_or_else(|payload| {
        let reason = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic payload".to_string());
        Err(HandlerError::Internal(anyhow::anyhow!("handler panicked: {reason}")))
    })
}

/// Maps a handler failure to its status and wire error.
fn normalize(op: &str, request_id: &str, err: HandlerError) -> (u16, ErrorBody) {
    match err {
        HandlerError::Domain(domain) => (200, domain.into()),
        HandlerError::Validation(field) => (
            ProtocolCode::ValidationError.status(),
            ErrorBody::protocol(ProtocolCode::ValidationError, field.to_string()),
        ),
        HandlerError::Operational {
            status,
            code,
            message,
        } => (status, ErrorBody::new(code, message)),
        HandlerError::Internal(cause) => {
            error!(op, request_id, error = format!("{cause:#}"), "handler failed");
            (
                ProtocolCode::InternalError.status(),
                ErrorBody::protocol(ProtocolCode::InternalError, INTERNAL_ERROR_MESSAGE),
            )
        }
    }
}

fn render_error(op: &str, identity: &CallIdentity, err: HandlerError) -> CallResponse {
    let (status, body) = normalize(op, &identity.request_id, err);
    CallResponse::new(status, EnvelopeResponse::failed(identity, body))
}

// ---------------------------------------------------------------------------
// tower::Service
// ---------------------------------------------------------------------------

impl Service<CallRequest> for Dispatcher {
    type Response = CallResponse;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<CallResponse, Infallible>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: CallRequest) -> Self::Future {
        let dispatcher = self.clone();
        Box::pin(async move { Ok(dispatcher.dispatch(request).await) })
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("operations", &self.inner.deps.registry.len())
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
