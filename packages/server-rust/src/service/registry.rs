use std::collections::HashMap;
use std::sync::Arc;

use opencall_core::{Args, ExecutionModel, OperationDescriptor};
use serde_json::{json, Value};

use super::handler::{
    AsyncHandler, AsyncJob, HandlerResult, MediaPart, StreamGrant, StreamHandler, SyncHandler,
};

/// Protocol version advertised in the discovery document.
pub const CALL_VERSION: &str = "2026-02-10";

// ---------------------------------------------------------------------------
// OperationHandler
// ---------------------------------------------------------------------------

/// The single handler bound to an operation. The variant must match the
/// descriptor's execution model.
#[derive(Clone)]
pub enum OperationHandler {
    Sync(Arc<dyn SyncHandler>),
    Async(Arc<dyn AsyncHandler>),
    Stream(Arc<dyn StreamHandler>),
}

impl OperationHandler {
    pub fn sync<H: SyncHandler>(handler: H) -> Self {
        Self::Sync(Arc::new(handler))
    }

    pub fn asynchronous<H: AsyncHandler>(handler: H) -> Self {
        Self::Async(Arc::new(handler))
    }

    pub fn stream<H: StreamHandler>(handler: H) -> Self {
        Self::Stream(Arc::new(handler))
    }

    /// Closure form of [`OperationHandler::sync`].
    pub fn sync_fn<F>(f: F) -> Self
    where
        F: Fn(&Args<'_>, Option<&MediaPart>) -> HandlerResult<Value> + Send + Sync + 'static,
    {
        Self::sync(f)
    }

    /// Closure form of [`OperationHandler::asynchronous`].
    pub fn async_fn<F>(f: F) -> Self
    where
        F: Fn(&Args<'_>, &str) -> HandlerResult<AsyncJob> + Send + Sync + 'static,
    {
        Self::asynchronous(f)
    }

    /// Closure form of [`OperationHandler::stream`].
    pub fn stream_fn<F>(f: F) -> Self
    where
        F: Fn(&Args<'_>) -> HandlerResult<StreamGrant> + Send + Sync + 'static,
    {
        Self::stream(f)
    }

    #[must_use]
    pub fn model(&self) -> ExecutionModel {
        match self {
            Self::Sync(_) => ExecutionModel::Sync,
            Self::Async(_) => ExecutionModel::Async,
            Self::Stream(_) => ExecutionModel::Stream,
        }
    }
}

impl std::fmt::Debug for OperationHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OperationHandler::{}", self.model())
    }
}

/// A descriptor together with its bound handler.
#[derive(Debug, Clone)]
pub struct RegisteredOperation {
    pub descriptor: OperationDescriptor,
    pub handler: OperationHandler,
}

// ---------------------------------------------------------------------------
// RegistryError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("operation {op} is registered twice")]
    Duplicate { op: String },
    #[error("operation {op} declares {declared} execution but binds a {bound} handler")]
    ModelMismatch {
        op: String,
        declared: ExecutionModel,
        bound: ExecutionModel,
    },
}

// ---------------------------------------------------------------------------
// OperationRegistry
// ---------------------------------------------------------------------------

/// Read-only table of operations, built once at startup.
///
/// Lookup is by exact op name. Registration order is preserved for the
/// discovery document.
#[derive(Debug)]
pub struct OperationRegistry {
    call_version: String,
    by_name: HashMap<String, Arc<RegisteredOperation>>,
    order: Vec<String>,
}

impl OperationRegistry {
    #[must_use]
    pub fn builder() -> OperationRegistryBuilder {
        OperationRegistryBuilder {
            registry: Self {
                call_version: CALL_VERSION.to_string(),
                by_name: HashMap::new(),
                order: Vec::new(),
            },
        }
    }

    #[must_use]
    pub fn get(&self, op: &str) -> Option<Arc<RegisteredOperation>> {
        self.by_name.get(op).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Descriptors in registration order.
    pub fn descriptors(&self) -> impl Iterator<Item = &OperationDescriptor> {
        self.order
            .iter()
            .filter_map(|name| self.by_name.get(name))
            .map(|entry| &entry.descriptor)
    }

    /// Renders `{callVersion, operations: [...]}`.
    #[must_use]
    pub fn discovery_document(&self) -> Value {
        let operations: Vec<Value> = self
            .descriptors()
            .map(OperationDescriptor::discovery_entry)
            .collect();
        json!({
            "callVersion": self.call_version,
            "operations": operations,
        })
    }
}

/// Accumulates operations and checks each one as it is added.
#[derive(Debug)]
pub struct OperationRegistryBuilder {
    registry: OperationRegistry,
}

impl OperationRegistryBuilder {
    #[must_use]
    pub fn call_version(mut self, version: impl Into<String>) -> Self {
        self.registry.call_version = version.into();
        self
    }

    /// Adds one operation.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Duplicate`] for a name already present and
    /// [`RegistryError::ModelMismatch`] when the handler kind does not match
    /// the descriptor's execution model.
    pub fn register(
        mut self,
        descriptor: OperationDescriptor,
        handler: OperationHandler,
    ) -> Result<Self, RegistryError> {
        let op = descriptor.op.clone();
        if self.registry.by_name.contains_key(&op) {
            return Err(RegistryError::Duplicate { op });
        }
        if handler.model() != descriptor.execution_model {
            return Err(RegistryError::ModelMismatch {
                op,
                declared: descriptor.execution_model,
                bound: handler.model(),
            });
        }

        self.registry.order.push(op.clone());
        self.registry.by_name.insert(
            op,
            Arc::new(RegisteredOperation {
                descriptor,
                handler,
            }),
        );
        Ok(self)
    }

    #[must_use]
    pub fn build(self) -> OperationRegistry {
        self.registry
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::handler::JobOutput;

    fn echo(_args: &Args<'_>, _media: Option<&MediaPart>) -> HandlerResult<Value> {
        Ok(json!({ "ok": true }))
    }

    fn later(_args: &Args<'_>, _id: &str) -> HandlerResult<AsyncJob> {
        Ok(AsyncJob::new(|| Ok(JobOutput::new(json!(null)))))
    }

    fn sync_desc(op: &str) -> OperationDescriptor {
        OperationDescriptor::new(op, ExecutionModel::Sync)
    }

    #[test]
    fn register_and_lookup() {
        let registry = OperationRegistry::builder()
            .register(sync_desc("v1:a"), OperationHandler::sync(echo))
            .unwrap()
            .register(
                OperationDescriptor::new("v1:b", ExecutionModel::Async),
                OperationHandler::asynchronous(later),
            )
            .unwrap()
            .build();

        assert_eq!(registry.len(), 2);
        let a = registry.get("v1:a").unwrap();
        assert_eq!(a.handler.model(), ExecutionModel::Sync);
        assert!(registry.get("v1:missing").is_none());
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let err = OperationRegistry::builder()
            .register(sync_desc("v1:a"), OperationHandler::sync(echo))
            .unwrap()
            .register(sync_desc("v1:a"), OperationHandler::sync(echo))
            .unwrap_err();
        assert_eq!(err, RegistryError::Duplicate { op: "v1:a".into() });
    }

    #[test]
    fn handler_kind_must_match_execution_model() {
        let err = OperationRegistry::builder()
            .register(sync_desc("v1:a"), OperationHandler::asynchronous(later))
            .unwrap_err();
        assert_eq!(
            err,
            RegistryError::ModelMismatch {
                op: "v1:a".into(),
                declared: ExecutionModel::Sync,
                bound: ExecutionModel::Async,
            }
        );
    }

    #[test]
    fn discovery_document_preserves_registration_order() {
        let registry = OperationRegistry::builder()
            .register(sync_desc("v1:z"), OperationHandler::sync(echo))
            .unwrap()
            .register(sync_desc("v1:a"), OperationHandler::sync(echo))
            .unwrap()
            .build();

        let doc = registry.discovery_document();
        assert_eq!(doc["callVersion"], CALL_VERSION);
        let names: Vec<_> = doc["operations"]
            .as_array()
            .unwrap()
            .iter()
            .map(|entry| entry["op"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["v1:z", "v1:a"]);
    }
}
