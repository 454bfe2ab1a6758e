//! Reference Todo domain.
//!
//! A small in-memory task tracker exposed as `OpenCALL` operations. It exists
//! so the dispatcher, async lifecycle, chunk retrieval, media uploads and
//! stream sessions are exercised end to end against real handlers.
//!
//! All handlers share one [`DomainContext`]; [`build_registry`] binds each
//! operation's descriptor to a closure over that context.

pub mod debug;
pub mod reports;
pub mod schemas;
pub mod todos;

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use opencall_core::{ClockSource, ExecutionModel, OperationDescriptor, StreamOptions};

use crate::service::registry::{OperationHandler, OperationRegistry, RegistryError};
use crate::storage::media::MediaStore;
use crate::storage::todos::TodoStore;
use crate::stream::{Broadcaster, SessionRegistry, StreamEvent};

/// Watch sessions are valid for one hour unless configured otherwise.
pub const DEFAULT_STREAM_TTL_SECS: u64 = 3600;

const READ: &[&str] = &["todos:read"];
const WRITE: &[&str] = &["todos:write"];

/// Collaborators shared by every domain handler.
pub struct DomainContext {
    pub todos: Arc<TodoStore>,
    pub media: Arc<dyn MediaStore>,
    pub sessions: Arc<SessionRegistry>,
    pub broadcaster: Arc<Broadcaster>,
    pub clock: Arc<dyn ClockSource>,
    pub stream_ttl_secs: u64,
}

impl DomainContext {
    /// ISO-8601 UTC timestamp with millisecond precision, e.g.
    /// `2026-01-01T00:00:00.000Z`.
    #[must_use]
    pub fn timestamp(&self) -> String {
        iso_millis(self.clock.now_millis())
    }

    /// Fans an event out to watchers. Returns how many received it.
    pub fn publish(&self, event: &StreamEvent) -> usize {
        self.broadcaster.publish(event)
    }
}

impl std::fmt::Debug for DomainContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DomainContext")
            .field("todos", &self.todos.len())
            .field("sessions", &self.sessions.len())
            .field("listeners", &self.broadcaster.count())
            .field("stream_ttl_secs", &self.stream_ttl_secs)
            .finish_non_exhaustive()
    }
}

#[must_use]
pub fn iso_millis(millis: u64) -> String {
    i64::try_from(millis)
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .unwrap_or_default()
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Registers every domain operation.
///
/// # Errors
///
/// Only on a programming error: a duplicate op name or a handler whose kind
/// does not match its descriptor.
pub fn build_registry(ctx: &Arc<DomainContext>) -> Result<OperationRegistry, RegistryError> {
    use ExecutionModel::{Async, Stream, Sync};

    let c = Arc::clone(ctx);
    let builder = OperationRegistry::builder().register(
        OperationDescriptor::new("v1:todos.create", Sync)
            .with_description("Create a new todo item")
            .with_schemas(schemas::create_args(), schemas::todo())
            .side_effecting()
            .with_scopes(WRITE),
        OperationHandler::sync_fn(move |args, _| todos::create(&c, args)),
    )?;

    let c = Arc::clone(ctx);
    let builder = builder.register(
        OperationDescriptor::new("v1:todos.get", Sync)
            .with_description("Get a todo item by ID")
            .with_schemas(schemas::get_args(), schemas::todo())
            .with_scopes(READ),
        OperationHandler::sync_fn(move |args, _| todos::get(&c, args)),
    )?;

    let c = Arc::clone(ctx);
    let builder = builder.register(
        OperationDescriptor::new("v1:todos.list", Sync)
            .with_description("List todo items with optional filters and pagination")
            .with_schemas(schemas::list_args(), schemas::todo_page())
            .with_scopes(READ),
        OperationHandler::sync_fn(move |args, _| todos::list(&c, args)),
    )?;

    let c = Arc::clone(ctx);
    let builder = builder.register(
        OperationDescriptor::new("v1:todos.update", Sync)
            .with_description("Update a todo item")
            .with_schemas(schemas::update_args(), schemas::todo())
            .side_effecting()
            .with_scopes(WRITE),
        OperationHandler::sync_fn(move |args, _| todos::update(&c, args)),
    )?;

    let c = Arc::clone(ctx);
    let builder = builder.register(
        OperationDescriptor::new("v1:todos.delete", Sync)
            .with_description("Delete a todo item")
            .with_schemas(schemas::delete_args(), schemas::delete_result())
            .side_effecting()
            .with_scopes(WRITE),
        OperationHandler::sync_fn(move |args, _| todos::delete(&c, args)),
    )?;

    let c = Arc::clone(ctx);
    let builder = builder.register(
        OperationDescriptor::new("v1:todos.complete", Sync)
            .with_description("Mark a todo item as complete")
            .with_schemas(schemas::complete_args(), schemas::todo())
            .side_effecting()
            .with_scopes(WRITE),
        OperationHandler::sync_fn(move |args, _| todos::complete(&c, args)),
    )?;

    let c = Arc::clone(ctx);
    let builder = builder.register(
        OperationDescriptor::new("v1:todos.export", Async)
            .with_description("Export all todos in CSV or JSON format")
            .with_schemas(schemas::export_args(), schemas::export_result())
            .with_scopes(READ),
        OperationHandler::async_fn(move |args, _| reports::export(&c, args)),
    )?;

    let c = Arc::clone(ctx);
    let builder = builder.register(
        OperationDescriptor::new("v1:reports.generate", Async)
            .with_description("Generate a summary report of todos")
            .with_schemas(schemas::report_args(), schemas::report_result())
            .with_scopes(&["reports:read"]),
        OperationHandler::async_fn(move |args, _| reports::generate(&c, args)),
    )?;

    let c = Arc::clone(ctx);
    let builder = builder.register(
        OperationDescriptor::new("v1:todos.search", Sync)
            .with_description(
                "Search todos by query (deprecated, use v1:todos.list with label filter)",
            )
            .with_schemas(schemas::search_args(), schemas::todo_page())
            .with_scopes(READ)
            .deprecated(NaiveDate::from_ymd_opt(2025, 1, 1), Some("v1:todos.list")),
        OperationHandler::sync_fn(move |args, _| todos::search(&c, args)),
    )?;

    let builder = builder.register(
        OperationDescriptor::new("v1:debug.simulateError", Sync)
            .with_description("Simulate a server error for testing (test-only)")
            .with_schemas(
                schemas::simulate_error_args(),
                schemas::simulate_error_result(),
            ),
        OperationHandler::sync_fn(|args, _| debug::simulate_error(args)),
    )?;

    let c = Arc::clone(ctx);
    let builder = builder.register(
        OperationDescriptor::new("v1:todos.watch", Stream)
            .with_description("Watch for changes to todo items via WebSocket stream")
            .with_schemas(schemas::watch_args(), schemas::watch_frame())
            .with_scopes(READ)
            .with_stream(StreamOptions {
                supported_transports: vec!["wss".to_string()],
                supported_encodings: vec!["json".to_string()],
                frame_schema: schemas::watch_frame(),
                ttl_seconds: ctx.stream_ttl_secs,
            }),
        OperationHandler::stream_fn(move |args| todos::watch(&c, args)),
    )?;

    let c = Arc::clone(ctx);
    let builder = builder.register(
        OperationDescriptor::new("v1:todos.attach", Sync)
            .with_description("Attach a file to a todo item")
            .with_schemas(schemas::attach_args(), schemas::attach_result())
            .side_effecting()
            .with_scopes(WRITE)
            .with_media(schemas::attach_media()),
        OperationHandler::sync_fn(move |args, media| todos::attach(&c, args, media)),
    )?;

    Ok(builder.build())
}

// ---------------------------------------------------------------------------
// Test fixtures
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod fixtures {
    use std::sync::Arc;

    use opencall_core::ManualClock;

    use super::{DomainContext, DEFAULT_STREAM_TTL_SECS};
    use crate::storage::media::InMemoryMediaStore;
    use crate::storage::todos::TodoStore;
    use crate::stream::{Broadcaster, SessionRegistry};

    /// 2026-01-01T00:00:00.000Z
    pub const NOW_MILLIS: u64 = 1_767_225_600_000;

    pub fn context() -> (Arc<DomainContext>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(NOW_MILLIS));
        let ctx = DomainContext {
            todos: Arc::new(TodoStore::new()),
            media: Arc::new(InMemoryMediaStore::new()),
            sessions: Arc::new(SessionRegistry::new()),
            broadcaster: Arc::new(Broadcaster::new(16)),
            clock: Arc::clone(&clock) as _,
            stream_ttl_secs: DEFAULT_STREAM_TTL_SECS,
        };
        (Arc::new(ctx), clock)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::fixtures::{context, NOW_MILLIS};
    use super::*;

    #[test]
    fn timestamps_are_iso_millis_utc() {
        assert_eq!(iso_millis(NOW_MILLIS), "2026-01-01T00:00:00.000Z");
        assert_eq!(iso_millis(NOW_MILLIS + 1_234), "2026-01-01T00:00:01.234Z");
        assert_eq!(iso_millis(0), "1970-01-01T00:00:00.000Z");
    }

    #[test]
    fn registry_carries_every_operation() {
        let (ctx, _) = context();
        let registry = build_registry(&ctx).unwrap();
        assert_eq!(registry.len(), 12);

        let doc = registry.discovery_document();
        let ops: Vec<&str> = doc["operations"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|entry| entry["op"].as_str())
            .collect();
        for op in [
            "v1:todos.create",
            "v1:todos.get",
            "v1:todos.list",
            "v1:todos.update",
            "v1:todos.delete",
            "v1:todos.complete",
            "v1:todos.export",
            "v1:reports.generate",
            "v1:todos.search",
            "v1:debug.simulateError",
            "v1:todos.watch",
            "v1:todos.attach",
        ] {
            assert!(ops.contains(&op), "missing {op}");
        }
    }

    #[test]
    fn descriptors_declare_scopes_and_side_effects() {
        let (ctx, _) = context();
        let registry = build_registry(&ctx).unwrap();

        let create = registry.get("v1:todos.create").unwrap();
        assert!(create.descriptor.side_effecting);
        assert!(create.descriptor.idempotency_required);
        assert_eq!(create.descriptor.auth_scopes, vec!["todos:write"]);

        let debug = registry.get("v1:debug.simulateError").unwrap();
        assert!(debug.descriptor.auth_scopes.is_empty());

        let attach = registry.get("v1:todos.attach").unwrap();
        assert!(attach.descriptor.accepts_media);

        let report = registry.get("v1:reports.generate").unwrap();
        assert_eq!(report.descriptor.execution_model, ExecutionModel::Async);
    }

    #[test]
    fn search_is_sunset_with_replacement() {
        let (ctx, _) = context();
        let registry = build_registry(&ctx).unwrap();
        let search = registry.get("v1:todos.search").unwrap();

        assert!(search.descriptor.is_removed(NOW_MILLIS));
        let entry = search.descriptor.discovery_entry();
        assert_eq!(entry["deprecated"], true);
        assert_eq!(entry["sunset"], "2025-01-01");
        assert_eq!(entry["replacement"], "v1:todos.list");
    }

    #[test]
    fn watch_advertises_stream_options() {
        let (ctx, _) = context();
        let registry = build_registry(&ctx).unwrap();
        let entry = registry.get("v1:todos.watch").unwrap().descriptor.discovery_entry();
        assert_eq!(entry["supportedTransports"], json!(["wss"]));
        assert_eq!(entry["supportedEncodings"], json!(["json"]));
        assert_eq!(entry["ttlSeconds"], 3600);
        assert_eq!(entry["frameSchema"], schemas::watch_frame());
    }
}
