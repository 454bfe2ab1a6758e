//! `v1:todos.*` handlers: CRUD, paging, search, attachments and watch.

use bytes::Bytes;
use opencall_core::chunk::{decode_cursor, encode_cursor};
use opencall_core::{Args, FieldResult, FromArgs, IntBounds};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use super::DomainContext;
use crate::service::handler::{HandlerError, HandlerResult, MediaPart, StreamGrant};
use crate::storage::media::{ACCEPTED_MEDIA_TYPES, MAX_MEDIA_BYTES};
use crate::storage::todos::{Location, Todo};
use crate::stream::{EventKind, StreamEvent, StreamFilter};

const PAGE_LIMIT: IntBounds = IntBounds::range(1, 100);
const DEFAULT_PAGE_LIMIT: i64 = 20;

/// Content type recorded for attachments given by reference only.
const REFERENCE_CONTENT_TYPE: &str = "application/octet-stream";

fn not_found(id: &str) -> HandlerError {
    HandlerError::domain("TODO_NOT_FOUND", format!("Todo with id '{id}' not found"))
}

fn to_json<T: Serialize>(value: &T) -> HandlerResult<Value> {
    serde_json::to_value(value).map_err(|err| HandlerError::Internal(err.into()))
}

/// Bounded page limit as a length. The bounds guarantee it is positive.
fn page_len(limit: i64) -> usize {
    usize::try_from(limit).unwrap_or(1)
}

// ---------------------------------------------------------------------------
// Arguments
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct CreateArgs {
    title: String,
    description: Option<String>,
    due_date: Option<String>,
    labels: Option<Vec<String>>,
}

impl FromArgs for CreateArgs {
    fn from_args(args: &Args<'_>) -> FieldResult<Self> {
        Ok(Self {
            title: args.required_string("title")?,
            description: args.optional_string("description")?,
            due_date: args.optional_string("dueDate")?,
            labels: args.optional_string_array("labels")?,
        })
    }
}

#[derive(Debug)]
struct IdArgs {
    id: String,
}

impl FromArgs for IdArgs {
    fn from_args(args: &Args<'_>) -> FieldResult<Self> {
        Ok(Self {
            id: args.required_string("id")?,
        })
    }
}

#[derive(Debug)]
struct ListArgs {
    cursor: Option<String>,
    limit: usize,
    completed: Option<bool>,
    label: Option<String>,
}

impl FromArgs for ListArgs {
    fn from_args(args: &Args<'_>) -> FieldResult<Self> {
        Ok(Self {
            cursor: args.optional_string("cursor")?,
            limit: page_len(args.int_or("limit", PAGE_LIMIT, DEFAULT_PAGE_LIMIT)?),
            completed: args.optional_bool("completed")?,
            label: args.optional_string("label")?,
        })
    }
}

#[derive(Debug)]
struct UpdateArgs {
    id: String,
    title: Option<String>,
    description: Option<String>,
    due_date: Option<String>,
    labels: Option<Vec<String>>,
    completed: Option<bool>,
}

impl FromArgs for UpdateArgs {
    fn from_args(args: &Args<'_>) -> FieldResult<Self> {
        Ok(Self {
            id: args.required_string("id")?,
            title: args.optional_string("title")?,
            description: args.optional_string("description")?,
            due_date: args.optional_string("dueDate")?,
            labels: args.optional_string_array("labels")?,
            completed: args.optional_bool("completed")?,
        })
    }
}

#[derive(Debug)]
struct SearchArgs {
    query: String,
    limit: usize,
}

impl FromArgs for SearchArgs {
    fn from_args(args: &Args<'_>) -> FieldResult<Self> {
        Ok(Self {
            query: args.required_string("query")?,
            limit: page_len(args.int_or("limit", PAGE_LIMIT, DEFAULT_PAGE_LIMIT)?),
        })
    }
}

#[derive(Debug)]
struct WatchArgs {
    filter: StreamFilter,
}

impl FromArgs for WatchArgs {
    fn from_args(args: &Args<'_>) -> FieldResult<Self> {
        let raw = args.enumeration("filter", &StreamFilter::OPTIONS, "all")?;
        Ok(Self {
            filter: StreamFilter::parse(&raw).unwrap_or_default(),
        })
    }
}

#[derive(Debug)]
struct AttachArgs {
    todo_id: String,
    reference: Option<String>,
}

impl FromArgs for AttachArgs {
    fn from_args(args: &Args<'_>) -> FieldResult<Self> {
        Ok(Self {
            todo_id: args.required_string("todoId")?,
            // An empty ref counts as no ref.
            reference: args.optional_string("ref")?.filter(|r| !r.is_empty()),
        })
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `v1:todos.create`
pub fn create(ctx: &DomainContext, args: &Args<'_>) -> HandlerResult<Value> {
    let CreateArgs {
        title,
        description,
        due_date,
        labels,
    } = args.decode()?;

    let now = ctx.timestamp();
    let todo = Todo {
        id: Uuid::new_v4().to_string(),
        title,
        description,
        due_date,
        labels,
        completed: false,
        completed_at: None,
        created_at: now.clone(),
        updated_at: now.clone(),
        attachment_id: None,
        location: None,
    };
    ctx.todos.insert(todo.clone());
    debug!(todo_id = %todo.id, "todo created");

    let result = to_json(&todo)?;
    ctx.publish(&StreamEvent::with_todo(EventKind::Created, todo, now));
    Ok(result)
}

/// `v1:todos.get`
pub fn get(ctx: &DomainContext, args: &Args<'_>) -> HandlerResult<Value> {
    let IdArgs { id } = args.decode()?;
    let todo = ctx.todos.get(&id).ok_or_else(|| not_found(&id))?;
    to_json(&todo)
}

/// `v1:todos.list`: filtered, insertion-ordered, cursor-paged.
///
/// The cursor is the base64 of the next start index. An undecodable cursor
/// restarts from the beginning.
pub fn list(ctx: &DomainContext, args: &Args<'_>) -> HandlerResult<Value> {
    let ListArgs {
        cursor,
        limit,
        completed,
        label,
    } = args.decode()?;

    let items: Vec<Todo> = ctx
        .todos
        .list()
        .into_iter()
        .filter(|todo| completed.map_or(true, |c| todo.completed == c))
        .filter(|todo| label.as_deref().map_or(true, |l| todo.has_label(l)))
        .collect();
    let total = items.len();

    let start = cursor.as_deref().and_then(decode_cursor).unwrap_or(0);
    let page: Vec<Todo> = items.into_iter().skip(start).take(limit).collect();
    let next = start.saturating_add(limit);
    let next_cursor = (next < total).then(|| encode_cursor(next));

    Ok(json!({
        "items": to_json(&page)?,
        "cursor": next_cursor,
        "total": total,
    }))
}

/// `v1:todos.update`: merges the given fields and bumps `updatedAt`.
pub fn update(ctx: &DomainContext, args: &Args<'_>) -> HandlerResult<Value> {
    let UpdateArgs {
        id,
        title,
        description,
        due_date,
        labels,
        completed,
    } = args.decode()?;

    let now = ctx.timestamp();
    let updated = ctx
        .todos
        .update(&id, |todo| {
            if let Some(title) = title {
                todo.title = title;
            }
            if description.is_some() {
                todo.description = description;
            }
            if due_date.is_some() {
                todo.due_date = due_date;
            }
            if labels.is_some() {
                todo.labels = labels;
            }
            if let Some(completed) = completed {
                todo.completed = completed;
            }
            todo.updated_at = now;
        })
        .ok_or_else(|| not_found(&id))?;

    let result = to_json(&updated)?;
    let timestamp = updated.updated_at.clone();
    ctx.publish(&StreamEvent::with_todo(EventKind::Updated, updated, timestamp));
    Ok(result)
}

/// `v1:todos.delete`
pub fn delete(ctx: &DomainContext, args: &Args<'_>) -> HandlerResult<Value> {
    let IdArgs { id } = args.decode()?;
    ctx.todos.remove(&id).ok_or_else(|| not_found(&id))?;
    ctx.publish(&StreamEvent::deleted(id, ctx.timestamp()));
    Ok(json!({ "deleted": true }))
}

/// `v1:todos.complete`. Completing an already completed todo returns it
/// unchanged and publishes nothing.
pub fn complete(ctx: &DomainContext, args: &Args<'_>) -> HandlerResult<Value> {
    let IdArgs { id } = args.decode()?;

    let now = ctx.timestamp();
    let mut transitioned = false;
    let todo = ctx
        .todos
        .update(&id, |todo| {
            if !todo.completed {
                todo.completed = true;
                todo.completed_at = Some(now.clone());
                todo.updated_at = now.clone();
                transitioned = true;
            }
        })
        .ok_or_else(|| not_found(&id))?;

    let result = to_json(&todo)?;
    if transitioned {
        ctx.publish(&StreamEvent::with_todo(EventKind::Completed, todo, now));
    }
    Ok(result)
}

/// `v1:todos.search`: case-insensitive title substring match. Never pages.
pub fn search(ctx: &DomainContext, args: &Args<'_>) -> HandlerResult<Value> {
    let SearchArgs { query, limit } = args.decode()?;
    let needle = query.to_lowercase();

    let matches: Vec<Todo> = ctx
        .todos
        .list()
        .into_iter()
        .filter(|todo| todo.title.to_lowercase().contains(&needle))
        .collect();
    let total = matches.len();
    let page: Vec<Todo> = matches.into_iter().take(limit).collect();

    Ok(json!({
        "items": to_json(&page)?,
        "cursor": Value::Null,
        "total": total,
    }))
}

/// `v1:todos.watch`: mints a stream session for the requested filter.
pub fn watch(ctx: &DomainContext, args: &Args<'_>) -> HandlerResult<StreamGrant> {
    let WatchArgs { filter } = args.decode()?;
    let session = ctx
        .sessions
        .register(filter, ctx.clock.now_secs(), ctx.stream_ttl_secs);
    debug!(session_id = %session.session_id, filter = filter.as_str(), "watch session opened");
    Ok(StreamGrant {
        session_id: session.session_id,
        expires_at: session.expires_at,
    })
}

/// `v1:todos.attach`: stores an uploaded file (or a bare reference) and
/// links it to the todo.
///
/// A non-empty `ref` wins over an uploaded part and is recorded as an empty
/// `application/octet-stream` blob named after the reference.
pub fn attach(
    ctx: &DomainContext,
    args: &Args<'_>,
    media: Option<&MediaPart>,
) -> HandlerResult<Value> {
    let AttachArgs { todo_id, reference } = args.decode()?;
    if ctx.todos.get(&todo_id).is_none() {
        return Err(not_found(&todo_id));
    }

    let (stored, content_type) = if let Some(reference) = reference {
        let stored = ctx
            .media
            .store(Bytes::new(), REFERENCE_CONTENT_TYPE, &reference);
        (stored, REFERENCE_CONTENT_TYPE.to_string())
    } else {
        let Some(part) = media else {
            return Err(HandlerError::domain(
                "MEDIA_REQUIRED",
                "File upload or ref URI is required",
            ));
        };
        let base_type = part
            .content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim();
        if !ACCEPTED_MEDIA_TYPES.contains(&base_type) {
            return Err(HandlerError::domain(
                "UNSUPPORTED_MEDIA_TYPE",
                format!(
                    "Unsupported media type: {base_type}. Accepted: {}",
                    ACCEPTED_MEDIA_TYPES.join(", ")
                ),
            ));
        }
        if part.data.len() > MAX_MEDIA_BYTES {
            return Err(HandlerError::domain(
                "MEDIA_TOO_LARGE",
                format!("File exceeds maximum size of {MAX_MEDIA_BYTES} bytes"),
            ));
        }
        let stored = ctx.media.store(part.data.clone(), base_type, &part.filename);
        (stored, part.content_type.clone())
    };

    let now = ctx.timestamp();
    let uri = format!("/media/{}", stored.id);
    ctx.todos
        .update(&todo_id, |todo| {
            todo.attachment_id = Some(stored.id.clone());
            todo.location = Some(Location { uri });
            todo.updated_at = now;
        })
        .ok_or_else(|| not_found(&todo_id))?;
    debug!(todo_id = %todo_id, attachment_id = %stored.id, "attachment stored");

    Ok(json!({
        "todoId": todo_id,
        "attachmentId": stored.id,
        "contentType": content_type,
        "filename": stored.filename,
    }))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
