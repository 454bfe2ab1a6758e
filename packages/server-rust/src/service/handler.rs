//! Handler contracts for the three execution models.
//!
//! Handlers receive validated-on-read [`Args`] and return ordinary values.
//! Business outcomes such as "not found" are [`HandlerError::Domain`] and are
//! answered with `200 state=error`; everything else in [`HandlerError`] is a
//! protocol failure with a non-200 status.

use bytes::Bytes;
use opencall_core::{Args, DomainError, FieldError};
use serde_json::Value;

pub type HandlerResult<T> = Result<T, HandlerError>;

/// Failure modes a handler can report.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// Business outcome, rendered as `200` with `state=error`.
    #[error("{}: {}", .0.code, .0.message)]
    Domain(DomainError),
    /// Argument validation failure, rendered as `400 VALIDATION_ERROR`.
    #[error(transparent)]
    Validation(#[from] FieldError),
    /// Explicit failure with a caller-chosen status and code.
    #[error("{code}: {message}")]
    Operational {
        status: u16,
        code: String,
        message: String,
    },
    /// Anything unexpected. Rendered as `500 INTERNAL_ERROR` with a generic
    /// message; the cause is only logged.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl HandlerError {
    #[must_use]
    pub fn domain(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Domain(DomainError::new(code, message))
    }

    #[must_use]
    pub fn operational(status: u16, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Operational {
            status,
            code: code.into(),
            message: message.into(),
        }
    }
}

impl From<DomainError> for HandlerError {
    fn from(err: DomainError) -> Self {
        Self::Domain(err)
    }
}

/// An uploaded file delivered alongside the envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaPart {
    pub data: Bytes,
    /// Content type as sent by the client, parameters included.
    pub content_type: String,
    pub filename: String,
}

// ---------------------------------------------------------------------------
// Async jobs
// ---------------------------------------------------------------------------

/// Result of a finished async job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobOutput {
    pub result: Value,
    /// Flat-text rendering of the result. When present, the completed
    /// instance carries a chunk chain built from it.
    pub text: Option<String>,
}

impl JobOutput {
    #[must_use]
    pub fn new(result: Value) -> Self {
        Self { result, text: None }
    }

    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }
}

/// Deferred work returned by [`AsyncHandler::prepare`]. Runs once, later, off
/// the request path.
pub struct AsyncJob(Box<dyn FnOnce() -> HandlerResult<JobOutput> + Send + 'static>);

impl AsyncJob {
    pub fn new<F>(work: F) -> Self
    where
        F: FnOnce() -> HandlerResult<JobOutput> + Send + 'static,
    {
        Self(Box::new(work))
    }

    /// Consumes the job and runs it on the current thread.
    ///
    /// # Errors
    ///
    /// Whatever the job itself reports.
    pub fn run(self) -> HandlerResult<JobOutput> {
        (self.0)()
    }
}

impl std::fmt::Debug for AsyncJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AsyncJob")
    }
}

/// A freshly opened stream session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamGrant {
    pub session_id: String,
    /// Unix seconds.
    pub expires_at: u64,
}

// ---------------------------------------------------------------------------
// Handler traits
// ---------------------------------------------------------------------------

/// Answers a call in-line.
pub trait SyncHandler: Send + Sync + 'static {
    /// `media` is only passed to operations whose descriptor accepts media.
    ///
    /// # Errors
    ///
    /// See [`HandlerError`].
    fn call(&self, args: &Args<'_>, media: Option<&MediaPart>) -> HandlerResult<Value>;
}

/// Validates a call and hands back the work to run in the background.
pub trait AsyncHandler: Send + Sync + 'static {
    /// Validation happens here, synchronously, so argument errors are still
    /// reported as `400 VALIDATION_ERROR` on the dispatch itself.
    ///
    /// # Errors
    ///
    /// See [`HandlerError`].
    fn prepare(&self, args: &Args<'_>, request_id: &str) -> HandlerResult<AsyncJob>;
}

/// Opens an out-of-band stream session.
pub trait StreamHandler: Send + Sync + 'static {
    /// # Errors
    ///
    /// See [`HandlerError`].
    fn open(&self, args: &Args<'_>) -> HandlerResult<StreamGrant>;
}

impl<F> SyncHandler for F
where
    F: Fn(&Args<'_>, Option<&MediaPart>) -> HandlerResult<Value> + Send + Sync + 'static,
{
    fn call(&self, args: &Args<'_>, media: Option<&MediaPart>) -> HandlerResult<Value> {
        self(args, media)
    }
}

impl<F> AsyncHandler for F
where
    F: Fn(&Args<'_>, &str) -> HandlerResult<AsyncJob> + Send + Sync + 'static,
{
    fn prepare(&self, args: &Args<'_>, request_id: &str) -> HandlerResult<AsyncJob> {
        self(args, request_id)
    }
}

impl<F> StreamHandler for F
where
    F: Fn(&Args<'_>) -> HandlerResult<StreamGrant> + Send + Sync + 'static,
{
    fn open(&self, args: &Args<'_>) -> HandlerResult<StreamGrant> {
        self(args)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Map};

    use super::*;

    #[test]
    fn field_error_converts_to_validation() {
        let err: HandlerError = FieldError::required("title").into();
        assert!(matches!(err, HandlerError::Validation(_)));
        assert_eq!(err.to_string(), "title: Required");
    }

    #[test]
    fn domain_error_display() {
        let err = HandlerError::domain("TODO_NOT_FOUND", "missing");
        assert_eq!(err.to_string(), "TODO_NOT_FOUND: missing");
    }

    fn echo_title(args: &Args<'_>, _media: Option<&MediaPart>) -> HandlerResult<Value> {
        Ok(json!({ "title": args.required_string("title")? }))
    }

    fn echo_request_id(_args: &Args<'_>, id: &str) -> HandlerResult<AsyncJob> {
        let id = id.to_string();
        Ok(AsyncJob::new(move || Ok(JobOutput::new(json!(id)))))
    }

    #[test]
    fn functions_implement_handler_traits() {
        let map: Map<String, Value> = json!({ "title": "x" }).as_object().cloned().unwrap();
        assert_eq!(
            SyncHandler::call(&echo_title, &Args::new(&map), None).unwrap(),
            json!({ "title": "x" })
        );

        let prepared = AsyncHandler::prepare(&echo_request_id, &Args::new(&map), "r-1").unwrap();
        assert_eq!(prepared.run().unwrap().result, json!("r-1"));
    }

    #[test]
    fn job_output_text_is_optional() {
        let plain = JobOutput::new(json!({}));
        assert!(plain.text.is_none());
        let chunkable = JobOutput::new(json!({})).with_text("a,b");
        assert_eq!(chunkable.text.as_deref(), Some("a,b"));
    }
}
