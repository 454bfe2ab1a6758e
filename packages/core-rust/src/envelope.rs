//! Request and response wire types for envelope dispatch.
//!
//! All structs use `#[serde(rename_all = "camelCase")]` to match the JSON
//! field names clients send and parse (`requestId`, `retryAfterMs`, ...).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::chunk::Chunk;
use crate::error::{DomainError, ProtocolCode};

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// Optional per-call context carried in `envelope.ctx`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallContext {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub idempotency_key: Option<String>,
}

/// A request envelope as received from the client.
///
/// `op` stays loosely typed so the dispatcher can reject a missing or
/// non-string name with `INVALID_REQUEST` instead of failing deserialization.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Envelope {
    pub op: Value,
    pub args: Map<String, Value>,
    pub ctx: CallContext,
}

impl Envelope {
    /// Builds an envelope for a named operation.
    #[must_use]
    pub fn new(op: &str, args: Value) -> Self {
        Self {
            op: Value::String(op.to_string()),
            args: match args {
                Value::Object(map) => map,
                _ => Map::new(),
            },
            ctx: CallContext::default(),
        }
    }

    #[must_use]
    pub fn with_ctx(mut self, ctx: CallContext) -> Self {
        self.ctx = ctx;
        self
    }

    /// Reads an envelope out of an arbitrary JSON document without failing.
    ///
    /// Non-object `args` are treated as empty. Context fields of the wrong
    /// type are ignored, matching how an absent field is treated.
    #[must_use]
    pub fn from_json(doc: Value) -> Self {
        let Value::Object(mut root) = doc else {
            return Self::default();
        };

        let op = root.remove("op").unwrap_or(Value::Null);
        let args = match root.remove("args") {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        };
        let ctx = match root.remove("ctx") {
            Some(Value::Object(map)) => {
                let text = |key: &str| map.get(key).and_then(Value::as_str).map(str::to_string);
                CallContext {
                    request_id: text("requestId"),
                    session_id: text("sessionId"),
                    idempotency_key: text("idempotencyKey"),
                }
            }
            _ => CallContext::default(),
        };

        Self { op, args, ctx }
    }

    /// The operation name, if present as a non-empty string.
    #[must_use]
    pub fn op_name(&self) -> Option<&str> {
        self.op.as_str().filter(|s| !s.is_empty())
    }
}

// ---------------------------------------------------------------------------
// Response
// ---------------------------------------------------------------------------

/// Outcome state reported in an envelope response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseState {
    Complete,
    Error,
    Accepted,
    Streaming,
}

impl ResponseState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Complete => "complete",
            Self::Error => "error",
            Self::Accepted => "accepted",
            Self::Streaming => "streaming",
        }
    }
}

/// Structured error cause attached to `OP_REMOVED`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorCause {
    pub removed_op: String,
    pub replacement: Option<String>,
}

/// The `error` object of a response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub cause: Option<ErrorCause>,
}

impl ErrorBody {
    #[must_use]
    pub fn protocol(code: ProtocolCode, message: impl Into<String>) -> Self {
        Self::new(code.as_str(), message)
    }

    #[must_use]
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            cause: None,
        }
    }

    #[must_use]
    pub fn with_cause(mut self, cause: ErrorCause) -> Self {
        self.cause = Some(cause);
        self
    }
}

impl From<DomainError> for ErrorBody {
    fn from(err: DomainError) -> Self {
        Self::new(err.code, err.message)
    }
}

/// Out-of-band channel description returned for stream operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamDescriptor {
    pub transport: String,
    pub location: String,
    pub session_id: String,
    pub encoding: String,
    /// Unix seconds.
    pub expires_at: u64,
}

/// Identity echoed on every response to a call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallIdentity {
    pub request_id: String,
    pub session_id: Option<String>,
}

impl CallIdentity {
    #[must_use]
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            session_id: None,
        }
    }
}

/// Normalized response body for every dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeResponse {
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub session_id: Option<String>,
    pub state: ResponseState,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<ErrorBody>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub retry_after_ms: Option<u64>,
    /// Unix seconds.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub expires_at: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub stream: Option<StreamDescriptor>,
}

impl EnvelopeResponse {
    fn bare(id: &CallIdentity, state: ResponseState) -> Self {
        Self {
            request_id: id.request_id.clone(),
            session_id: id.session_id.clone(),
            state,
            result: None,
            error: None,
            retry_after_ms: None,
            expires_at: None,
            stream: None,
        }
    }

    #[must_use]
    pub fn complete(id: &CallIdentity, result: Value) -> Self {
        Self {
            result: Some(result),
            ..Self::bare(id, ResponseState::Complete)
        }
    }

    #[must_use]
    pub fn failed(id: &CallIdentity, error: ErrorBody) -> Self {
        Self {
            error: Some(error),
            ..Self::bare(id, ResponseState::Error)
        }
    }

    #[must_use]
    pub fn accepted(id: &CallIdentity, retry_after_ms: u64, expires_at: u64) -> Self {
        Self {
            retry_after_ms: Some(retry_after_ms),
            expires_at: Some(expires_at),
            ..Self::bare(id, ResponseState::Accepted)
        }
    }

    #[must_use]
    pub fn streaming(id: &CallIdentity, stream: StreamDescriptor) -> Self {
        Self {
            stream: Some(stream),
            ..Self::bare(id, ResponseState::Streaming)
        }
    }
}

/// A dispatch result: HTTP status plus normalized body.
#[derive(Debug, Clone, PartialEq)]
pub struct CallResponse {
    pub status: u16,
    pub body: EnvelopeResponse,
}

impl CallResponse {
    #[must_use]
    pub fn new(status: u16, body: EnvelopeResponse) -> Self {
        Self { status, body }
    }

    /// A protocol failure with the code's fixed status.
    #[must_use]
    pub fn protocol_error(id: &CallIdentity, code: ProtocolCode, message: impl Into<String>) -> Self {
        Self::new(
            code.status(),
            EnvelopeResponse::failed(id, ErrorBody::protocol(code, message)),
        )
    }
}

// ---------------------------------------------------------------------------
// Operation instances
// ---------------------------------------------------------------------------

/// Lifecycle state of an asynchronous operation instance.
///
/// Transitions are monotonic: `accepted -> pending -> complete | error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceState {
    Accepted,
    Pending,
    Complete,
    Error,
}

impl InstanceState {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Error)
    }

    /// Whether `next` is a legal forward transition from `self`.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        match self {
            // `error` directly from `accepted` covers work that never got scheduled.
            Self::Accepted => matches!(next, Self::Pending | Self::Error),
            Self::Pending => next.is_terminal(),
            Self::Complete | Self::Error => false,
        }
    }
}

/// Body of `GET /ops/{requestId}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollResponse {
    pub request_id: String,
    pub state: InstanceState,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<ErrorBody>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub retry_after_ms: Option<u64>,
    pub expires_at: u64,
}

/// Body of `GET /ops/{requestId}/chunks`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkResponse {
    pub request_id: String,
    pub chunk: Chunk,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn from_json_reads_op_args_and_ctx() {
        let env = Envelope::from_json(json!({
            "op": "v1:todos.create",
            "args": { "title": "Buy milk" },
            "ctx": { "requestId": "r-1", "idempotencyKey": "k-1" }
        }));
        assert_eq!(env.op_name(), Some("v1:todos.create"));
        assert_eq!(env.args["title"], "Buy milk");
        assert_eq!(env.ctx.request_id.as_deref(), Some("r-1"));
        assert_eq!(env.ctx.idempotency_key.as_deref(), Some("k-1"));
        assert!(env.ctx.session_id.is_none());
    }

    #[test]
    fn from_json_tolerates_malformed_parts() {
        let env = Envelope::from_json(json!({ "op": 42, "args": [1, 2], "ctx": "nope" }));
        assert!(env.op_name().is_none());
        assert!(env.args.is_empty());
        assert_eq!(env.ctx, CallContext::default());

        let env = Envelope::from_json(json!(["not", "an", "object"]));
        assert!(env.op_name().is_none());

        let env = Envelope::from_json(json!({ "op": "" }));
        assert!(env.op_name().is_none());
    }

    #[test]
    fn ctx_fields_of_wrong_type_are_ignored() {
        let env = Envelope::from_json(json!({
            "op": "x",
            "ctx": { "requestId": 7, "sessionId": "s-1" }
        }));
        assert!(env.ctx.request_id.is_none());
        assert_eq!(env.ctx.session_id.as_deref(), Some("s-1"));
    }

    #[test]
    fn complete_response_omits_absent_fields() {
        let id = CallIdentity::new("r-1");
        let body = EnvelopeResponse::complete(&id, json!({ "ok": true }));
        let wire = serde_json::to_value(&body).unwrap();
        assert_eq!(
            wire,
            json!({ "requestId": "r-1", "state": "complete", "result": { "ok": true } })
        );
    }

    #[test]
    fn removed_op_cause_serializes_null_replacement() {
        let id = CallIdentity {
            request_id: "r-2".into(),
            session_id: Some("s-9".into()),
        };
        let error = ErrorBody::protocol(ProtocolCode::OpRemoved, "gone").with_cause(ErrorCause {
            removed_op: "v1:old".into(),
            replacement: None,
        });
        let wire = serde_json::to_value(EnvelopeResponse::failed(&id, error)).unwrap();
        assert_eq!(wire["sessionId"], "s-9");
        assert_eq!(wire["error"]["code"], "OP_REMOVED");
        assert_eq!(wire["error"]["cause"]["removedOp"], "v1:old");
        assert!(wire["error"]["cause"]["replacement"].is_null());
    }

    #[test]
    fn accepted_response_carries_retry_and_expiry() {
        let wire =
            serde_json::to_value(EnvelopeResponse::accepted(&CallIdentity::new("r"), 100, 42)).unwrap();
        assert_eq!(wire["state"], "accepted");
        assert_eq!(wire["retryAfterMs"], 100);
        assert_eq!(wire["expiresAt"], 42);
    }

    #[test]
    fn instance_transitions_are_monotonic() {
        use InstanceState::{Accepted, Complete, Error, Pending};
        assert!(Accepted.can_transition_to(Pending));
        assert!(Accepted.can_transition_to(Error));
        assert!(!Accepted.can_transition_to(Complete));
        assert!(Pending.can_transition_to(Complete));
        assert!(Pending.can_transition_to(Error));
        assert!(!Pending.can_transition_to(Accepted));
        assert!(!Pending.can_transition_to(Pending));
        assert!(!Complete.can_transition_to(Error));
        assert!(!Error.can_transition_to(Complete));
        assert!(Complete.is_terminal() && Error.is_terminal());
    }
}
