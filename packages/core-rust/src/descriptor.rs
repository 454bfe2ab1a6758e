//! Operation descriptors: the immutable per-operation metadata the dispatcher
//! consults before any handler runs, and the discovery entry rendered from it.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// How a dispatch of an operation is answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionModel {
    /// Answered in-line with `state=complete`.
    Sync,
    /// Answered with `202 accepted`; observed through polling.
    Async,
    /// Answered with `202 streaming` and an out-of-band session.
    Stream,
}

impl ExecutionModel {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sync => "sync",
            Self::Async => "async",
            Self::Stream => "stream",
        }
    }
}

impl std::fmt::Display for ExecutionModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Extra discovery fields for stream operations.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamOptions {
    pub supported_transports: Vec<String>,
    pub supported_encodings: Vec<String>,
    pub frame_schema: Value,
    pub ttl_seconds: u64,
}

/// Static metadata for one named operation.
///
/// Built once at startup with the `with_*` methods and never mutated after
/// registration.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationDescriptor {
    pub op: String,
    pub description: String,
    pub execution_model: ExecutionModel,
    pub side_effecting: bool,
    pub idempotency_required: bool,
    /// Empty means public.
    pub auth_scopes: Vec<String>,
    pub accepts_media: bool,
    pub deprecated: bool,
    pub sunset: Option<NaiveDate>,
    pub replacement: Option<String>,
    pub args_schema: Value,
    pub result_schema: Value,
    pub media_schema: Option<Value>,
    pub stream: Option<StreamOptions>,
}

impl OperationDescriptor {
    #[must_use]
    pub fn new(op: impl Into<String>, execution_model: ExecutionModel) -> Self {
        Self {
            op: op.into(),
            description: String::new(),
            execution_model,
            side_effecting: false,
            idempotency_required: false,
            auth_scopes: Vec::new(),
            accepts_media: false,
            deprecated: false,
            sunset: None,
            replacement: None,
            args_schema: json!({ "type": "object" }),
            result_schema: json!({ "type": "object" }),
            media_schema: None,
            stream: None,
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Marks the operation side-effecting. Side-effecting operations honor
    /// idempotency keys and advertise `idempotencyRequired`.
    #[must_use]
    pub fn side_effecting(mut self) -> Self {
        self.side_effecting = true;
        self.idempotency_required = true;
        self
    }

    #[must_use]
    pub fn with_scopes(mut self, scopes: &[&str]) -> Self {
        self.auth_scopes = scopes.iter().map(ToString::to_string).collect();
        self
    }

    #[must_use]
    pub fn with_media(mut self, media_schema: Value) -> Self {
        self.accepts_media = true;
        self.media_schema = Some(media_schema);
        self
    }

    #[must_use]
    pub fn deprecated(mut self, sunset: Option<NaiveDate>, replacement: Option<&str>) -> Self {
        self.deprecated = true;
        self.sunset = sunset;
        self.replacement = replacement.map(str::to_string);
        self
    }

    #[must_use]
    pub fn with_schemas(mut self, args: Value, result: Value) -> Self {
        self.args_schema = args;
        self.result_schema = result;
        self
    }

    #[must_use]
    pub fn with_stream(mut self, options: StreamOptions) -> Self {
        self.stream = Some(options);
        self
    }

    /// Unix milliseconds of midnight UTC on the sunset date.
    #[must_use]
    pub fn sunset_millis(&self) -> Option<u64> {
        let midnight = self.sunset?.and_hms_opt(0, 0, 0)?.and_utc();
        u64::try_from(midnight.timestamp_millis()).ok()
    }

    /// Whether the operation has passed its sunset and must answer `OP_REMOVED`.
    ///
    /// Only deprecated operations with a sunset date can be removed.
    #[must_use]
    pub fn is_removed(&self, now_millis: u64) -> bool {
        self.deprecated && self.sunset_millis().is_some_and(|sunset| now_millis > sunset)
    }

    /// Renders the `/.well-known/ops` entry for this operation.
    #[must_use]
    pub fn discovery_entry(&self) -> Value {
        let mut entry = Map::new();
        entry.insert("op".into(), json!(self.op));
        entry.insert("description".into(), json!(self.description));
        entry.insert("argsSchema".into(), self.args_schema.clone());
        entry.insert("resultSchema".into(), self.result_schema.clone());
        entry.insert("sideEffecting".into(), json!(self.side_effecting));
        entry.insert("idempotencyRequired".into(), json!(self.idempotency_required));
        entry.insert("executionModel".into(), json!(self.execution_model));
        entry.insert("authScopes".into(), json!(self.auth_scopes));

        if self.deprecated {
            entry.insert("deprecated".into(), json!(true));
            if let Some(sunset) = self.sunset {
                entry.insert("sunset".into(), json!(sunset.format("%Y-%m-%d").to_string()));
            }
            if let Some(replacement) = &self.replacement {
                entry.insert("replacement".into(), json!(replacement));
            }
        }
        if let Some(stream) = &self.stream {
            entry.insert("supportedTransports".into(), json!(stream.supported_transports));
            entry.insert("supportedEncodings".into(), json!(stream.supported_encodings));
            entry.insert("frameSchema".into(), stream.frame_schema.clone());
            entry.insert("ttlSeconds".into(), json!(stream.ttl_seconds));
        }
        if let Some(media) = &self.media_schema {
            entry.insert("mediaSchema".into(), media.clone());
        }

        Value::Object(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jan_first_2025() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()
    }

    #[test]
    fn sunset_is_midnight_utc() {
        let desc = OperationDescriptor::new("v1:old", ExecutionModel::Sync)
            .deprecated(Some(jan_first_2025()), Some("v1:new"));
        // 2025-01-01T00:00:00Z
        assert_eq!(desc.sunset_millis(), Some(1_735_689_600_000));
        assert!(!desc.is_removed(1_735_689_600_000));
        assert!(desc.is_removed(1_735_689_600_001));
        assert!(!desc.is_removed(1_700_000_000_000));
    }

    #[test]
    fn not_removed_without_deprecation_or_sunset() {
        let mut desc = OperationDescriptor::new("v1:x", ExecutionModel::Sync);
        desc.sunset = Some(jan_first_2025());
        assert!(!desc.is_removed(u64::MAX));

        let desc = OperationDescriptor::new("v1:y", ExecutionModel::Sync).deprecated(None, None);
        assert!(!desc.is_removed(u64::MAX));
    }

    #[test]
    fn discovery_entry_has_core_fields() {
        let desc = OperationDescriptor::new("v1:todos.create", ExecutionModel::Sync)
            .with_description("Create a new todo item")
            .side_effecting()
            .with_scopes(&["todos:write"]);
        let entry = desc.discovery_entry();
        assert_eq!(entry["op"], "v1:todos.create");
        assert_eq!(entry["executionModel"], "sync");
        assert_eq!(entry["sideEffecting"], true);
        assert_eq!(entry["idempotencyRequired"], true);
        assert_eq!(entry["authScopes"], json!(["todos:write"]));
        assert!(entry.get("deprecated").is_none());
        assert!(entry.get("mediaSchema").is_none());
    }

    #[test]
    fn discovery_entry_includes_deprecation_and_stream_options() {
        let desc = OperationDescriptor::new("v1:todos.watch", ExecutionModel::Stream)
            .with_stream(StreamOptions {
                supported_transports: vec!["wss".into()],
                supported_encodings: vec!["json".into()],
                frame_schema: json!({ "type": "object" }),
                ttl_seconds: 3600,
            })
            .deprecated(Some(jan_first_2025()), Some("v1:todos.list"));
        let entry = desc.discovery_entry();
        assert_eq!(entry["executionModel"], "stream");
        assert_eq!(entry["sunset"], "2025-01-01");
        assert_eq!(entry["replacement"], "v1:todos.list");
        assert_eq!(entry["supportedTransports"], json!(["wss"]));
        assert_eq!(entry["ttlSeconds"], 3600);
    }
}
