//! Error taxonomy shared by the dispatcher and operation handlers.
//!
//! Protocol-level failures carry a fixed [`ProtocolCode`] with an HTTP status.
//! Field validation failures are [`FieldError`] values whose `Display` output
//! (`"<field>: <reason>"`) is a wire contract: clients parse the field path
//! out of it. Business outcomes such as "not found" are [`DomainError`]s and are
//! never HTTP failures.

use serde::{Deserialize, Serialize};

/// Error codes the protocol itself emits. Domain codes are free-form strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolCode {
    InvalidRequest,
    UnknownOp,
    OpRemoved,
    AuthRequired,
    InsufficientScope,
    ValidationError,
    NotFound,
    NotReady,
    MethodNotAllowed,
    InternalError,
}

impl ProtocolCode {
    /// Wire representation of the code.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidRequest => "INVALID_REQUEST",
            Self::UnknownOp => "UNKNOWN_OP",
            Self::OpRemoved => "OP_REMOVED",
            Self::AuthRequired => "AUTH_REQUIRED",
            Self::InsufficientScope => "INSUFFICIENT_SCOPE",
            Self::ValidationError => "VALIDATION_ERROR",
            Self::NotFound => "NOT_FOUND",
            Self::NotReady => "NOT_READY",
            Self::MethodNotAllowed => "METHOD_NOT_ALLOWED",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// HTTP status the code is always returned with.
    #[must_use]
    pub fn status(self) -> u16 {
        match self {
            Self::InvalidRequest
            | Self::UnknownOp
            | Self::ValidationError
            | Self::NotReady => 400,
            Self::AuthRequired => 401,
            Self::InsufficientScope => 403,
            Self::NotFound => 404,
            Self::MethodNotAllowed => 405,
            Self::OpRemoved => 410,
            Self::InternalError => 500,
        }
    }
}

impl std::fmt::Display for ProtocolCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single field-level validation failure.
///
/// `field` is the full path (`labels.2` for array elements).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {reason}")]
pub struct FieldError {
    pub field: String,
    pub reason: String,
}

impl FieldError {
    #[must_use]
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn required(field: &str) -> Self {
        Self::new(field, "Required")
    }

    #[must_use]
    pub fn wrong_kind(field: &str, expected: &str, received: &str) -> Self {
        Self::new(field, format!("Expected {expected}, received {received}"))
    }
}

/// A business-logic outcome returned by a handler as an ordinary value.
///
/// Rendered as `200` with `state=error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainError {
    pub code: String,
    pub message: String,
}

impl DomainError {
    #[must_use]
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_codes_map_to_statuses() {
        assert_eq!(ProtocolCode::InvalidRequest.status(), 400);
        assert_eq!(ProtocolCode::UnknownOp.status(), 400);
        assert_eq!(ProtocolCode::OpRemoved.status(), 410);
        assert_eq!(ProtocolCode::AuthRequired.status(), 401);
        assert_eq!(ProtocolCode::InsufficientScope.status(), 403);
        assert_eq!(ProtocolCode::ValidationError.status(), 400);
        assert_eq!(ProtocolCode::NotFound.status(), 404);
        assert_eq!(ProtocolCode::NotReady.status(), 400);
        assert_eq!(ProtocolCode::MethodNotAllowed.status(), 405);
        assert_eq!(ProtocolCode::InternalError.status(), 500);
    }

    #[test]
    fn field_error_display_is_field_colon_reason() {
        assert_eq!(FieldError::required("title").to_string(), "title: Required");
        assert_eq!(
            FieldError::wrong_kind("labels.1", "string", "number").to_string(),
            "labels.1: Expected string, received number"
        );
    }
}
