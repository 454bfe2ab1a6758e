//! Bearer-token authorization collaborator.

use std::collections::HashSet;

use dashmap::DashMap;
use opencall_core::ProtocolCode;

/// Why a call was not authorized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("Authorization header with Bearer token is required")]
    MissingCredential,
    #[error("Invalid or expired token")]
    InvalidToken,
    #[error("Token lacks required scopes: {}", .required.join(", "))]
    InsufficientScope { required: Vec<String> },
}

impl AuthError {
    #[must_use]
    pub fn code(&self) -> ProtocolCode {
        match self {
            Self::MissingCredential | Self::InvalidToken => ProtocolCode::AuthRequired,
            Self::InsufficientScope { .. } => ProtocolCode::InsufficientScope,
        }
    }
}

/// Decides whether a presented credential grants a set of scopes.
pub trait AuthValidator: Send + Sync + 'static {
    /// `credential` is the raw `Authorization` header value, if any.
    /// An empty `required` set always passes.
    ///
    /// # Errors
    ///
    /// See [`AuthError`].
    fn validate(&self, credential: Option<&str>, required: &[String]) -> Result<(), AuthError>;
}

/// Accepts every call. Used when no authorization is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenAccess;

impl AuthValidator for OpenAccess {
    fn validate(&self, _credential: Option<&str>, _required: &[String]) -> Result<(), AuthError> {
        Ok(())
    }
}

/// In-memory map of bearer token to granted scopes.
#[derive(Debug, Default)]
pub struct TokenStore {
    tokens: DashMap<String, HashSet<String>>,
}

impl TokenStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `token`, replacing any scopes it had before.
    pub fn register<I, S>(&self, token: impl Into<String>, scopes: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tokens
            .insert(token.into(), scopes.into_iter().map(Into::into).collect());
    }

    pub fn clear(&self) {
        self.tokens.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl AuthValidator for TokenStore {
    fn validate(&self, credential: Option<&str>, required: &[String]) -> Result<(), AuthError> {
        if required.is_empty() {
            return Ok(());
        }

        let token = credential
            .and_then(|header| header.strip_prefix("Bearer "))
            .ok_or(AuthError::MissingCredential)?;
        let granted = self.tokens.get(token).ok_or(AuthError::InvalidToken)?;

        if required.iter().all(|scope| granted.contains(scope)) {
            Ok(())
        } else {
            Err(AuthError::InsufficientScope {
                required: required.to_vec(),
            })
        }
    }
}
