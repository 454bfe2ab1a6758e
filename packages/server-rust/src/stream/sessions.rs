//! Stream session registry.
//!
//! A session is minted by a stream-model dispatch and exchanged exactly once
//! for a live listener when the client attaches to `/streams/{sessionId}`.

use dashmap::DashMap;
use uuid::Uuid;

/// Which todo events a watcher wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StreamFilter {
    #[default]
    All,
    Completed,
    Pending,
}

impl StreamFilter {
    pub const OPTIONS: [&'static str; 3] = ["all", "completed", "pending"];

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "all" => Some(Self::All),
            "completed" => Some(Self::Completed),
            "pending" => Some(Self::Pending),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Completed => "completed",
            Self::Pending => "pending",
        }
    }

    /// Whether an event about a todo with the given completion flag passes.
    /// `None` means the event carries no todo (deletions) and always passes.
    #[must_use]
    pub fn admits(self, completed: Option<bool>) -> bool {
        match (self, completed) {
            (Self::All, _) | (_, None) => true,
            (Self::Completed, Some(done)) => done,
            (Self::Pending, Some(done)) => !done,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSession {
    pub session_id: String,
    pub filter: StreamFilter,
    /// Unix seconds.
    pub created_at: u64,
    /// Unix seconds.
    pub expires_at: u64,
}

impl StreamSession {
    #[must_use]
    pub fn is_expired(&self, now_secs: u64) -> bool {
        now_secs >= self.expires_at
    }
}

/// Why an attach was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ClaimError {
    #[error("stream session not found")]
    NotFound,
    #[error("stream session expired")]
    Expired,
}

/// Sessions waiting to be attached.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<String, StreamSession>,
}

impl SessionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mints an unguessable session id and records the session.
    pub fn register(&self, filter: StreamFilter, now_secs: u64, ttl_secs: u64) -> StreamSession {
        let session = StreamSession {
            session_id: Uuid::new_v4().to_string(),
            filter,
            created_at: now_secs,
            expires_at: now_secs.saturating_add(ttl_secs),
        };
        self.sessions
            .insert(session.session_id.clone(), session.clone());
        session
    }

    #[must_use]
    pub fn get(&self, session_id: &str) -> Option<StreamSession> {
        self.sessions.get(session_id).map(|entry| entry.clone())
    }

    /// Takes the session for attach. A session can be claimed once.
    ///
    /// # Errors
    ///
    /// [`ClaimError::NotFound`] for an unknown or already claimed id,
    /// [`ClaimError::Expired`] once `expires_at` has passed.
    pub fn claim(&self, session_id: &str, now_secs: u64) -> Result<StreamSession, ClaimError> {
        let (_, session) = self
            .sessions
            .remove(session_id)
            .ok_or(ClaimError::NotFound)?;
        if session.is_expired(now_secs) {
            return Err(ClaimError::Expired);
        }
        Ok(session)
    }

    /// Drops unclaimed sessions whose expiry has passed.
    pub fn remove_expired(&self, now_secs: u64) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, session| !session.is_expired(now_secs));
        before.saturating_sub(self.sessions.len())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
