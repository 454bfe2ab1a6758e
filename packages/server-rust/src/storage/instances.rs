//! Operation instance store: the async-job state machine plus chunk storage.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use opencall_core::{
    chunk, Chunk, ChunkResponse, ErrorBody, InstanceState, PollResponse,
};
use serde_json::Value;

/// Tracked lifecycle of one asynchronous dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationInstance {
    pub request_id: String,
    /// Distinguishes successive dispatches that reuse one `request_id`.
    pub generation: u64,
    pub op: String,
    pub state: InstanceState,
    /// Set only in `complete`.
    pub result: Option<Value>,
    /// Set only in `error`.
    pub error: Option<ErrorBody>,
    pub retry_after_ms: u64,
    /// Unix seconds.
    pub created_at: u64,
    /// Unix seconds.
    pub expires_at: u64,
    /// Non-empty only in `complete` when the result had a text rendering.
    pub chunks: Vec<Chunk>,
}

impl OperationInstance {
    /// The poll view: `retryAfterMs` only while in flight, `result`/`error`
    /// only in their terminal states, `expiresAt` always.
    #[must_use]
    pub fn poll_view(&self) -> PollResponse {
        PollResponse {
            request_id: self.request_id.clone(),
            state: self.state,
            result: match self.state {
                InstanceState::Complete => self.result.clone(),
                _ => None,
            },
            error: match self.state {
                InstanceState::Error => self.error.clone(),
                _ => None,
            },
            retry_after_ms: (!self.state.is_terminal()).then_some(self.retry_after_ms),
            expires_at: self.expires_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("operation instance {0} does not exist")]
    Unknown(String),
    #[error("operation instance {0} was replaced by a later dispatch")]
    Superseded(String),
    #[error("illegal transition {from:?} -> {to:?}")]
    Illegal {
        from: InstanceState,
        to: InstanceState,
    },
}

/// Why a chunk could not be served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkLookupError {
    NotFound,
    NotReady,
}

/// Process-wide store of operation instances, keyed by `requestId`.
///
/// Instances are never removed on their own; `expiresAt` is only enforced when
/// something calls [`InstanceStore::remove_expired`].
#[derive(Debug, Default)]
pub struct InstanceStore {
    instances: DashMap<String, OperationInstance>,
    generations: AtomicU64,
}

impl InstanceStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a new instance in the `accepted` state.
    ///
    /// A request id reused by a later async dispatch replaces the earlier
    /// instance. Transitions carry the returned `generation`, so stages still
    /// scheduled for the replaced instance cannot write into its successor.
    pub fn create(
        &self,
        request_id: &str,
        op: &str,
        retry_after_ms: u64,
        created_at: u64,
        ttl_secs: u64,
    ) -> OperationInstance {
        let instance = OperationInstance {
            request_id: request_id.to_string(),
            generation: self.generations.fetch_add(1, Ordering::Relaxed) + 1,
            op: op.to_string(),
            state: InstanceState::Accepted,
            result: None,
            error: None,
            retry_after_ms,
            created_at,
            expires_at: created_at.saturating_add(ttl_secs),
            chunks: Vec::new(),
        };
        self.instances
            .insert(request_id.to_string(), instance.clone());
        instance
    }

    #[must_use]
    pub fn get(&self, request_id: &str) -> Option<OperationInstance> {
        self.instances.get(request_id).map(|entry| entry.clone())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    fn transition<F>(
        &self,
        request_id: &str,
        generation: u64,
        next: InstanceState,
        fill: F,
    ) -> Result<(), TransitionError>
    where
        F: FnOnce(&mut OperationInstance),
    {
        let mut entry = self
            .instances
            .get_mut(request_id)
            .ok_or_else(|| TransitionError::Unknown(request_id.to_string()))?;
        if entry.generation != generation {
            return Err(TransitionError::Superseded(request_id.to_string()));
        }
        if !entry.state.can_transition_to(next) {
            return Err(TransitionError::Illegal {
                from: entry.state,
                to: next,
            });
        }
        entry.state = next;
        fill(&mut *entry);
        Ok(())
    }

    /// `accepted -> pending`.
    ///
    /// # Errors
    ///
    /// Unknown id, a replaced generation, or an instance no longer in `accepted`.
    pub fn mark_pending(&self, request_id: &str, generation: u64) -> Result<(), TransitionError> {
        self.transition(request_id, generation, InstanceState::Pending, |_| {})
    }

    /// Moves to `complete`, storing the result and, when `text` is given, the
    /// chunk chain built from it.
    ///
    /// # Errors
    ///
    /// Unknown id, a replaced generation, or an instance not in `pending`.
    pub fn complete(
        &self,
        request_id: &str,
        generation: u64,
        result: Value,
        text: Option<&str>,
        chunk_size: usize,
    ) -> Result<(), TransitionError> {
        let chunks = text.map_or_else(Vec::new, |t| chunk::build_chunks(t, chunk_size));
        self.transition(request_id, generation, InstanceState::Complete, |instance| {
            instance.result = Some(result);
            instance.chunks = chunks;
        })
    }

    /// Moves to `error`.
    ///
    /// # Errors
    ///
    /// Unknown id, a replaced generation, or an instance already terminal.
    pub fn fail(
        &self,
        request_id: &str,
        generation: u64,
        error: ErrorBody,
    ) -> Result<(), TransitionError> {
        self.transition(request_id, generation, InstanceState::Error, |instance| {
            instance.error = Some(error);
        })
    }

    #[must_use]
    pub fn poll(&self, request_id: &str) -> Option<PollResponse> {
        self.instances
            .get(request_id)
            .map(|entry| entry.poll_view())
    }

    /// Serves one chunk. The instance must be `complete` with a non-empty chain.
    ///
    /// # Errors
    ///
    /// [`ChunkLookupError::NotFound`] for an unknown id,
    /// [`ChunkLookupError::NotReady`] otherwise.
    pub fn chunk(
        &self,
        request_id: &str,
        cursor: Option<&str>,
    ) -> Result<ChunkResponse, ChunkLookupError> {
        let entry = self
            .instances
            .get(request_id)
            .ok_or(ChunkLookupError::NotFound)?;
        if entry.state != InstanceState::Complete {
            return Err(ChunkLookupError::NotReady);
        }
        let selected = chunk::select_chunk(&entry.chunks, cursor).ok_or(ChunkLookupError::NotReady)?;
        Ok(ChunkResponse {
            request_id: entry.request_id.clone(),
            chunk: selected.clone(),
        })
    }

    /// Drops instances whose `expiresAt` is at or before `now_secs`.
    pub fn remove_expired(&self, now_secs: u64) -> usize {
        let before = self.instances.len();
        self.instances.retain(|_, instance| instance.expires_at > now_secs);
        before.saturating_sub(self.instances.len())
    }
}
