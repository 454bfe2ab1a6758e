//! Stream sessions and the broadcast notifier behind `/streams/{sessionId}`.

pub mod broadcast;
pub mod sessions;

pub use broadcast::{Broadcaster, EventKind, ListenerHandle, ListenerId, OutboundFrame, StreamEvent};
pub use sessions::{ClaimError, SessionRegistry, StreamFilter, StreamSession};
