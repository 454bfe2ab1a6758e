//! Listener registry and best-effort event fan-out.
//!
//! Every attached stream gets a bounded mpsc mailbox. The WebSocket write loop
//! holds the receiver; [`Broadcaster`] holds the sender. Publishing never
//! blocks: a listener whose mailbox is full or whose receiver is gone is
//! disconnected and pruned.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::debug;

use super::sessions::{StreamFilter, StreamSession};
use crate::storage::todos::Todo;

/// Identifies one attached listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// Frame queued for a listener's socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    /// A JSON-encoded event.
    Event(String),
    /// A close frame with an optional reason.
    Close(Option<String>),
}

/// Kind of mutation an event reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Created,
    Updated,
    Deleted,
    Completed,
}

/// Event frame pushed to listeners: `{event, todo | todoId, timestamp}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamEvent {
    pub event: EventKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub todo: Option<Todo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub todo_id: Option<String>,
    /// ISO-8601 timestamp.
    pub timestamp: String,
}

impl StreamEvent {
    #[must_use]
    pub fn with_todo(event: EventKind, todo: Todo, timestamp: String) -> Self {
        Self {
            event,
            todo: Some(todo),
            todo_id: None,
            timestamp,
        }
    }

    #[must_use]
    pub fn deleted(todo_id: impl Into<String>, timestamp: String) -> Self {
        Self {
            event: EventKind::Deleted,
            todo: None,
            todo_id: Some(todo_id.into()),
            timestamp,
        }
    }

    fn completed_flag(&self) -> Option<bool> {
        self.todo.as_ref().map(|todo| todo.completed)
    }
}

/// Sender side of one listener.
#[derive(Debug)]
pub struct ListenerHandle {
    pub id: ListenerId,
    pub session_id: String,
    pub filter: StreamFilter,
    tx: mpsc::Sender<OutboundFrame>,
}

impl ListenerHandle {
    /// Enqueues without waiting. `false` when the mailbox is full or closed.
    #[must_use]
    pub fn try_send(&self, frame: OutboundFrame) -> bool {
        self.tx.try_send(frame).is_ok()
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// All active listeners.
#[derive(Debug)]
pub struct Broadcaster {
    listeners: DashMap<ListenerId, Arc<ListenerHandle>>,
    next_id: AtomicU64,
    mailbox_capacity: usize,
}

impl Broadcaster {
    /// `mailbox_capacity` is clamped to at least one slot.
    #[must_use]
    pub fn new(mailbox_capacity: usize) -> Self {
        Self {
            listeners: DashMap::new(),
            next_id: AtomicU64::new(1),
            mailbox_capacity: mailbox_capacity.max(1),
        }
    }

    /// Registers a listener for a claimed session and returns its mailbox.
    pub fn register(
        &self,
        session: &StreamSession,
    ) -> (Arc<ListenerHandle>, mpsc::Receiver<OutboundFrame>) {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel(self.mailbox_capacity);
        let handle = Arc::new(ListenerHandle {
            id,
            session_id: session.session_id.clone(),
            filter: session.filter,
            tx,
        });
        self.listeners.insert(id, Arc::clone(&handle));
        (handle, rx)
    }

    pub fn remove(&self, id: ListenerId) -> Option<Arc<ListenerHandle>> {
        self.listeners.remove(&id).map(|(_, handle)| handle)
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.listeners.len()
    }

    /// Pushes `event` to every listener whose filter admits it. Returns how
    /// many listeners accepted the frame.
    pub fn publish(&self, event: &StreamEvent) -> usize {
        let frame = match serde_json::to_string(event) {
            Ok(frame) => frame,
            Err(err) => {
                debug!(error = %err, "dropping unserializable stream event");
                return 0;
            }
        };
        let admitted = event.completed_flag();

        let mut delivered = 0;
        let mut dead = Vec::new();
        for entry in &self.listeners {
            let handle = entry.value();
            if !handle.filter.admits(admitted) {
                continue;
            }
            if handle.try_send(OutboundFrame::Event(frame.clone())) {
                delivered += 1;
            } else {
                dead.push(handle.id);
            }
        }

        // Pruned outside the iteration: removing while DashMap holds a shard
        // read guard would deadlock.
        for id in dead {
            debug!(listener = id.0, "pruning stream listener");
            self.listeners.remove(&id);
        }
        delivered
    }

    /// Removes and returns every listener. Used during graceful shutdown.
    pub fn drain_all(&self) -> Vec<Arc<ListenerHandle>> {
        let keys: Vec<ListenerId> = self.listeners.iter().map(|entry| *entry.key()).collect();
        keys.into_iter()
            .filter_map(|key| self.listeners.remove(&key).map(|(_, handle)| handle))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(filter: StreamFilter) -> StreamSession {
        StreamSession {
            session_id: format!("s-{}", filter.as_str()),
            filter,
            created_at: 0,
            expires_at: 3_600,
        }
    }

    fn todo(completed: bool) -> Todo {
        Todo {
            id: "t1".into(),
            title: "Buy milk".into(),
            description: None,
            due_date: None,
            labels: None,
            completed,
            completed_at: None,
            created_at: "2026-01-01T00:00:00.000Z".into(),
            updated_at: "2026-01-01T00:00:00.000Z".into(),
            attachment_id: None,
            location: None,
        }
    }

    fn event(completed: bool) -> StreamEvent {
        StreamEvent::with_todo(EventKind::Updated, todo(completed), "now".into())
    }

    #[test]
    fn register_assigns_sequential_ids() {
        let broadcaster = Broadcaster::new(4);
        let (a, _ra) = broadcaster.register(&session(StreamFilter::All));
        let (b, _rb) = broadcaster.register(&session(StreamFilter::All));
        assert_eq!(a.id, ListenerId(1));
        assert_eq!(b.id, ListenerId(2));
        assert_eq!(broadcaster.count(), 2);
    }

    #[test]
    fn publish_respects_filters() {
        let broadcaster = Broadcaster::new(4);
        let (_, mut all) = broadcaster.register(&session(StreamFilter::All));
        let (_, mut done) = broadcaster.register(&session(StreamFilter::Completed));
        let (_, mut open) = broadcaster.register(&session(StreamFilter::Pending));

        assert_eq!(broadcaster.publish(&event(true)), 2);
        assert!(all.try_recv().is_ok());
        assert!(done.try_recv().is_ok());
        assert!(open.try_recv().is_err());

        assert_eq!(broadcaster.publish(&StreamEvent::deleted("t1", "now".into())), 3);
    }

    #[test]
    fn frames_are_json_events() {
        let broadcaster = Broadcaster::new(4);
        let (_, mut rx) = broadcaster.register(&session(StreamFilter::All));
        broadcaster.publish(&StreamEvent::deleted("t9", "2026-01-01T00:00:00.000Z".into()));

        let OutboundFrame::Event(text) = rx.try_recv().unwrap() else {
            panic!("expected an event frame");
        };
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["event"], "deleted");
        assert_eq!(value["todoId"], "t9");
        assert!(value.get("todo").is_none());
    }

    #[test]
    fn full_mailbox_disconnects_listener() {
        let broadcaster = Broadcaster::new(1);
        let (_, _rx) = broadcaster.register(&session(StreamFilter::All));

        assert_eq!(broadcaster.publish(&event(false)), 1);
        assert_eq!(broadcaster.publish(&event(false)), 0);
        assert_eq!(broadcaster.count(), 0);
    }

    #[test]
    fn closed_receiver_is_pruned() {
        let broadcaster = Broadcaster::new(4);
        let (handle, rx) = broadcaster.register(&session(StreamFilter::All));
        drop(rx);
        assert!(!handle.is_connected());

        assert_eq!(broadcaster.publish(&event(false)), 0);
        assert_eq!(broadcaster.count(), 0);
    }

    #[test]
    fn per_listener_order_matches_publish_order() {
        let broadcaster = Broadcaster::new(8);
        let (_, mut rx) = broadcaster.register(&session(StreamFilter::All));
        broadcaster.publish(&StreamEvent::deleted("a", "now".into()));
        broadcaster.publish(&StreamEvent::deleted("b", "now".into()));

        let ids: Vec<String> = std::iter::from_fn(|| rx.try_recv().ok())
            .filter_map(|frame| match frame {
                OutboundFrame::Event(text) => {
                    let value: serde_json::Value = serde_json::from_str(&text).ok()?;
                    value["todoId"].as_str().map(str::to_string)
                }
                OutboundFrame::Close(_) => None,
            })
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn drain_all_empties_registry() {
        let broadcaster = Broadcaster::new(4);
        let (_, _r1) = broadcaster.register(&session(StreamFilter::All));
        let (_, _r2) = broadcaster.register(&session(StreamFilter::Pending));
        assert_eq!(broadcaster.drain_all().len(), 2);
        assert_eq!(broadcaster.count(), 0);
    }
}
