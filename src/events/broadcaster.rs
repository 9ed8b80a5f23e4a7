//! Server-side event fan-out.
//!
//! One broadcast channel per session. Publishing is append-only and
//! fire-and-forget: events published with no subscriber attached are
//! dropped, so a late-connecting listener only observes subsequent events.
//! Publish order is preserved per session; nothing is guaranteed across
//! sessions.

use std::collections::HashMap;
use std::sync::RwLock;

use tokio::sync::broadcast;
use uuid::Uuid;

use super::types::{Envelope, Event};

/// Per-subscriber buffer before the slowest subscriber starts lagging.
const CHANNEL_CAPACITY: usize = 256;

pub struct EventBroadcaster {
    channels: RwLock<HashMap<Uuid, broadcast::Sender<Envelope>>>,
}

impl EventBroadcaster {
    pub fn new() -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
        }
    }

    /// Publish an event for a session. Fire-and-forget: a send with no
    /// live subscriber is not an error.
    pub fn publish(&self, session_id: Uuid, event: Event) {
        let envelope = event.into_envelope();
        let sender = self.sender(session_id);
        match sender.send(envelope) {
            Ok(receivers) => {
                tracing::trace!(session_id = %session_id, receivers, "Event published");
            }
            Err(_) => {
                // No subscriber attached — the event is simply not observed.
                tracing::trace!(session_id = %session_id, "Event published with no subscribers");
            }
        }
    }

    /// Subscribe to a session's stream. Only events published after this
    /// call are delivered; there is no history replay.
    pub fn subscribe(&self, session_id: Uuid) -> broadcast::Receiver<Envelope> {
        self.sender(session_id).subscribe()
    }

    /// Drop a session's channel when the session is deleted. Existing
    /// subscribers see the stream close.
    pub fn remove(&self, session_id: Uuid) {
        if let Ok(mut channels) = self.channels.write() {
            channels.remove(&session_id);
        }
    }

    fn sender(&self, session_id: Uuid) -> broadcast::Sender<Envelope> {
        if let Ok(channels) = self.channels.read() {
            if let Some(sender) = channels.get(&session_id) {
                return sender.clone();
            }
        }
        let mut channels = match self.channels.write() {
            Ok(c) => c,
            Err(poisoned) => poisoned.into_inner(),
        };
        channels
            .entry(session_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::types::MessageTone;

    fn status(progress: u8) -> Event {
        Event::Status {
            file: "a.csv".into(),
            progress,
            message: format!("at {progress}"),
        }
    }

    #[tokio::test]
    async fn subscriber_receives_published_events_in_order() {
        let broadcaster = EventBroadcaster::new();
        let session = Uuid::new_v4();
        let mut rx = broadcaster.subscribe(session);

        broadcaster.publish(session, status(10));
        broadcaster.publish(session, status(50));
        broadcaster.publish(session, status(100));

        for expected in [10u8, 50, 100] {
            let envelope = rx.recv().await.unwrap();
            match envelope.event {
                Event::Status { progress, .. } => assert_eq!(progress, expected),
                other => panic!("wrong event: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn late_subscriber_misses_earlier_events() {
        let broadcaster = EventBroadcaster::new();
        let session = Uuid::new_v4();

        // Published before anyone subscribes — silently dropped.
        broadcaster.publish(session, status(10));

        let mut rx = broadcaster.subscribe(session);
        broadcaster.publish(session, status(90));

        let envelope = rx.recv().await.unwrap();
        match envelope.event {
            Event::Status { progress, .. } => assert_eq!(progress, 90),
            other => panic!("wrong event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn sessions_are_isolated() {
        let broadcaster = EventBroadcaster::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let mut rx_a = broadcaster.subscribe(a);
        let _rx_b = broadcaster.subscribe(b);

        broadcaster.publish(b, status(33));
        broadcaster.publish(
            a,
            Event::ChatResponse {
                message: "hello".into(),
                tone: MessageTone::Info,
            },
        );

        let envelope = rx_a.recv().await.unwrap();
        assert!(matches!(envelope.event, Event::ChatResponse { .. }));
    }

    #[tokio::test]
    async fn publish_without_subscribers_does_not_panic() {
        let broadcaster = EventBroadcaster::new();
        broadcaster.publish(Uuid::new_v4(), status(1));
    }

    #[tokio::test]
    async fn remove_closes_stream() {
        let broadcaster = EventBroadcaster::new();
        let session = Uuid::new_v4();
        let mut rx = broadcaster.subscribe(session);
        broadcaster.remove(session);
        assert!(rx.recv().await.is_err());
    }

    #[tokio::test]
    async fn events_carry_publish_timestamp() {
        let broadcaster = EventBroadcaster::new();
        let session = Uuid::new_v4();
        let mut rx = broadcaster.subscribe(session);
        broadcaster.publish(session, status(5));
        let envelope = rx.recv().await.unwrap();
        assert!(envelope.timestamp.is_some());
    }
}
