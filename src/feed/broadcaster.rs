use serde::Serialize;
use tokio::sync::broadcast;

use crate::feed::domain::LifecycleEvent;

/// Topic every lifecycle event is published under.
pub const POSTS_TOPIC: &str = "posts";

/// Fan-out channel for lifecycle events.
///
/// Built once at startup and handed to whoever publishes or subscribes.
/// Clones share the same channel. Delivery is best-effort: a client only sees
/// events published while it is subscribed, and a client that falls more than
/// `capacity` events behind skips the ones it missed.
#[derive(Clone)]
pub struct Broadcaster {
    tx: broadcast::Sender<LifecycleEvent>,
}

#[derive(Serialize)]
struct Frame<'a> {
    topic: &'static str,
    data: &'a LifecycleEvent,
}

impl Broadcaster {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Returns the number of connected subscribers the event was handed to.
    pub fn publish(&self, event: LifecycleEvent) -> usize {
        let post_id = event.post_id().clone();
        match self.tx.send(event) {
            Ok(count) => {
                tracing::debug!("Event for post {} sent to {} clients", post_id, count);
                count
            }
            Err(_) => {
                tracing::debug!("No clients connected for event on post {}", post_id);
                0
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.tx.subscribe()
    }

    pub fn client_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// Wire form of an event on the client socket.
pub fn encode_frame(event: &LifecycleEvent) -> Result<String, serde_json::Error> {
    serde_json::to_string(&Frame {
        topic: POSTS_TOPIC,
        data: event,
    })
}
