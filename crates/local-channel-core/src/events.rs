//! Local channel driver events

use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Events emitted over the lifetime of local pairs
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LocalChannelEvent {
    /// A pair was created and linked into the registry
    PairCreated {
        pair: Uuid,
        name: String,
        exten: String,
        context: String,
    },

    /// The dialplan was started on the outbound endpoint
    PbxLaunched {
        pair: Uuid,
    },

    /// The pair masqueraded itself out of a bridge
    Optimized {
        pair: Uuid,
        owner: String,
        peer: String,
    },

    /// The pair was destroyed
    PairDestroyed {
        pair: Uuid,
    },
}

/// Event emitter for the local channel driver
#[derive(Debug, Clone)]
pub struct EventEmitter {
    sender: broadcast::Sender<LocalChannelEvent>,
}

impl EventEmitter {
    /// Create a new event emitter with the specified capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event
    pub fn emit(&self, event: LocalChannelEvent) {
        // No receivers is fine
        let _ = self.sender.send(event);
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<LocalChannelEvent> {
        self.sender.subscribe()
    }

    /// Get the number of active receivers
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_without_receivers() {
        let emitter = EventEmitter::new(4);
        emitter.emit(LocalChannelEvent::PairDestroyed { pair: Uuid::new_v4() });
        assert_eq!(emitter.receiver_count(), 0);
    }

    #[test]
    fn test_subscribe_receives_events() {
        let emitter = EventEmitter::new(4);
        let mut rx = emitter.subscribe();
        let pair = Uuid::new_v4();
        emitter.emit(LocalChannelEvent::PbxLaunched { pair });
        assert_eq!(rx.try_recv().unwrap(), LocalChannelEvent::PbxLaunched { pair });
    }

    #[test]
    fn test_event_serializes_with_tag() {
        let pair = Uuid::nil();
        let json = serde_json::to_value(LocalChannelEvent::PairDestroyed { pair }).unwrap();
        assert_eq!(json["event"], "pair_destroyed");
        assert_eq!(json["pair"], pair.to_string());
    }
}
