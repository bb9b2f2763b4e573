use dashmap::DashMap;
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::model::Event;

const CHANNEL_CAPACITY: usize = 256;

/// What a subscriber listens to: one hotel's lifecycle events, or one
/// room category's booking traffic (including reconciler cancellations).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Hotel(Ulid),
    Category(Ulid),
}

/// Broadcast hub for engine events.
///
/// The engine itself never notifies guests; calling workflows subscribe to
/// a scope and drive their own notification collaborators from what they
/// receive.
pub struct NotifyHub {
    channels: DashMap<Scope, broadcast::Sender<Event>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to a scope. Creates the channel if needed.
    pub fn subscribe(&self, scope: Scope) -> broadcast::Receiver<Event> {
        let sender = self
            .channels
            .entry(scope)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Send a notification. No-op if nobody is listening.
    pub fn send(&self, scope: Scope, event: &Event) {
        if let Some(sender) = self.channels.get(&scope) {
            let _ = sender.send(event.clone());
        }
    }

    /// Drop a channel once its hotel or category is deleted. Live
    /// receivers still drain buffered events, then see the channel close.
    pub fn remove(&self, scope: &Scope) {
        self.channels.remove(scope);
    }
}
