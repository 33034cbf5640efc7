use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::model::{Event, PropertyId};

const CHANNEL_CAPACITY: usize = 256;

/// Per-property broadcast of committed booking events.
///
/// Events are published only after they are durable in the journal and
/// applied, so a subscriber never sees a reservation that could still fail.
pub struct BookingFeed {
    channels: DashMap<PropertyId, broadcast::Sender<Event>>,
}

impl Default for BookingFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl BookingFeed {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    pub fn subscribe(&self, property_id: PropertyId) -> broadcast::Receiver<Event> {
        self.channels
            .entry(property_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// No-op when nobody is listening.
    pub fn publish(&self, event: &Event) {
        let property_id = event.property_id();
        let mut orphaned = false;
        if let Some(sender) = self.channels.get(&property_id) {
            orphaned = sender.send(event.clone()).is_err();
        }
        // Every receiver dropped; forget the channel.
        if orphaned {
            self.channels
                .remove_if(&property_id, |_, s| s.receiver_count() == 0);
        }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}
