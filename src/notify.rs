use dashmap::DashMap;
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::model::Event;

const CHANNEL_CAPACITY: usize = 256;

/// Per-area broadcast channels backing `LISTEN area_<id>`.
pub struct NotifyHub {
    channels: DashMap<Ulid, broadcast::Sender<Event>>,
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

    /// Subscribe to an area's events, creating its channel on first use.
    pub fn subscribe(&self, area_id: Ulid) -> broadcast::Receiver<Event> {
        self.channels
            .entry(area_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// No-op if nobody is listening.
    pub fn send(&self, area_id: Ulid, event: &Event) {
        if let Some(sender) = self.channels.get(&area_id) {
            let _ = sender.send(event.clone());
        }
    }

    /// Drop an area's channel; current receivers see it close.
    pub fn remove(&self, area_id: &Ulid) {
        self.channels.remove(area_id);
    }
}

/// Channel name clients LISTEN on for one area.
pub fn channel_name(area_id: &Ulid) -> String {
    format!("area_{area_id}")
}

/// Inverse of [`channel_name`].
pub fn parse_channel(channel: &str) -> Option<Ulid> {
    let id = channel.strip_prefix("area_")?;
    Ulid::from_string(&id.to_uppercase()).ok()
}
