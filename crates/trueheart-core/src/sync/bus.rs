//! Typed notifications from the sync engine to the presentation layer.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::broadcast;

use crate::models::{BookIndex, Bookmark, DeletedItems, Note, ReadingPosition};
use crate::state::SyncPhase;

const BUS_CAPACITY: usize = 64;

/// Everything the engine announces.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum SyncEvent {
    /// Merged collections written locally, plus what tombstones removed.
    #[serde(rename = "syncDataUpdated", rename_all = "camelCase")]
    DataUpdated {
        bookmarks: BTreeMap<BookIndex, Vec<Bookmark>>,
        notes: BTreeMap<BookIndex, Vec<Note>>,
        reading_positions: BTreeMap<BookIndex, ReadingPosition>,
        deleted_items: DeletedItems,
    },
    /// A sync pipeline finished successfully.
    #[serde(rename = "trueheart-sync-complete", rename_all = "camelCase")]
    SyncComplete { sync_version: u64 },
    /// Remote availability changed (signed in and reachable, or not).
    StateChanged { connected: bool },
    Ready,
    Failed { message: String },
    /// One-off message for the user, e.g. that sync waits for sign-in.
    Notice { message: String },
    PhaseChanged { phase: SyncPhase },
}

impl SyncEvent {
    /// Wire name of the event.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::DataUpdated { .. } => "syncDataUpdated",
            Self::SyncComplete { .. } => "trueheart-sync-complete",
            Self::StateChanged { .. } => "stateChanged",
            Self::Ready => "ready",
            Self::Failed { .. } => "failed",
            Self::Notice { .. } => "notice",
            Self::PhaseChanged { .. } => "phaseChanged",
        }
    }
}

/// Optional presentation hook injected at construction.
///
/// All methods default to no-ops so implementors pick what they render.
pub trait SyncObserver: Send + Sync {
    fn on_state_change(&self, _connected: bool) {}

    fn on_ready(&self) {}

    fn on_failed(&self, _message: &str) {}
}

/// Broadcast channel for [`SyncEvent`]s. Clones publish to the same channel.
#[derive(Clone)]
pub struct SyncEventBus {
    sender: broadcast::Sender<SyncEvent>,
    observer: Option<Arc<dyn SyncObserver>>,
}

impl Default for SyncEventBus {
    fn default() -> Self {
        Self::new(None)
    }
}

impl SyncEventBus {
    pub fn new(observer: Option<Arc<dyn SyncObserver>>) -> Self {
        let (sender, _) = broadcast::channel(BUS_CAPACITY);
        Self { sender, observer }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.sender.subscribe()
    }

    /// Deliver to subscribers and the observer. Having no subscribers is fine.
    pub fn publish(&self, event: SyncEvent) {
        if let Some(observer) = &self.observer {
            match &event {
                SyncEvent::StateChanged { connected } => observer.on_state_change(*connected),
                SyncEvent::Ready => observer.on_ready(),
                SyncEvent::Failed { message } => observer.on_failed(message),
                _ => {}
            }
        }
        tracing::trace!("Publishing {}", event.name());
        let _ = self.sender.send(event);
    }
}

impl std::fmt::Debug for SyncEventBus {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("SyncEventBus")
            .field("subscribers", &self.sender.receiver_count())
            .field("has_observer", &self.observer.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
    }

    impl SyncObserver for Recorder {
        fn on_state_change(&self, connected: bool) {
            self.calls.lock().unwrap().push(format!("state:{connected}"));
        }

        fn on_failed(&self, message: &str) {
            self.calls.lock().unwrap().push(format!("failed:{message}"));
        }
    }

    #[test]
    fn publish_without_subscribers_is_silent() {
        SyncEventBus::default().publish(SyncEvent::Ready);
    }

    #[tokio::test]
    async fn subscribers_and_observer_both_see_events() {
        let recorder = Arc::new(Recorder::default());
        let bus = SyncEventBus::new(Some(recorder.clone()));
        let mut events = bus.subscribe();

        bus.publish(SyncEvent::StateChanged { connected: true });
        bus.publish(SyncEvent::Failed {
            message: "offline".to_string(),
        });

        assert_eq!(
            events.recv().await.unwrap(),
            SyncEvent::StateChanged { connected: true }
        );
        assert_eq!(events.recv().await.unwrap().name(), "failed");
        assert_eq!(
            *recorder.calls.lock().unwrap(),
            vec!["state:true".to_string(), "failed:offline".to_string()]
        );
    }

    #[test]
    fn sync_complete_serializes_with_wire_name() {
        let value = serde_json::to_value(SyncEvent::SyncComplete { sync_version: 4 }).unwrap();
        assert_eq!(value["event"], "trueheart-sync-complete");
        assert_eq!(value["syncVersion"], 4);
    }
}
