//! Engine events broadcast to interested subscribers.
//!
//! The session emits coarse-grained notifications over a [`tokio::sync::broadcast`]
//! channel so that UI layers can refresh without polling. Events are fire and
//! forget; a subscriber that falls behind the channel capacity loses the
//! oldest events rather than blocking the engine.

use crate::config::EventConfig;
use crate::library::MangaKey;
use crate::migrate::{ItemKey, MigrationState};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Notifications emitted by a migration session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WatariEvent {
    /// A single item finished a per-item search transition.
    SearchStateChanged { item: ItemKey, state: MigrationState },
    /// One library entry was replaced by another during commit.
    MangaMigrated { from: MangaKey, to: MangaKey },
    /// Library contents changed; catalog views should reload.
    LibraryChanged,
    /// Reading history changed; history views should reload.
    HistoryChanged,
}

/// Cloneable handle to the engine's broadcast channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<WatariEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<WatariEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all current subscribers.
    ///
    /// Returns the number of subscribers the event reached. Zero subscribers
    /// is not an error; headless callers often run without any.
    pub fn emit(&self, event: WatariEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(EventConfig::CHANNEL_CAPACITY)
    }
}
