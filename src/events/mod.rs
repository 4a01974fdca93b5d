//! Level events and the session-owned event bus.
//!
//! Components push `LevelEvent`s into the bus; the session drains the
//! queue once per dispatch round, routes each event to the trigger system
//! and then hands it to subscribers. Published events are also kept in a
//! bounded journal the host can drain.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::constants::EVENT_JOURNAL_CAPACITY;
use crate::tile::{ChunkId, TileId};

/// Everything the core publishes to gameplay, audio and camera listeners
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LevelEvent {
    /// First chunk positioned, the walker can be placed
    LevelLoaded { starting_tile: TileId },
    WalkerAttachToTile { prev: Option<TileId>, current: TileId },
    WalkerDetachFromTile { tile: TileId },
    WalkerReachTileCenter { tile: TileId },
    WalkerStartFalling { duration: f32 },
    WalkerFall,
    WalkerFallRecover { duration: f32 },
    TileEnterTriggered { tile: TileId },
    TileExitTriggered { tile: TileId },
    TileReachCenterTriggered { tile: TileId },
    TileButtonTriggered { tile: TileId },
    ChunkEnterTriggered { chunk: ChunkId, tile: TileId },
    ChunkExitTriggered { chunk: ChunkId, tile: TileId },
    ChunkSpawned { chunk: ChunkId, name: String },
    ChunkDestroyed { chunk: ChunkId },
    SegmentChanged { index: i64 },
    GenerationFinished,
    TeleportStarted { from: TileId, to: TileId },
    TeleportFinished { tile: TileId },
}

impl LevelEvent {
    /// Short stable name, used for logging and filtering
    pub fn kind(&self) -> &'static str {
        match self {
            LevelEvent::LevelLoaded { .. } => "level_loaded",
            LevelEvent::WalkerAttachToTile { .. } => "walker_attach_to_tile",
            LevelEvent::WalkerDetachFromTile { .. } => "walker_detach_from_tile",
            LevelEvent::WalkerReachTileCenter { .. } => "walker_reach_tile_center",
            LevelEvent::WalkerStartFalling { .. } => "walker_start_falling",
            LevelEvent::WalkerFall => "walker_fall",
            LevelEvent::WalkerFallRecover { .. } => "walker_fall_recover",
            LevelEvent::TileEnterTriggered { .. } => "tile_enter_triggered",
            LevelEvent::TileExitTriggered { .. } => "tile_exit_triggered",
            LevelEvent::TileReachCenterTriggered { .. } => "tile_reach_center_triggered",
            LevelEvent::TileButtonTriggered { .. } => "tile_button_triggered",
            LevelEvent::ChunkEnterTriggered { .. } => "chunk_enter_triggered",
            LevelEvent::ChunkExitTriggered { .. } => "chunk_exit_triggered",
            LevelEvent::ChunkSpawned { .. } => "chunk_spawned",
            LevelEvent::ChunkDestroyed { .. } => "chunk_destroyed",
            LevelEvent::SegmentChanged { .. } => "segment_changed",
            LevelEvent::GenerationFinished => "generation_finished",
            LevelEvent::TeleportStarted { .. } => "teleport_started",
            LevelEvent::TeleportFinished { .. } => "teleport_finished",
        }
    }
}

/// Handle returned by `EventBus::subscribe`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

type Handler = Box<dyn FnMut(&LevelEvent) + Send + Sync>;

/// Queue of pending events plus the registered subscribers
pub struct EventBus {
    pending: VecDeque<LevelEvent>,
    subscribers: Vec<(SubscriptionId, Handler)>,
    journal: VecDeque<LevelEvent>,
    journal_capacity: usize,
    next_subscription: u64,
    published: u64,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_journal_capacity(EVENT_JOURNAL_CAPACITY)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("pending", &self.pending.len())
            .field("subscribers", &self.subscribers.len())
            .field("journal", &self.journal.len())
            .field("published", &self.published)
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_journal_capacity(journal_capacity: usize) -> Self {
        Self {
            pending: VecDeque::new(),
            subscribers: Vec::new(),
            journal: VecDeque::new(),
            journal_capacity,
            next_subscription: 0,
            published: 0,
        }
    }

    /// Queue an event for the next dispatch round
    pub fn publish(&mut self, event: LevelEvent) {
        self.pending.push_back(event);
    }

    pub fn publish_all(&mut self, events: impl IntoIterator<Item = LevelEvent>) {
        self.pending.extend(events);
    }

    /// Pop the oldest undelivered event
    pub fn next_pending(&mut self) -> Option<LevelEvent> {
        self.pending.pop_front()
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Register a handler; it stays registered until `unsubscribe`
    pub fn subscribe<F>(&mut self, handler: F) -> SubscriptionId
    where
        F: FnMut(&LevelEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.subscribers.push((id, Box::new(handler)));
        id
    }

    /// Remove a handler. Returns false if it was not registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sub, _)| *sub != id);
        self.subscribers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Deliver a routed event to subscribers and record it in the journal
    pub fn deliver(&mut self, event: LevelEvent) {
        trace!(kind = event.kind(), "deliver event");
        for (_, handler) in self.subscribers.iter_mut() {
            handler(&event);
        }
        self.published += 1;
        if self.journal_capacity == 0 {
            return;
        }
        if self.journal.len() == self.journal_capacity {
            self.journal.pop_front();
        }
        self.journal.push_back(event);
    }

    /// Take every journaled event, oldest first
    pub fn drain_journal(&mut self) -> Vec<LevelEvent> {
        self.journal.drain(..).collect()
    }

    pub fn journal(&self) -> impl Iterator<Item = &LevelEvent> {
        self.journal.iter()
    }

    /// Total number of events delivered since creation
    pub fn published_count(&self) -> u64 {
        self.published
    }

    /// Drop undelivered events and the journal. Subscribers stay.
    pub fn clear(&mut self) {
        self.pending.clear();
        self.journal.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_publish_is_fifo() {
        let mut bus = EventBus::new();
        bus.publish(LevelEvent::WalkerFall);
        bus.publish(LevelEvent::GenerationFinished);
        assert_eq!(bus.next_pending(), Some(LevelEvent::WalkerFall));
        assert_eq!(bus.next_pending(), Some(LevelEvent::GenerationFinished));
        assert_eq!(bus.next_pending(), None);
    }

    #[test]
    fn test_subscribe_and_unsubscribe() {
        let mut bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let id = bus.subscribe(move |e| sink.lock().unwrap().push(e.kind()));

        bus.deliver(LevelEvent::WalkerFall);
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.deliver(LevelEvent::GenerationFinished);

        assert_eq!(*seen.lock().unwrap(), vec!["walker_fall"]);
        assert_eq!(bus.published_count(), 2);
    }

    #[test]
    fn test_journal_is_bounded() {
        let mut bus = EventBus::with_journal_capacity(2);
        for index in 0..5 {
            bus.deliver(LevelEvent::SegmentChanged { index });
        }
        let drained = bus.drain_journal();
        assert_eq!(
            drained,
            vec![
                LevelEvent::SegmentChanged { index: 3 },
                LevelEvent::SegmentChanged { index: 4 }
            ]
        );
        assert_eq!(bus.journal().count(), 0);
    }

    #[test]
    fn test_zero_capacity_journal_keeps_nothing() {
        let mut bus = EventBus::with_journal_capacity(0);
        bus.deliver(LevelEvent::WalkerFall);
        assert!(bus.drain_journal().is_empty());
    }
}
