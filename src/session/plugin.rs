use bevy::prelude::*;
use std::sync::{Arc, RwLock};

use crate::events::LevelEvent;
use crate::session::GameSession;

/// Ticks a shared `GameSession` every `Update` and re-emits its events
pub struct LevelPlugin {
    session: Arc<RwLock<GameSession>>,
}

impl LevelPlugin {
    pub fn new(session: GameSession) -> Self {
        Self {
            session: Arc::new(RwLock::new(session)),
        }
    }

    /// Handle shared with the resource, for hosts that also drive the session
    pub fn handle(&self) -> Arc<RwLock<GameSession>> {
        Arc::clone(&self.session)
    }
}

impl Plugin for LevelPlugin {
    fn build(&self, app: &mut App) {
        app.insert_resource(SessionResource(Arc::clone(&self.session)))
            .add_event::<LevelEventMessage>()
            .add_systems(Update, session_tick_system);
    }
}

#[derive(Resource)]
pub struct SessionResource(pub Arc<RwLock<GameSession>>);

/// A `LevelEvent` forwarded into the bevy event queue
#[derive(Event, Debug, Clone, PartialEq)]
pub struct LevelEventMessage(pub LevelEvent);

fn session_tick_system(
    time: Res<Time>,
    session_res: Res<SessionResource>,
    mut writer: EventWriter<LevelEventMessage>,
) {
    if let Ok(mut session) = session_res.0.write() {
        session.tick(time.delta_secs());
        for event in session.drain_journal() {
            writer.send(LevelEventMessage(event));
        }
    }
}
