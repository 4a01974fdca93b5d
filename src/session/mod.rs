//! Game session: the composition root.
//!
//! `GameSession` owns the tile graph, the walker, the level generator, the
//! event bus and every in-flight job (tweens, script runs, a teleport). The
//! host drives it with `tick(dt)`; everything else happens inside a tick:
//!
//! 1. resume due script runs
//! 2. pump the generator, fire spawn triggers of newly positioned chunks
//! 3. move the walker
//! 4. advance tile tweens and the tube teleport
//! 5. run segment `on_load` hooks
//!
//! After each step the bus is drained: every event is first routed to the
//! trigger system, then handed to subscribers.

pub mod config;
pub mod plugin;

use std::path::Path;

use tracing::{debug, info, warn};

use crate::console::{ConsoleCommand, ConsoleError, ConsoleOutput};
use crate::error::ConfigError;
use crate::events::{EventBus, LevelEvent, SubscriptionId};
use crate::generation::chunk::ChunkLibrary;
use crate::generation::segment::{SegmentDirectory, SegmentSource};
use crate::generation::LevelGenerator;
use crate::script::{RunStatus, ScriptHost, ScriptRun, ScriptScheduler, TriggerOwner, TriggerScript};
use crate::tile::tube::{TeleportJob, TeleportStep};
use crate::tile::wheel::rotate_wheel;
use crate::tile::{ChunkId, TileGraph, TileId};
use crate::trigger::{Activation, TileTriggerKind, TriggerEffect};
use crate::tween::{TweenCompletion, TweenRunner};
use crate::walker::{Walker, WalkerState};

pub use config::SessionConfig;

/// Visual-only cues. Nothing in the core waits for them.
pub trait Animator: Send + Sync {
    fn play_tile_cue(&mut self, tile: TileId, cue: &str);
    fn play_chunk_cue(&mut self, chunk: ChunkId, cue: &str);
    fn set_walker_visible(&mut self, _visible: bool) {}
}

/// Animator that drops every cue
#[derive(Debug, Default, Clone, Copy)]
pub struct NullAnimator;

impl Animator for NullAnimator {
    fn play_tile_cue(&mut self, tile: TileId, cue: &str) {
        debug!(%tile, cue, "tile cue");
    }

    fn play_chunk_cue(&mut self, chunk: ChunkId, cue: &str) {
        debug!(%chunk, cue, "chunk cue");
    }
}

pub struct GameSession {
    config: SessionConfig,
    graph: TileGraph,
    walker: Walker,
    generator: LevelGenerator,
    bus: EventBus,
    tweens: TweenRunner,
    scripts: ScriptScheduler,
    teleport: Option<TeleportJob>,
    animator: Box<dyn Animator>,
    game_speed: f32,
    clock: f64,
    tick_count: u64,
    current_chunk: Option<ChunkId>,
}

impl std::fmt::Debug for GameSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameSession")
            .field("tiles", &self.graph.len())
            .field("walker_state", &self.walker.state())
            .field("current_tile", &self.walker.current_tile())
            .field("generator", &self.generator)
            .field("game_speed", &self.game_speed)
            .field("clock", &self.clock)
            .field("tick_count", &self.tick_count)
            .finish()
    }
}

impl GameSession {
    pub fn new(config: SessionConfig, library: ChunkLibrary, segments: Box<dyn SegmentSource>) -> Self {
        let generator = LevelGenerator::new(
            config.generator.clone(),
            library,
            segments,
            config.session_seed,
        );
        Self {
            graph: TileGraph::new(),
            walker: Walker::new(config.walker.clone()),
            generator,
            bus: EventBus::new(),
            tweens: TweenRunner::new(),
            scripts: ScriptScheduler::new(),
            teleport: None,
            animator: Box::new(NullAnimator),
            game_speed: config.game_speed,
            clock: 0.0,
            tick_count: 0,
            current_chunk: None,
            config,
        }
    }

    /// Chunk templates from `<root>/chunks`, segment files from `<root>/segments`
    pub fn from_assets(config: SessionConfig, root: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let root = root.as_ref();
        let library = ChunkLibrary::from_dir(root.join("chunks"))?;
        let segments = SegmentDirectory::new(root.join("segments"));
        Ok(Self::new(config, library, Box::new(segments)))
    }

    pub fn with_animator(mut self, animator: Box<dyn Animator>) -> Self {
        self.animator = animator;
        self
    }

    // =====================================================
    // Lifecycle
    // =====================================================

    /// Reset the walker and start streaming chunks
    pub fn start(&mut self) {
        self.reset_runtime();
        self.generator.start(&mut self.graph);
        self.collect_generator_events();
        self.dispatch();
    }

    /// Stop streaming and purge every chunk
    pub fn stop(&mut self) {
        self.generator.stop(&mut self.graph);
        self.reset_runtime();
        self.collect_generator_events();
        self.dispatch();
    }

    fn reset_runtime(&mut self) {
        self.walker.reset();
        self.tweens.clear();
        self.scripts.clear();
        self.teleport = None;
        self.current_chunk = None;
    }

    /// Place the walker on `tile` and start walking
    pub fn place_walker(&mut self, tile: TileId) -> bool {
        if !self.walker.init(&self.graph, tile) {
            return false;
        }
        self.walker.go_to_state(&self.graph, WalkerState::Walking);
        self.collect_walker_events();
        self.dispatch();
        true
    }

    pub fn tick(&mut self, dt: f32) {
        self.clock += f64::from(dt);
        self.tick_count += 1;

        self.pump_scripts();
        self.dispatch();

        let protected = self.walker_chunk();
        let walker_position = self.walker.world_position(&self.graph);
        let report = self.generator.pump(&mut self.graph, walker_position, protected);
        self.collect_generator_events();
        for chunk in &report.destroyed {
            self.forget_chunk(*chunk);
        }
        for chunk in report.positioned {
            self.fire_chunk_spawn(chunk);
        }
        self.dispatch();

        self.walker.update(&self.graph, dt, self.game_speed);
        self.collect_walker_events();
        self.dispatch();

        for completion in self.tweens.advance(dt, &mut self.graph) {
            self.complete_tween(completion);
        }
        self.poll_teleport();
        self.dispatch();

        for hook in self.generator.take_hooks() {
            self.run_hook(&hook);
        }
        self.dispatch();
    }

    fn walker_chunk(&self) -> Option<ChunkId> {
        self.walker
            .current_tile()
            .and_then(|id| self.graph.get(id))
            .and_then(|tile| tile.chunk)
            .or(self.current_chunk)
    }

    fn forget_chunk(&mut self, chunk: ChunkId) {
        let graph = &self.graph;
        let cancelled = self.scripts.cancel_where(|owner| match owner {
            TriggerOwner::ChunkSpawn(id) => *id == chunk,
            TriggerOwner::Tile { tile, .. } => !graph.contains(*tile),
        });
        if cancelled > 0 {
            debug!(%chunk, cancelled, "script runs cancelled with their chunk");
        }
        if self.current_chunk == Some(chunk) {
            self.current_chunk = None;
        }
    }

    // =====================================================
    // Event routing
    // =====================================================

    fn collect_walker_events(&mut self) {
        let events = self.walker.take_events();
        self.bus.publish_all(events);
    }

    fn collect_generator_events(&mut self) {
        let events = self.generator.take_events();
        self.bus.publish_all(events);
    }

    /// Route and deliver everything pending, including events raised while
    /// routing
    fn dispatch(&mut self) {
        while let Some(event) = self.bus.next_pending() {
            self.route(&event);
            self.bus.deliver(event);
        }
    }

    fn route(&mut self, event: &LevelEvent) {
        match *event {
            LevelEvent::LevelLoaded { starting_tile } => {
                if self.walker.init(&self.graph, starting_tile) {
                    self.walker.go_to_state(&self.graph, WalkerState::Walking);
                    self.collect_walker_events();
                } else {
                    warn!(tile = %starting_tile, "starting tile vanished before the walker spawned");
                }
            }
            LevelEvent::WalkerAttachToTile { prev, current } => {
                if let Some(tile) = self.graph.get_mut(current) {
                    for trigger in &mut tile.triggers {
                        trigger.register_walker_enter(prev);
                    }
                }
                self.fire_tile_triggers(current, TileTriggerKind::fires_on_attach);
            }
            LevelEvent::WalkerDetachFromTile { tile } => {
                self.fire_tile_triggers(tile, TileTriggerKind::fires_on_detach);
                if let Some(owner) = self.graph.get_mut(tile) {
                    for trigger in &mut owner.triggers {
                        trigger.register_walker_exit();
                    }
                }
            }
            LevelEvent::WalkerReachTileCenter { tile } => {
                self.fire_tile_triggers(tile, |kind| *kind == TileTriggerKind::ReachCenter);
            }
            LevelEvent::ChunkEnterTriggered { chunk, .. } => {
                if self.current_chunk != Some(chunk) {
                    debug!(%chunk, "walker entered chunk");
                }
                self.current_chunk = Some(chunk);
            }
            LevelEvent::WalkerFall => info!("walker fell"),
            _ => {}
        }
    }

    /// Activate the matching triggers of `tile` in declaration order.
    /// Returns how many fired.
    fn fire_tile_triggers(&mut self, tile: TileId, matches: impl Fn(&TileTriggerKind) -> bool) -> usize {
        let Some(owner) = self.graph.get(tile) else {
            return 0;
        };
        let indices = owner.trigger_indices(matches);
        let distance = self.walker.world_position(&self.graph).distance(owner.position);

        let mut fired = 0;
        for index in indices {
            let outcome = self
                .graph
                .get_mut(tile)
                .and_then(|t| t.triggers.get_mut(index))
                .and_then(|trigger| {
                    let event = trigger.fired_event(tile);
                    trigger.trigger(distance).map(|activation| (activation, event))
                });
            if let Some((activation, event)) = outcome {
                fired += 1;
                self.run_activation(TriggerOwner::Tile { tile, index }, activation);
                self.bus.publish(event);
            }
        }
        fired
    }

    fn fire_chunk_spawn(&mut self, chunk: ChunkId) {
        let activation = self
            .generator
            .chunk_mut(chunk)
            .and_then(|c| c.spawn_trigger.trigger());
        if let Some(activation) = activation {
            self.run_activation(TriggerOwner::ChunkSpawn(chunk), activation);
        }
    }

    /// Run side effects in order, then start the script
    fn run_activation(&mut self, owner: TriggerOwner, activation: Activation) {
        for effect in &activation.effects {
            match (effect, owner) {
                (TriggerEffect::RotateWheel, TriggerOwner::Tile { tile, .. }) => {
                    match rotate_wheel(
                        tile,
                        &self.graph,
                        &mut self.walker,
                        &mut self.tweens,
                        self.game_speed,
                        self.config.wheel_duration_factor,
                    ) {
                        Ok(duration) => debug!(%tile, duration, "wheel rotating"),
                        Err(skip) => debug!(%tile, ?skip, "wheel not rotated"),
                    }
                }
                (TriggerEffect::TubeTeleport, TriggerOwner::Tile { tile, .. }) => self.start_teleport(tile),
                (TriggerEffect::Animate { cue }, TriggerOwner::Tile { tile, .. }) => {
                    self.animator.play_tile_cue(tile, cue);
                }
                (TriggerEffect::Animate { cue }, TriggerOwner::ChunkSpawn(chunk)) => {
                    self.animator.play_chunk_cue(chunk, cue);
                }
                (effect, TriggerOwner::ChunkSpawn(chunk)) => {
                    warn!(%chunk, effect = effect.name(), "effect needs a tile owner");
                }
            }
        }

        if let Some(script) = activation.script {
            self.start_script(owner, &script);
        }
    }

    // =====================================================
    // Scripts
    // =====================================================

    fn start_script(&mut self, owner: TriggerOwner, script: &TriggerScript) {
        let mut run = ScriptRun::new(owner, script);
        match run.advance(self.clock, self) {
            RunStatus::Finished => self.release_owner(owner),
            RunStatus::Suspended => self.scripts.push(run),
        }
    }

    /// Resume every due run once
    fn pump_scripts(&mut self) {
        let mut survivors = Vec::new();
        for mut run in self.scripts.take() {
            if !self.owner_alive(run.owner) {
                debug!(owner = ?run.owner, "dropping run of a removed trigger");
                continue;
            }
            match run.advance(self.clock, self) {
                RunStatus::Finished => self.release_owner(run.owner),
                RunStatus::Suspended => survivors.push(run),
            }
        }
        self.scripts.restore(survivors);
    }

    fn owner_alive(&self, owner: TriggerOwner) -> bool {
        match owner {
            TriggerOwner::Tile { tile, index } => self
                .graph
                .get(tile)
                .is_some_and(|t| index < t.triggers.len()),
            TriggerOwner::ChunkSpawn(chunk) => self.generator.chunk(chunk).is_some(),
        }
    }

    fn release_owner(&mut self, owner: TriggerOwner) {
        match owner {
            TriggerOwner::Tile { tile, index } => {
                if let Some(trigger) = self
                    .graph
                    .get_mut(tile)
                    .and_then(|t| t.triggers.get_mut(index))
                {
                    trigger.core.finish_script();
                }
            }
            TriggerOwner::ChunkSpawn(chunk) => {
                if let Some(c) = self.generator.chunk_mut(chunk) {
                    c.spawn_trigger.finish_script();
                }
            }
        }
    }

    fn run_hook(&mut self, hook: &str) {
        let script = match TriggerScript::parse(hook, false) {
            Ok(script) => script,
            Err(e) => {
                warn!(error = %e, "segment hook rejected");
                return;
            }
        };
        for step in script.steps() {
            if let crate::script::ScriptStep::Run(command) = step {
                self.run_command(command);
            }
        }
    }

    // =====================================================
    // Tweens and teleports
    // =====================================================

    fn complete_tween(&mut self, completion: TweenCompletion) {
        match completion {
            TweenCompletion::ReleaseWalker { tile } => {
                if self.walker.current_tile() != Some(tile) {
                    debug!(%tile, "wheel finished after the walker left");
                }
                self.walker.set_stick_to_tile(false);
                self.walker.recalculate_look_ahead(&self.graph);
            }
            TweenCompletion::Nothing => {}
        }
    }

    fn start_teleport(&mut self, from: TileId) {
        if self.teleport.is_some() {
            warn!(tile = %from, "teleport already in progress");
            return;
        }
        let Some(link) = self.graph.get(from).and_then(|t| t.tube) else {
            warn!(tile = %from, "tube teleport on a tile without a tube");
            return;
        };
        if !self.graph.contains(link.connected) {
            warn!(tile = %from, "connected tube no longer exists");
            return;
        }
        info!(from = %from, to = %link.connected, "tube teleport");
        self.teleport = Some(TeleportJob::new(from, link.connected, self.config.tube_travel_secs));
        self.animator.play_tile_cue(from, "tube_enter");
        self.bus.publish(LevelEvent::TeleportStarted {
            from,
            to: link.connected,
        });
    }

    fn poll_teleport(&mut self) {
        let Some(job) = self.teleport.as_mut() else {
            return;
        };
        match job.poll(self.clock) {
            TeleportStep::Disappear => {
                self.walker.set_active(false);
                self.walker.detach_from_tile(&self.graph);
                self.animator.set_walker_visible(false);
                self.collect_walker_events();
            }
            TeleportStep::Travel => {}
            TeleportStep::Reveal => {
                let to = job.to;
                self.teleport = None;
                self.reveal_from_tube(to);
            }
        }
    }

    fn reveal_from_tube(&mut self, to: TileId) {
        // The destination tube must not send the walker straight back
        if let Some(tile) = self.graph.get_mut(to) {
            for trigger in &mut tile.triggers {
                if trigger.core.effects().contains(&TriggerEffect::TubeTeleport) {
                    trigger.latch_for_visit();
                }
            }
        }

        self.walker.set_active(true);
        self.animator.set_walker_visible(true);
        if self.walker.put_on_tile(&self.graph, to) {
            self.animator.play_tile_cue(to, "tube_exit");
            self.walker.go_to_state(&self.graph, WalkerState::Walking);
            self.bus.publish(LevelEvent::TeleportFinished { tile: to });
        } else {
            warn!(tile = %to, "destination tube vanished during the teleport");
            self.walker.go_to_state(&self.graph, WalkerState::Awake);
        }
        self.collect_walker_events();
    }

    // =====================================================
    // Host API
    // =====================================================

    /// Fire the button triggers of `tile`
    pub fn press_button(&mut self, tile: TileId) -> bool {
        let fired = self.fire_tile_triggers(tile, |kind| *kind == TileTriggerKind::Button);
        self.collect_walker_events();
        self.dispatch();
        fired > 0
    }

    pub fn execute(&mut self, command: &ConsoleCommand) -> Result<ConsoleOutput, ConsoleError> {
        match command {
            ConsoleCommand::TileDestroy(name) => {
                let id = self
                    .graph
                    .find_by_name(name)
                    .ok_or_else(|| ConsoleError::TileNotFound(name.clone()))?;
                if self.walker.current_tile() == Some(id) {
                    return Err(ConsoleError::TileOccupied(name.clone()));
                }
                self.graph.remove(id);
                self.scripts
                    .cancel_where(|owner| matches!(owner, TriggerOwner::Tile { tile, .. } if *tile == id));
                info!(tile = %name, "tile destroyed");
                Ok(ConsoleOutput::Done)
            }
            ConsoleCommand::TileExist(name) => Ok(ConsoleOutput::Bool(self.graph.contains_name(name))),
            ConsoleCommand::LevChunkSeq(names) => {
                self.generator.override_sequence(names);
                Ok(ConsoleOutput::Done)
            }
            ConsoleCommand::SetSegCfg(index) => {
                self.generator.set_segment(*index);
                self.collect_generator_events();
                Ok(ConsoleOutput::Done)
            }
            ConsoleCommand::Speed(None) => Ok(ConsoleOutput::Speed(self.game_speed)),
            ConsoleCommand::Speed(Some(speed)) => {
                if !speed.is_finite() || *speed < 0.0 {
                    return Err(ConsoleError::InvalidSpeed(*speed));
                }
                self.game_speed = *speed;
                info!(speed, "game speed set");
                Ok(ConsoleOutput::Speed(*speed))
            }
            ConsoleCommand::Print(message) => {
                info!(target: "console", "{message}");
                Ok(ConsoleOutput::Done)
            }
        }
    }

    pub fn execute_line(&mut self, line: &str) -> Result<ConsoleOutput, ConsoleError> {
        let command: ConsoleCommand = line.parse()?;
        let output = self.execute(&command)?;
        self.dispatch();
        Ok(output)
    }

    pub fn subscribe<F>(&mut self, handler: F) -> SubscriptionId
    where
        F: FnMut(&LevelEvent) + Send + Sync + 'static,
    {
        self.bus.subscribe(handler)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.bus.unsubscribe(id)
    }

    /// Events delivered since the last drain, oldest first
    pub fn drain_journal(&mut self) -> Vec<LevelEvent> {
        self.bus.drain_journal()
    }

    // =====================================================
    // Accessors
    // =====================================================

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn graph(&self) -> &TileGraph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut TileGraph {
        &mut self.graph
    }

    pub fn walker(&self) -> &Walker {
        &self.walker
    }

    pub fn walker_mut(&mut self) -> &mut Walker {
        &mut self.walker
    }

    pub fn generator(&self) -> &LevelGenerator {
        &self.generator
    }

    pub fn generator_mut(&mut self) -> &mut LevelGenerator {
        &mut self.generator
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn game_speed(&self) -> f32 {
        self.game_speed
    }

    pub fn clock(&self) -> f64 {
        self.clock
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn current_chunk(&self) -> Option<ChunkId> {
        self.current_chunk
    }

    pub fn is_teleporting(&self) -> bool {
        self.teleport.is_some()
    }

    pub fn running_scripts(&self) -> usize {
        self.scripts.len()
    }
}

impl ScriptHost for GameSession {
    fn run_command(&mut self, command: &ConsoleCommand) {
        if let Err(e) = self.execute(command) {
            warn!(command = %command, error = %e, "script command failed");
        }
    }

    fn tile_exists(&self, name: &str) -> bool {
        self.graph.contains_name(name)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use bevy::math::{Quat, Vec3};

    use super::*;
    use crate::constants::TILE_SIZE;
    use crate::generation::segment::InMemorySegments;
    use crate::script::TriggerScript;
    use crate::tile::{TileWheel, TubeLink};
    use crate::trigger::{TileTrigger, TriggerCore};
    use crate::walker::WalkerConfig;

    const DT: f32 = 1.0 / 60.0;

    fn session() -> GameSession {
        let config = SessionConfig {
            game_speed: 1.0,
            walker: WalkerConfig {
                target_speed: 2.0,
                velocity_smooth_time: 0.0,
            },
            ..SessionConfig::default()
        };
        GameSession::new(config, ChunkLibrary::new(), Box::new(InMemorySegments::new()))
    }

    fn line(session: &mut GameSession, count: usize) -> Vec<TileId> {
        (0..count)
            .map(|i| {
                session.graph_mut().add(
                    format!("T{i}"),
                    Vec3::new(i as f32 * TILE_SIZE, 0.0, 0.0),
                    Quat::IDENTITY,
                )
            })
            .collect()
    }

    fn add_trigger(session: &mut GameSession, tile: TileId, trigger: TileTrigger) {
        session.graph_mut().get_mut(tile).unwrap().triggers.push(trigger);
    }

    fn run(session: &mut GameSession, ticks: usize) {
        for _ in 0..ticks {
            session.tick(DT);
        }
    }

    #[test]
    fn test_enter_trigger_fires_on_walk() {
        let mut s = session();
        let tiles = line(&mut s, 3);
        add_trigger(&mut s, tiles[1], TileTrigger::simple(TileTriggerKind::Enter));

        assert!(s.place_walker(tiles[0]));
        run(&mut s, 40);

        let journal = s.drain_journal();
        assert!(journal.contains(&LevelEvent::TileEnterTriggered { tile: tiles[1] }));
        assert!(journal.contains(&LevelEvent::WalkerAttachToTile {
            prev: Some(tiles[0]),
            current: tiles[1]
        }));
    }

    #[test]
    fn test_reach_center_fires_once_per_visit() {
        let mut s = session();
        let tiles = line(&mut s, 4);
        add_trigger(&mut s, tiles[1], TileTrigger::simple(TileTriggerKind::ReachCenter));
        s.place_walker(tiles[0]);
        run(&mut s, 120);

        let fired = s
            .drain_journal()
            .into_iter()
            .filter(|e| *e == LevelEvent::TileReachCenterTriggered { tile: tiles[1] })
            .count();
        assert_eq!(fired, 1);
    }

    #[test]
    fn test_console_commands() {
        let mut s = session();
        let tiles = line(&mut s, 2);
        s.place_walker(tiles[0]);

        assert_eq!(s.execute_line("tileexist T1"), Ok(ConsoleOutput::Bool(true)));
        assert_eq!(
            s.execute_line("tiledestroy T0"),
            Err(ConsoleError::TileOccupied("T0".into()))
        );
        assert_eq!(s.execute_line("tiledestroy T1"), Ok(ConsoleOutput::Done));
        assert_eq!(s.execute_line("tileexist T1"), Ok(ConsoleOutput::Bool(false)));
        assert_eq!(
            s.execute_line("tiledestroy T1"),
            Err(ConsoleError::TileNotFound("T1".into()))
        );

        assert_eq!(s.execute_line("speed"), Ok(ConsoleOutput::Speed(1.0)));
        assert_eq!(s.execute_line("speed 3"), Ok(ConsoleOutput::Speed(3.0)));
        assert_eq!(s.game_speed(), 3.0);
        assert!(matches!(s.execute_line("speed -1"), Err(ConsoleError::InvalidSpeed(_))));
    }

    #[test]
    fn test_suspended_script_blocks_trigger_until_done() {
        let mut s = session();
        let tiles = line(&mut s, 2);
        let script = TriggerScript::parse("wait 0.5\nspeed 4", true).unwrap();
        let trigger = TileTrigger::simple(TileTriggerKind::Button)
            .with_one_hit_max_per_visit(false);
        add_trigger(&mut s, tiles[0], trigger);
        s.graph_mut().get_mut(tiles[0]).unwrap().triggers[0].core =
            TriggerCore::unlimited().with_script(Some(script));

        assert!(s.press_button(tiles[0]));
        assert_eq!(s.running_scripts(), 1);
        // Re-entry is rejected while the run is suspended
        assert!(!s.press_button(tiles[0]));

        run(&mut s, 40);
        assert_eq!(s.running_scripts(), 0);
        assert_eq!(s.game_speed(), 4.0);
        assert!(s.press_button(tiles[0]));
    }

    #[test]
    fn test_unsubscribed_handler_stops_receiving() {
        let mut s = session();
        let tiles = line(&mut s, 3);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let id = s.subscribe(move |event| sink.lock().unwrap().push(event.kind()));

        s.place_walker(tiles[0]);
        assert_eq!(seen.lock().unwrap().as_slice(), ["walker_attach_to_tile"]);

        assert!(s.unsubscribe(id));
        run(&mut s, 60);
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_wheel_button_sticks_then_releases() {
        let mut s = session();
        let tiles = line(&mut s, 3);
        let quarter = Quat::from_rotation_z(std::f32::consts::FRAC_PI_2);
        {
            let wheel = s.graph_mut().get_mut(tiles[1]).unwrap();
            wheel.wheel = Some(TileWheel::default().with_rotation(tiles[0], quarter));
            wheel.triggers.push(
                TileTrigger::new(
                    TileTriggerKind::Button,
                    TriggerCore::unlimited().with_effects(vec![TriggerEffect::RotateWheel]),
                    1.0,
                )
                .unwrap(),
            );
        }
        s.place_walker(tiles[0]);
        // Walk onto the wheel tile
        run(&mut s, 35);
        assert_eq!(s.walker().current_tile(), Some(tiles[1]));

        assert!(s.press_button(tiles[1]));
        assert!(s.walker().stick_to_tile());

        run(&mut s, 120);
        assert!(!s.walker().stick_to_tile());
        let rotation = s.graph().get(tiles[1]).unwrap().rotation;
        assert!(rotation.angle_between(quarter) < 1e-3);
    }

    #[test]
    fn test_tube_teleport_moves_walker() {
        let mut s = session();
        let tiles = line(&mut s, 2);
        let far = s
            .graph_mut()
            .add("Far", Vec3::new(40.0, 0.0, 0.0), Quat::IDENTITY);
        s.graph_mut().add("FarNext", Vec3::new(42.0, 0.0, 0.0), Quat::IDENTITY);

        let tube_trigger = || {
            TileTrigger::new(
                TileTriggerKind::Enter,
                TriggerCore::unlimited().with_effects(vec![TriggerEffect::TubeTeleport]),
                1.0,
            )
            .unwrap()
        };
        for (tile, other) in [(tiles[1], far), (far, tiles[1])] {
            let t = s.graph_mut().get_mut(tile).unwrap();
            t.tube = Some(TubeLink { connected: other });
            t.triggers.push(tube_trigger());
        }

        s.place_walker(tiles[0]);
        run(&mut s, 35);
        assert!(s.is_teleporting());
        assert!(!s.walker().is_active());
        assert_eq!(s.walker().current_tile(), None);

        run(&mut s, 70);
        assert!(!s.is_teleporting());
        assert!(s.walker().is_active());

        let journal = s.drain_journal();
        assert!(journal.contains(&LevelEvent::TeleportFinished { tile: far }));
        let starts = journal
            .iter()
            .filter(|e| matches!(e, LevelEvent::TeleportStarted { .. }))
            .count();
        assert_eq!(starts, 1);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let mut s = session();
        s.stop();
        s.stop();
        assert!(!s.generator().is_running());
        assert_eq!(s.walker().state(), WalkerState::Standing);
    }
}
