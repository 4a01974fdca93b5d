//! Walker state machine: per-tile movement and attachment.
//!
//! The walker is `Standing` until told to walk, then moves tile to tile in
//! `Walking` and ends in `Awake` after an unrecovered fall. While walking
//! the tile sub-state decides the next sub-destination:
//!
//! - Quiting: head for the tile edge along the closest cardinal axis
//! - Entering: head for the center of the tile just entered
//! - Falling: coast one tile length past the edge, hoping for a floor
//!
//! Position and heading are kept in the current tile's frame so the walker
//! rides tiles that rotate under it. Published events are buffered in an
//! outbox the session drains after every call.

use bevy::math::Vec3;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::constants::{
    DEFAULT_TARGET_SPEED, DEFAULT_VELOCITY_SMOOTH_TIME, REST_SPEED_EPSILON, TILE_HALF_SIZE,
    TILE_SIZE,
};
use crate::events::LevelEvent;
use crate::movement::smooth_damp;
use crate::tile::{Tile, TileGraph, TileId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WalkerState {
    Standing,
    Walking,
    Awake,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TileState {
    Entering,
    Quiting,
    Falling,
}

/// Walker tunables
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WalkerConfig {
    /// Speed before the game speed multiplier
    pub target_speed: f32,
    /// Smooth-damp time toward `target_speed`; `0` changes speed instantly
    pub velocity_smooth_time: f32,
}

impl Default for WalkerConfig {
    fn default() -> Self {
        Self {
            target_speed: DEFAULT_TARGET_SPEED,
            velocity_smooth_time: DEFAULT_VELOCITY_SMOOTH_TIME,
        }
    }
}

/// Point the walker is moving toward, parented to a tile
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubDestination {
    pub tile: TileId,
    pub local: Vec3,
}

/// Where the visual follower should blend toward next
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LookAhead {
    pub next_tile: TileId,
    pub heading: Vec3,
    pub up: Vec3,
    pub target_position: Vec3,
    pub min_duration: f32,
}

/// True when a step of `distance_to_move` reaches or passes the destination
pub fn reaches_destination(distance_to_move: f32, remaining: f32) -> bool {
    distance_to_move >= remaining
}

#[derive(Debug, Clone)]
pub struct Walker {
    config: WalkerConfig,
    state: WalkerState,
    tile_state: TileState,
    current_tile: Option<TileId>,
    target_speed: f32,
    velocity: f32,
    velocity_rate: f32,
    speed_before_falling: f32,
    stick_to_tile: bool,
    active: bool,
    local_position: Vec3,
    local_heading: Vec3,
    world_position: Vec3,
    world_heading: Vec3,
    sub_destination: Option<SubDestination>,
    look_ahead: Option<LookAhead>,
    outbox: Vec<LevelEvent>,
}

impl Walker {
    pub fn new(config: WalkerConfig) -> Self {
        let target_speed = config.target_speed;
        Self {
            config,
            state: WalkerState::Standing,
            tile_state: TileState::Quiting,
            current_tile: None,
            target_speed,
            velocity: 0.0,
            velocity_rate: 0.0,
            speed_before_falling: target_speed,
            stick_to_tile: false,
            active: true,
            local_position: Vec3::ZERO,
            local_heading: Vec3::X,
            world_position: Vec3::ZERO,
            world_heading: Vec3::X,
            sub_destination: None,
            look_ahead: None,
            outbox: Vec::new(),
        }
    }

    // =====================================================
    // Accessors
    // =====================================================

    pub fn state(&self) -> WalkerState {
        self.state
    }

    pub fn tile_state(&self) -> TileState {
        self.tile_state
    }

    pub fn current_tile(&self) -> Option<TileId> {
        self.current_tile
    }

    pub fn target_speed(&self) -> f32 {
        self.target_speed
    }

    pub fn set_target_speed(&mut self, speed: f32) {
        self.target_speed = speed;
    }

    /// Smoothed speed, before the game speed multiplier
    pub fn velocity(&self) -> f32 {
        self.velocity
    }

    pub fn stick_to_tile(&self) -> bool {
        self.stick_to_tile
    }

    pub fn set_stick_to_tile(&mut self, flag: bool) {
        self.stick_to_tile = flag;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn set_active(&mut self, flag: bool) {
        self.active = flag;
    }

    pub fn sub_destination(&self) -> Option<SubDestination> {
        self.sub_destination
    }

    pub fn look_ahead(&self) -> Option<LookAhead> {
        self.look_ahead
    }

    /// World position, following the current tile if it moved or rotated
    pub fn world_position(&self, graph: &TileGraph) -> Vec3 {
        match self.current(graph) {
            Some(tile) => tile.to_world(self.local_position),
            None => self.world_position,
        }
    }

    pub fn world_heading(&self, graph: &TileGraph) -> Vec3 {
        match self.current(graph) {
            Some(tile) => tile.dir_to_world(self.local_heading),
            None => self.world_heading,
        }
    }

    /// World position of the sub-destination pointer
    pub fn sub_destination_world(&self, graph: &TileGraph) -> Option<Vec3> {
        let sub = self.sub_destination?;
        graph.get(sub.tile).map(|t| t.to_world(sub.local))
    }

    /// Buffered events, oldest first
    pub fn take_events(&mut self) -> Vec<LevelEvent> {
        std::mem::take(&mut self.outbox)
    }

    fn current<'g>(&self, graph: &'g TileGraph) -> Option<&'g Tile> {
        self.current_tile.and_then(|id| graph.get(id))
    }

    fn current_speed(&self, game_speed: f32) -> f32 {
        self.target_speed * game_speed
    }

    // =====================================================
    // Attachment
    // =====================================================

    pub fn init(&mut self, graph: &TileGraph, tile: TileId) -> bool {
        self.put_on_tile(graph, tile)
    }

    /// Place the walker at the tile center facing the tile forward
    pub fn put_on_tile(&mut self, graph: &TileGraph, tile: TileId) -> bool {
        let Some(target) = graph.get(tile) else {
            warn!(%tile, "put_on_tile: tile does not exist");
            return false;
        };

        self.current_tile = Some(tile);
        self.local_position = Vec3::ZERO;
        self.local_heading = Vec3::X;
        self.world_position = target.position;
        self.world_heading = target.forward();
        self.sub_destination = None;
        self.look_ahead = None;

        self.outbox.push(LevelEvent::WalkerAttachToTile {
            prev: None,
            current: tile,
        });
        true
    }

    /// Leave the current tile, keeping the last world pose
    pub fn detach_from_tile(&mut self, graph: &TileGraph) {
        self.sync_world(graph);
        if let Some(tile) = self.current_tile.take() {
            self.outbox.push(LevelEvent::WalkerDetachFromTile { tile });
        }
        self.sub_destination = None;
    }

    pub fn go_to_state(&mut self, graph: &TileGraph, state: WalkerState) {
        let previous = self.state;
        self.state = state;
        debug!(?previous, ?state, "walker state");

        match state {
            WalkerState::Walking => {
                if previous == WalkerState::Standing {
                    info!("start accelerating");
                }
                self.start_quiting_tile(graph);
            }
            WalkerState::Awake => {
                self.outbox.push(LevelEvent::WalkerFall);
            }
            WalkerState::Standing => {}
        }
    }

    /// Return to a fresh, detached, standing walker
    pub fn reset(&mut self) {
        *self = Walker::new(self.config.clone());
    }

    // =====================================================
    // Per-frame update
    // =====================================================

    pub fn update(&mut self, graph: &TileGraph, dt: f32, game_speed: f32) {
        if !self.active || self.state != WalkerState::Walking {
            return;
        }
        // Paused: no smoothing, no transitions
        if game_speed <= 0.0 {
            return;
        }
        let Some(tile) = self.current(graph) else {
            return;
        };
        let Some(sub) = self.sub_destination else {
            return;
        };

        self.velocity = smooth_damp(
            self.velocity,
            self.target_speed,
            &mut self.velocity_rate,
            self.config.velocity_smooth_time,
            dt,
        );
        let final_velocity = self.velocity * game_speed;

        let sub_local = if sub.tile == tile.id {
            sub.local
        } else {
            match graph.get(sub.tile) {
                Some(owner) => tile.to_local(owner.to_world(sub.local)),
                None => sub.local,
            }
        };

        let to_target = sub_local - self.local_position;
        let remaining = to_target.length();
        let direction = to_target.normalize_or_zero();
        let distance_to_move = final_velocity * dt;

        self.local_position += direction * distance_to_move;

        if reaches_destination(distance_to_move, remaining) {
            match self.tile_state {
                TileState::Quiting => {
                    if self.stick_to_tile {
                        // Already past the edge: the next frames step back and forth
                        // across it until the rotation finishes
                        warn!(
                            velocity = self.velocity,
                            target_speed = self.target_speed,
                            "reached the edge while the tile is still rotating"
                        );
                    } else if !self.start_move_to_next_tile(graph) {
                        self.start_falling(graph, game_speed);
                    }
                }
                TileState::Entering => {
                    self.outbox
                        .push(LevelEvent::WalkerReachTileCenter { tile: tile.id });
                    self.start_quiting_tile(graph);
                }
                TileState::Falling => self.resolve_fall(graph, game_speed),
            }
        } else if self.tile_state == TileState::Falling && self.velocity.abs() < REST_SPEED_EPSILON {
            // Coasted to rest short of the fall point
            self.resolve_fall(graph, game_speed);
        }

        self.sync_world(graph);
    }

    fn sync_world(&mut self, graph: &TileGraph) {
        if let Some(tile) = self.current(graph) {
            self.world_position = tile.to_world(self.local_position);
            self.world_heading = tile.dir_to_world(self.local_heading);
        }
    }

    /// Re-express the walker pose in another tile's frame
    fn reparent(&mut self, graph: &TileGraph, next: TileId) {
        self.sync_world(graph);
        self.current_tile = Some(next);
        if let Some(tile) = graph.get(next) {
            self.local_position = tile.to_local(self.world_position);
            self.local_heading = tile.dir_to_local(self.world_heading);
        }
    }

    fn set_heading(&mut self, tile: &Tile, world_dir: Vec3) {
        self.local_heading = tile.dir_to_local(world_dir);
        self.world_heading = world_dir;
    }

    fn start_quiting_tile(&mut self, graph: &TileGraph) {
        self.tile_state = TileState::Quiting;
        let Some(tile) = self.current(graph) else {
            return;
        };

        let direction = tile.closest_direction(tile.dir_to_world(self.local_heading));
        self.set_heading(tile, direction);
        self.sub_destination = Some(SubDestination {
            tile: tile.id,
            local: tile.dir_to_local(direction) * TILE_HALF_SIZE,
        });

        if !self.stick_to_tile {
            self.look_ahead = self.compute_look_ahead(graph, TILE_SIZE);
        }
    }

    fn start_move_to_next_tile(&mut self, graph: &TileGraph) -> bool {
        let Some(edge) = self.sub_destination_world(graph) else {
            return false;
        };
        let Some(next_id) = graph.find_neighbor(self.current_tile, edge) else {
            return false;
        };
        let Some(next) = graph.get(next_id) else {
            return false;
        };
        let Some(prev) = self.current_tile else {
            return false;
        };

        let heading = self.world_heading(graph);
        self.reparent(graph, next_id);
        self.tile_state = TileState::Entering;
        self.sub_destination = Some(SubDestination {
            tile: next_id,
            local: Vec3::ZERO,
        });
        self.set_heading(next, next.closest_direction(heading));

        self.outbox.push(LevelEvent::WalkerDetachFromTile { tile: prev });
        self.outbox.push(LevelEvent::WalkerAttachToTile {
            prev: Some(prev),
            current: next_id,
        });
        true
    }

    fn fall_duration(&self, game_speed: f32) -> f32 {
        let speed = self.speed_before_falling * game_speed;
        if speed > 0.0 {
            TILE_SIZE / speed
        } else {
            0.0
        }
    }

    fn start_falling(&mut self, graph: &TileGraph, game_speed: f32) {
        let Some(tile) = self.current(graph) else {
            return;
        };
        self.tile_state = TileState::Falling;
        self.speed_before_falling = self.target_speed;
        self.target_speed = 0.0;

        let direction = tile.closest_direction(tile.dir_to_world(self.local_heading));
        self.sub_destination = Some(SubDestination {
            tile: tile.id,
            local: tile.dir_to_local(direction) * TILE_SIZE,
        });

        let duration = self.fall_duration(game_speed);
        debug!(tile = %tile.id, duration, "walker start falling");
        self.outbox.push(LevelEvent::WalkerStartFalling { duration });
    }

    fn resolve_fall(&mut self, graph: &TileGraph, game_speed: f32) {
        let save_tile = self
            .sub_destination_world(graph)
            .and_then(|point| graph.find_neighbor(self.current_tile, point));

        match save_tile {
            Some(save) => self.fall_recover(graph, save, game_speed),
            None => {
                info!("walker fell off the level");
                self.detach_from_tile(graph);
                self.go_to_state(graph, WalkerState::Awake);
            }
        }
    }

    fn fall_recover(&mut self, graph: &TileGraph, save: TileId, game_speed: f32) {
        let duration = self.fall_duration(game_speed);
        self.outbox.push(LevelEvent::WalkerFallRecover { duration });

        if let Some(prev) = self.current_tile {
            self.reparent(graph, save);
            self.outbox.push(LevelEvent::WalkerDetachFromTile { tile: prev });
            self.outbox.push(LevelEvent::WalkerAttachToTile {
                prev: Some(prev),
                current: save,
            });
        }

        self.start_quiting_tile(graph);
        self.target_speed = self.speed_before_falling;
    }

    // =====================================================
    // Timing and look-ahead
    // =====================================================

    /// Seconds until the walker leaves its tile at the current target speed
    pub fn time_left_to_quit_current_tile(&self, graph: &TileGraph, game_speed: f32) -> f32 {
        let speed = self.current_speed(game_speed);
        if speed <= 0.0 {
            return 0.0;
        }
        let Some(target) = self.sub_destination_world(graph) else {
            return 0.0;
        };
        let distance = target.distance(self.world_position(graph));
        match self.tile_state {
            TileState::Entering => (distance + TILE_HALF_SIZE) / speed,
            TileState::Quiting => distance / speed,
            TileState::Falling => 0.0,
        }
    }

    pub fn time_to_pass_through_tile(&self, game_speed: f32) -> f32 {
        let speed = self.current_speed(game_speed);
        if speed <= 0.0 {
            f32::INFINITY
        } else {
            TILE_SIZE / speed
        }
    }

    /// Refresh the look-ahead after the floor changed under the walker
    pub fn recalculate_look_ahead(&mut self, graph: &TileGraph) {
        if let Some(look_ahead) = self.compute_look_ahead(graph, TILE_HALF_SIZE) {
            self.look_ahead = Some(look_ahead);
        }
    }

    fn compute_look_ahead(&self, graph: &TileGraph, span: f32) -> Option<LookAhead> {
        let edge = self.sub_destination_world(graph)?;
        let next = graph.get(graph.find_neighbor(self.current_tile, edge)?)?;
        let speed = self.target_speed.max(REST_SPEED_EPSILON);
        Some(LookAhead {
            next_tile: next.id,
            heading: next.closest_direction(self.world_heading(graph)),
            up: next.up(),
            target_position: next.position,
            min_duration: span / speed,
        })
    }
}

impl Default for Walker {
    fn default() -> Self {
        Self::new(WalkerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bevy::math::Quat;

    const DT: f32 = 1.0 / 60.0;

    fn instant() -> WalkerConfig {
        WalkerConfig {
            target_speed: 2.0,
            velocity_smooth_time: 0.0,
        }
    }

    fn line(graph: &mut TileGraph, count: usize) -> Vec<TileId> {
        (0..count)
            .map(|i| graph.add(format!("T{i}"), Vec3::new(i as f32 * TILE_SIZE, 0.0, 0.0), Quat::IDENTITY))
            .collect()
    }

    fn run(walker: &mut Walker, graph: &TileGraph, steps: usize) -> Vec<LevelEvent> {
        let mut events = Vec::new();
        for _ in 0..steps {
            walker.update(graph, DT, 1.0);
            events.extend(walker.take_events());
        }
        events
    }

    #[test]
    fn test_put_on_tile_publishes_attach() {
        let mut graph = TileGraph::new();
        let ids = line(&mut graph, 1);
        let mut walker = Walker::new(instant());
        assert!(walker.init(&graph, ids[0]));
        assert_eq!(
            walker.take_events(),
            vec![LevelEvent::WalkerAttachToTile {
                prev: None,
                current: ids[0]
            }]
        );
        assert_eq!(walker.world_position(&graph), Vec3::ZERO);
        assert!(!walker.put_on_tile(&graph, TileId(99)));
    }

    #[test]
    fn test_walking_sets_edge_destination() {
        let mut graph = TileGraph::new();
        let ids = line(&mut graph, 2);
        let mut walker = Walker::new(instant());
        walker.init(&graph, ids[0]);
        walker.go_to_state(&graph, WalkerState::Walking);
        assert_eq!(walker.tile_state(), TileState::Quiting);
        assert_eq!(
            walker.sub_destination_world(&graph),
            Some(Vec3::new(TILE_HALF_SIZE, 0.0, 0.0))
        );
        assert_eq!(walker.look_ahead().map(|l| l.next_tile), Some(ids[1]));
    }

    #[test]
    fn test_crossing_publishes_detach_then_attach() {
        let mut graph = TileGraph::new();
        let ids = line(&mut graph, 3);
        let mut walker = Walker::new(instant());
        walker.init(&graph, ids[0]);
        walker.go_to_state(&graph, WalkerState::Walking);
        walker.take_events();

        // 1 unit at 2 u/s: half a second to the edge
        let events = run(&mut walker, &graph, 31);
        assert_eq!(walker.current_tile(), Some(ids[1]));
        assert_eq!(walker.tile_state(), TileState::Entering);
        assert_eq!(
            events,
            vec![
                LevelEvent::WalkerDetachFromTile { tile: ids[0] },
                LevelEvent::WalkerAttachToTile {
                    prev: Some(ids[0]),
                    current: ids[1]
                },
            ]
        );
    }

    #[test]
    fn test_reach_center_fires_once_and_quits() {
        let mut graph = TileGraph::new();
        let ids = line(&mut graph, 3);
        let mut walker = Walker::new(instant());
        walker.init(&graph, ids[0]);
        walker.go_to_state(&graph, WalkerState::Walking);
        let events = run(&mut walker, &graph, 70);
        let centers: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, LevelEvent::WalkerReachTileCenter { .. }))
            .collect();
        assert_eq!(centers, vec![&LevelEvent::WalkerReachTileCenter { tile: ids[1] }]);
        assert_eq!(walker.tile_state(), TileState::Quiting);
    }

    #[test]
    fn test_short_steps_never_cross() {
        let mut graph = TileGraph::new();
        let ids = line(&mut graph, 2);
        let mut walker = Walker::new(instant());
        walker.init(&graph, ids[0]);
        walker.go_to_state(&graph, WalkerState::Walking);
        for _ in 0..20 {
            walker.update(&graph, DT, 1.0);
        }
        assert_eq!(walker.current_tile(), Some(ids[0]));
        assert_eq!(walker.tile_state(), TileState::Quiting);
    }

    #[test]
    fn test_fall_off_level_end() {
        let mut graph = TileGraph::new();
        let ids = line(&mut graph, 1);
        let mut walker = Walker::new(instant());
        walker.init(&graph, ids[0]);
        walker.go_to_state(&graph, WalkerState::Walking);
        walker.take_events();

        let mut events = Vec::new();
        for _ in 0..60 {
            walker.update(&graph, DT, 1.0);
            events.extend(walker.take_events());
            if walker.tile_state() == TileState::Falling {
                break;
            }
        }
        assert_eq!(walker.tile_state(), TileState::Falling);
        assert_eq!(walker.target_speed(), 0.0);
        assert_eq!(events, vec![LevelEvent::WalkerStartFalling { duration: 1.0 }]);

        // Instant smoothing: velocity is already zero, so the fall resolves
        let events = run(&mut walker, &graph, 1);
        assert_eq!(
            events,
            vec![
                LevelEvent::WalkerDetachFromTile { tile: ids[0] },
                LevelEvent::WalkerFall
            ]
        );
        assert_eq!(walker.state(), WalkerState::Awake);
        assert_eq!(walker.current_tile(), None);
    }

    #[test]
    fn test_paused_fall_stays_frozen() {
        let mut graph = TileGraph::new();
        let start = graph.add("Start", Vec3::ZERO, Quat::IDENTITY);
        let mut walker = Walker::new(WalkerConfig {
            target_speed: 2.0,
            velocity_smooth_time: 0.3,
        });
        walker.init(&graph, start);
        walker.go_to_state(&graph, WalkerState::Walking);
        let mut steps = 0;
        while walker.tile_state() != TileState::Falling && steps < 600 {
            walker.update(&graph, DT, 1.0);
            steps += 1;
        }
        assert_eq!(walker.tile_state(), TileState::Falling);
        walker.take_events();
        let position = walker.world_position(&graph);

        for _ in 0..120 {
            walker.update(&graph, DT, 0.0);
        }
        assert!(walker.take_events().is_empty());
        assert_eq!(walker.state(), WalkerState::Walking);
        assert_eq!(walker.tile_state(), TileState::Falling);
        assert_eq!(walker.current_tile(), Some(start));
        assert_eq!(walker.world_position(&graph), position);

        // Unpaused, the fall runs its course
        let mut events = Vec::new();
        for _ in 0..600 {
            walker.update(&graph, DT, 1.0);
            events.extend(walker.take_events());
            if walker.state() == WalkerState::Awake {
                break;
            }
        }
        assert_eq!(events.last(), Some(&LevelEvent::WalkerFall));
    }

    #[test]
    fn test_zero_game_speed_freezes_every_tile_state() {
        let mut graph = TileGraph::new();
        let ids = line(&mut graph, 2);
        let mut walker = Walker::new(instant());
        walker.init(&graph, ids[0]);
        walker.go_to_state(&graph, WalkerState::Walking);
        walker.take_events();

        let mut seen = Vec::new();
        for _ in 0..200 {
            let state = walker.tile_state();
            if !seen.contains(&state) {
                seen.push(state);
                let tile = walker.current_tile();
                let position = walker.world_position(&graph);
                for _ in 0..60 {
                    walker.update(&graph, DT, 0.0);
                }
                assert!(walker.take_events().is_empty(), "{state:?} published events");
                assert_eq!(walker.tile_state(), state);
                assert_eq!(walker.current_tile(), tile);
                assert_eq!(walker.world_position(&graph), position);
            }
            if state == TileState::Falling {
                break;
            }
            walker.update(&graph, DT, 1.0);
            walker.take_events();
        }
        assert_eq!(
            seen,
            vec![TileState::Quiting, TileState::Entering, TileState::Falling]
        );
    }

    #[test]
    fn test_game_speed_scales_distance() {
        let mut graph = TileGraph::new();
        let ids = line(&mut graph, 2);

        let mut covered = Vec::new();
        for game_speed in [1.0, 0.5] {
            let mut walker = Walker::new(instant());
            walker.init(&graph, ids[0]);
            walker.go_to_state(&graph, WalkerState::Walking);
            for _ in 0..10 {
                walker.update(&graph, DT, game_speed);
            }
            assert_eq!(walker.current_tile(), Some(ids[0]));
            covered.push(walker.world_position(&graph).x);
        }
        // 10 frames at 2 u/s
        assert!((covered[0] - 20.0 / 60.0).abs() < 1e-4);
        assert!((covered[1] - covered[0] * 0.5).abs() < 1e-4);
    }

    #[test]
    fn test_fall_recovers_when_tile_appears() {
        let mut graph = TileGraph::new();
        let start = graph.add("Start", Vec3::ZERO, Quat::IDENTITY);

        let mut walker = Walker::new(WalkerConfig {
            target_speed: 2.0,
            velocity_smooth_time: 0.3,
        });
        walker.init(&graph, start);
        walker.go_to_state(&graph, WalkerState::Walking);
        let mut steps = 0;
        while walker.tile_state() != TileState::Falling && steps < 600 {
            walker.update(&graph, DT, 1.0);
            steps += 1;
        }
        assert_eq!(walker.tile_state(), TileState::Falling);
        walker.take_events();

        // A tile slides in under the fall point
        let landing = graph.add("Landing", Vec3::new(TILE_SIZE, 0.0, 0.0), Quat::IDENTITY);
        let mut events = Vec::new();
        for _ in 0..600 {
            walker.update(&graph, DT, 1.0);
            events.extend(walker.take_events());
            if walker.current_tile() == Some(landing) {
                break;
            }
        }
        assert!(matches!(events[0], LevelEvent::WalkerFallRecover { .. }));
        assert_eq!(
            events[1..],
            [
                LevelEvent::WalkerDetachFromTile { tile: start },
                LevelEvent::WalkerAttachToTile {
                    prev: Some(start),
                    current: landing
                }
            ]
        );
        assert_eq!(walker.current_tile(), Some(landing));
        assert_eq!(walker.tile_state(), TileState::Quiting);
        assert_eq!(walker.target_speed(), 2.0);
        assert_eq!(walker.state(), WalkerState::Walking);
    }

    #[test]
    fn test_stick_to_tile_holds_at_edge() {
        let mut graph = TileGraph::new();
        let ids = line(&mut graph, 2);
        let mut walker = Walker::new(instant());
        walker.init(&graph, ids[0]);
        walker.go_to_state(&graph, WalkerState::Walking);
        walker.set_stick_to_tile(true);
        run(&mut walker, &graph, 120);
        assert_eq!(walker.current_tile(), Some(ids[0]));
        // Wiggles around the edge instead of leaving
        assert!((walker.world_position(&graph).x - TILE_HALF_SIZE).abs() < 0.1);

        walker.set_stick_to_tile(false);
        run(&mut walker, &graph, 2);
        assert_eq!(walker.current_tile(), Some(ids[1]));
    }

    #[test]
    fn test_time_left_to_quit() {
        let mut graph = TileGraph::new();
        let ids = line(&mut graph, 2);
        let mut walker = Walker::new(instant());
        walker.init(&graph, ids[0]);
        walker.go_to_state(&graph, WalkerState::Walking);
        // Quiting from the center: 1 unit at 2 * 2 u/s
        assert!((walker.time_left_to_quit_current_tile(&graph, 2.0) - 0.25).abs() < 1e-5);
        assert!((walker.time_to_pass_through_tile(2.0) - 0.5).abs() < 1e-5);
    }

    #[test]
    fn test_rides_rotating_tile() {
        let mut graph = TileGraph::new();
        let ids = line(&mut graph, 1);
        let up = graph.add("Up", Vec3::new(0.0, TILE_SIZE, 0.0), Quat::IDENTITY);
        let mut walker = Walker::new(instant());
        walker.init(&graph, ids[0]);
        walker.go_to_state(&graph, WalkerState::Walking);

        graph.set_rotation(ids[0], Quat::from_rotation_z(std::f32::consts::FRAC_PI_2));
        walker.recalculate_look_ahead(&graph);
        assert_eq!(walker.look_ahead().map(|l| l.next_tile), Some(up));

        run(&mut walker, &graph, 31);
        assert_eq!(walker.current_tile(), Some(up));
    }

    #[test]
    fn test_inactive_walker_does_not_move() {
        let mut graph = TileGraph::new();
        let ids = line(&mut graph, 2);
        let mut walker = Walker::new(instant());
        walker.init(&graph, ids[0]);
        walker.go_to_state(&graph, WalkerState::Walking);
        walker.set_active(false);
        run(&mut walker, &graph, 100);
        assert_eq!(walker.world_position(&graph), Vec3::ZERO);
    }
}
