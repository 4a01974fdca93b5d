//! Tile geometry and the spatial tile graph.
//!
//! Every tile is a square of edge `TILE_SIZE` with its own frame:
//! local X is forward, local Y is right, local Z is the surface normal.
//! The graph is the arena owning every live tile; neighbor discovery is an
//! overlap query against tile collider spheres.

pub mod tube;
pub mod wheel;

use std::collections::BTreeMap;
use std::fmt;

use bevy::math::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::constants::{TILE_COLLIDER_RADIUS, TILE_HALF_SIZE};
use crate::trigger::{TileTrigger, TileTriggerKind};

pub use tube::TubeLink;
pub use wheel::TileWheel;

/// Stable identity of a tile inside one session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileId(pub u64);

/// Stable identity of an instantiated chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkId(pub u64);

impl fmt::Display for TileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tile#{}", self.0)
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chunk#{}", self.0)
    }
}

/// One walkable square of floor
#[derive(Debug, Clone)]
pub struct Tile {
    pub id: TileId,
    pub name: String,
    pub chunk: Option<ChunkId>,
    pub position: Vec3,
    pub rotation: Quat,
    pub collider_radius: f32,
    pub triggers: Vec<TileTrigger>,
    pub wheel: Option<TileWheel>,
    pub tube: Option<TubeLink>,
}

impl Tile {
    pub fn new(id: TileId, name: impl Into<String>, position: Vec3, rotation: Quat) -> Self {
        Self {
            id,
            name: name.into(),
            chunk: None,
            position,
            rotation,
            collider_radius: TILE_COLLIDER_RADIUS,
            triggers: Vec::new(),
            wheel: None,
            tube: None,
        }
    }

    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::X
    }

    pub fn right(&self) -> Vec3 {
        self.rotation * Vec3::Y
    }

    pub fn normal(&self) -> Vec3 {
        self.rotation * Vec3::Z
    }

    /// Alias of `normal`, the walker's up vector while on this tile
    pub fn up(&self) -> Vec3 {
        self.normal()
    }

    /// The four cardinal axes in tie-break order
    pub fn cardinal_axes(&self) -> [Vec3; 4] {
        let forward = self.forward();
        let right = self.right();
        [forward, right, -right, -forward]
    }

    /// Cardinal axis with the largest dot product against `direction`.
    /// Ties keep the earliest axis.
    pub fn closest_direction(&self, direction: Vec3) -> Vec3 {
        let axes = self.cardinal_axes();
        let mut best = axes[0];
        let mut best_dot = best.dot(direction);
        for axis in &axes[1..] {
            let dot = axis.dot(direction);
            if dot > best_dot {
                best_dot = dot;
                best = *axis;
            }
        }
        best
    }

    pub fn to_world(&self, local: Vec3) -> Vec3 {
        self.position + self.rotation * local
    }

    pub fn to_local(&self, world: Vec3) -> Vec3 {
        self.rotation.inverse() * (world - self.position)
    }

    pub fn dir_to_world(&self, local_dir: Vec3) -> Vec3 {
        self.rotation * local_dir
    }

    pub fn dir_to_local(&self, world_dir: Vec3) -> Vec3 {
        self.rotation.inverse() * world_dir
    }

    pub fn has_trigger(&self, kind: &TileTriggerKind) -> bool {
        self.triggers.iter().any(|t| &t.kind == kind)
    }

    /// Indices of the triggers of one kind, in declaration order
    pub fn trigger_indices(&self, matches: impl Fn(&TileTriggerKind) -> bool) -> Vec<usize> {
        self.triggers
            .iter()
            .enumerate()
            .filter(|(_, t)| matches(&t.kind))
            .map(|(i, _)| i)
            .collect()
    }
}

/// Arena of all live tiles with spatial queries
#[derive(Debug, Default)]
pub struct TileGraph {
    tiles: BTreeMap<TileId, Tile>,
    next_id: u64,
}

impl TileGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a bare tile and return its id
    pub fn add(&mut self, name: impl Into<String>, position: Vec3, rotation: Quat) -> TileId {
        let id = TileId(self.next_id);
        self.next_id += 1;
        self.tiles.insert(id, Tile::new(id, name, position, rotation));
        id
    }

    pub fn remove(&mut self, id: TileId) -> Option<Tile> {
        self.tiles.remove(&id)
    }

    pub fn get(&self, id: TileId) -> Option<&Tile> {
        self.tiles.get(&id)
    }

    pub fn get_mut(&mut self, id: TileId) -> Option<&mut Tile> {
        self.tiles.get_mut(&id)
    }

    pub fn contains(&self, id: TileId) -> bool {
        self.tiles.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tile> {
        self.tiles.values()
    }

    pub fn clear(&mut self) {
        self.tiles.clear();
    }

    /// First tile with this name, lowest id wins
    pub fn find_by_name(&self, name: &str) -> Option<TileId> {
        self.tiles.values().find(|t| t.name == name).map(|t| t.id)
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.find_by_name(name).is_some()
    }

    /// Tiles whose collider sphere strictly intersects the query sphere,
    /// nearest center first
    pub fn overlap_sphere(&self, point: Vec3, radius: f32) -> Vec<TileId> {
        let mut hits: Vec<(f32, TileId)> = self
            .tiles
            .values()
            .filter_map(|tile| {
                let distance = tile.position.distance(point);
                (distance < radius + tile.collider_radius).then_some((distance, tile.id))
            })
            .collect();
        hits.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        hits.into_iter().map(|(_, id)| id).collect()
    }

    /// Tile next to `current` around `point`, or `None` past the level edge
    pub fn find_neighbor(&self, current: Option<TileId>, point: Vec3) -> Option<TileId> {
        self.overlap_sphere(point, TILE_HALF_SIZE)
            .into_iter()
            .find(|id| Some(*id) != current)
    }

    /// Move a set of tiles rigidly
    pub fn translate(&mut self, ids: &[TileId], offset: Vec3) {
        for id in ids {
            if let Some(tile) = self.tiles.get_mut(id) {
                tile.position += offset;
            }
        }
    }

    pub fn set_rotation(&mut self, id: TileId, rotation: Quat) -> bool {
        match self.tiles.get_mut(&id) {
            Some(tile) => {
                tile.rotation = rotation;
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::TILE_SIZE;

    fn straight_line(graph: &mut TileGraph, count: usize) -> Vec<TileId> {
        (0..count)
            .map(|i| {
                graph.add(
                    format!("Tile_{i}"),
                    Vec3::new(i as f32 * TILE_SIZE, 0.0, 0.0),
                    Quat::IDENTITY,
                )
            })
            .collect()
    }

    #[test]
    fn test_frame_axes_identity() {
        let mut graph = TileGraph::new();
        let id = graph.add("T", Vec3::ZERO, Quat::IDENTITY);
        let tile = graph.get(id).unwrap();
        assert_eq!(tile.forward(), Vec3::X);
        assert_eq!(tile.right(), Vec3::Y);
        assert_eq!(tile.normal(), Vec3::Z);
    }

    #[test]
    fn test_closest_direction_picks_axis() {
        let tile = Tile::new(TileId(0), "T", Vec3::ZERO, Quat::IDENTITY);
        assert_eq!(tile.closest_direction(Vec3::new(0.9, 0.1, 0.0)), Vec3::X);
        assert_eq!(tile.closest_direction(Vec3::new(0.1, 0.9, 0.0)), Vec3::Y);
        assert_eq!(tile.closest_direction(Vec3::new(0.1, -0.9, 0.0)), -Vec3::Y);
        assert_eq!(tile.closest_direction(Vec3::new(-0.9, 0.2, 0.0)), -Vec3::X);
    }

    #[test]
    fn test_closest_direction_tie_keeps_first_axis() {
        let tile = Tile::new(TileId(0), "T", Vec3::ZERO, Quat::IDENTITY);
        // Exactly between forward and right
        assert_eq!(tile.closest_direction(Vec3::new(1.0, 1.0, 0.0)), Vec3::X);
        // Pure normal: every axis scores zero
        assert_eq!(tile.closest_direction(Vec3::Z), Vec3::X);
    }

    #[test]
    fn test_local_world_roundtrip_rotated() {
        let rotation = Quat::from_rotation_z(std::f32::consts::FRAC_PI_2);
        let tile = Tile::new(TileId(0), "T", Vec3::new(4.0, 0.0, 0.0), rotation);
        let local = Vec3::new(1.0, 0.0, 0.0);
        let world = tile.to_world(local);
        assert!((world - Vec3::new(4.0, 1.0, 0.0)).length() < 1e-5);
        assert!((tile.to_local(world) - local).length() < 1e-5);
        assert!((tile.dir_to_local(tile.dir_to_world(Vec3::Y)) - Vec3::Y).length() < 1e-5);
    }

    #[test]
    fn test_find_neighbor_at_edge() {
        let mut graph = TileGraph::new();
        let ids = straight_line(&mut graph, 3);
        let edge = Vec3::new(TILE_HALF_SIZE, 0.0, 0.0);
        assert_eq!(graph.find_neighbor(Some(ids[0]), edge), Some(ids[1]));
    }

    #[test]
    fn test_find_neighbor_none_past_level_end() {
        let mut graph = TileGraph::new();
        let ids = straight_line(&mut graph, 2);
        let edge = Vec3::new(TILE_SIZE + TILE_HALF_SIZE, 0.0, 0.0);
        assert_eq!(graph.find_neighbor(Some(ids[1]), edge), None);
    }

    #[test]
    fn test_overlap_is_strict_and_sorted() {
        let mut graph = TileGraph::new();
        let ids = straight_line(&mut graph, 3);
        // Touching exactly at radius + collider is not an overlap
        let touching = graph.overlap_sphere(Vec3::new(-2.0, 0.0, 0.0), 1.0);
        assert!(touching.is_empty());

        let hits = graph.overlap_sphere(Vec3::new(2.5, 0.0, 0.0), 1.0);
        assert_eq!(hits, vec![ids[1], ids[2]]);
    }

    #[test]
    fn test_diagonal_tile_is_not_a_neighbor() {
        let mut graph = TileGraph::new();
        let a = graph.add("A", Vec3::ZERO, Quat::IDENTITY);
        graph.add("Diag", Vec3::new(TILE_SIZE, TILE_SIZE, 0.0), Quat::IDENTITY);
        assert_eq!(graph.find_neighbor(Some(a), Vec3::new(TILE_HALF_SIZE, 0.0, 0.0)), None);
    }

    #[test]
    fn test_name_lookup_and_removal() {
        let mut graph = TileGraph::new();
        let ids = straight_line(&mut graph, 2);
        assert_eq!(graph.find_by_name("Tile_1"), Some(ids[1]));
        assert!(graph.remove(ids[1]).is_some());
        assert!(!graph.contains_name("Tile_1"));
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn test_translate_moves_only_listed_tiles() {
        let mut graph = TileGraph::new();
        let ids = straight_line(&mut graph, 2);
        graph.translate(&ids[..1], Vec3::new(0.0, 5.0, 0.0));
        assert_eq!(graph.get(ids[0]).unwrap().position, Vec3::new(0.0, 5.0, 0.0));
        assert_eq!(graph.get(ids[1]).unwrap().position, Vec3::new(TILE_SIZE, 0.0, 0.0));
    }
}
