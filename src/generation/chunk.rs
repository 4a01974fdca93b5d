//! Chunk templates and their assembly into the tile graph.
//!
//! A template is authored content: tiles in chunk-local coordinates with
//! entry/exit markers, typed triggers, wheels and tubes referencing sibling
//! tiles by name. Templates are validated when registered, so a chunk that
//! made it into the library can always be instantiated.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use bevy::math::{EulerRot, Quat, Vec3};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::constants::{FULL_ACTIVE_RADIUS, TILE_SIZE, UNLIMITED_HITS};
use crate::error::{ConfigError, LevelError};
use crate::movement::Ease;
use crate::script::TriggerScript;
use crate::tile::{ChunkId, TileGraph, TileId, TileWheel, TubeLink};
use crate::trigger::{TileTrigger, TileTriggerKind, TriggerCore, TriggerEffect};

fn default_true() -> bool {
    true
}

fn default_max_hit_count() -> i32 {
    UNLIMITED_HITS
}

fn default_active_radius() -> f32 {
    FULL_ACTIVE_RADIUS
}

fn euler_degrees(angles: [f32; 3]) -> Quat {
    Quat::from_euler(
        EulerRot::XYZ,
        angles[0].to_radians(),
        angles[1].to_radians(),
        angles[2].to_radians(),
    )
}

/// Entry or exit marker on a template tile
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarkerTemplate {
    #[serde(default = "default_true")]
    pub active: bool,
}

impl Default for MarkerTemplate {
    fn default() -> Self {
        Self { active: true }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKindTemplate {
    Enter,
    Exit,
    ReachCenter,
    Button,
}

impl From<TriggerKindTemplate> for TileTriggerKind {
    fn from(kind: TriggerKindTemplate) -> Self {
        match kind {
            TriggerKindTemplate::Enter => TileTriggerKind::Enter,
            TriggerKindTemplate::Exit => TileTriggerKind::Exit,
            TriggerKindTemplate::ReachCenter => TileTriggerKind::ReachCenter,
            TriggerKindTemplate::Button => TileTriggerKind::Button,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerTemplate {
    pub kind: TriggerKindTemplate,
    #[serde(default = "default_max_hit_count")]
    pub max_hit_count: i32,
    #[serde(default = "default_active_radius")]
    pub active_radius: f32,
    #[serde(default = "default_true")]
    pub one_hit_max_per_visit: bool,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub effects: Vec<TriggerEffect>,
    #[serde(default)]
    pub script: Option<String>,
    /// Allow `wait`, `yield` and `waituntil` in the script
    #[serde(default)]
    pub suspendable: bool,
}

impl TriggerTemplate {
    pub fn new(kind: TriggerKindTemplate) -> Self {
        Self {
            kind,
            max_hit_count: UNLIMITED_HITS,
            active_radius: FULL_ACTIVE_RADIUS,
            one_hit_max_per_visit: true,
            is_active: true,
            effects: Vec::new(),
            script: None,
            suspendable: false,
        }
    }

    fn build(&self) -> Result<TileTrigger, LevelError> {
        let script = self
            .script
            .as_deref()
            .map(|source| TriggerScript::parse(source, self.suspendable))
            .transpose()?;
        let mut core = TriggerCore::new(self.max_hit_count)?
            .with_effects(self.effects.clone())
            .with_script(script);
        core.is_active = self.is_active;
        Ok(TileTrigger::new(self.kind.into(), core, self.active_radius)?
            .with_one_hit_max_per_visit(self.one_hit_max_per_visit))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WheelRotationTemplate {
    /// Sibling tile the walker came from
    pub enter_tile: String,
    pub euler_degrees: [f32; 3],
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WheelTemplate {
    #[serde(default)]
    pub ease: Ease,
    pub rotations: Vec<WheelRotationTemplate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TubeTemplate {
    pub connected: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileTemplate {
    pub name: String,
    /// Chunk-local position
    pub position: [f32; 3],
    /// Euler angles in degrees, applied X then Y then Z
    #[serde(default)]
    pub rotation: [f32; 3],
    #[serde(default)]
    pub entry: Option<MarkerTemplate>,
    #[serde(default)]
    pub exit: Option<MarkerTemplate>,
    #[serde(default)]
    pub triggers: Vec<TriggerTemplate>,
    #[serde(default)]
    pub wheel: Option<WheelTemplate>,
    #[serde(default)]
    pub tube: Option<TubeTemplate>,
}

impl TileTemplate {
    pub fn new(name: impl Into<String>, position: [f32; 3]) -> Self {
        Self {
            name: name.into(),
            position,
            rotation: [0.0; 3],
            entry: None,
            exit: None,
            triggers: Vec::new(),
            wheel: None,
            tube: None,
        }
    }

    pub fn local_position(&self) -> Vec3 {
        Vec3::from_array(self.position)
    }

    pub fn local_rotation(&self) -> Quat {
        euler_degrees(self.rotation)
    }
}

/// Side effects and script run once when the chunk is positioned
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SpawnTemplate {
    #[serde(default)]
    pub cue: Option<String>,
    #[serde(default)]
    pub script: Option<String>,
    #[serde(default)]
    pub suspendable: bool,
}

impl SpawnTemplate {
    fn build(&self) -> Result<TriggerCore, LevelError> {
        let script = self
            .script
            .as_deref()
            .map(|source| TriggerScript::parse(source, self.suspendable))
            .transpose()?;
        let effects = self
            .cue
            .iter()
            .map(|cue| TriggerEffect::Animate { cue: cue.clone() })
            .collect();
        Ok(TriggerCore::new(1)?.with_effects(effects).with_script(script))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkTemplate {
    pub name: String,
    pub tiles: Vec<TileTemplate>,
    #[serde(default)]
    pub spawn: SpawnTemplate,
}

impl ChunkTemplate {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let template: ChunkTemplate = serde_json::from_str(text)?;
        template.validate()?;
        Ok(template)
    }

    /// Straight run of `length` tiles along local X, entry first, exit last
    pub fn straight(name: impl Into<String>, length: usize) -> Self {
        let length = length.max(1);
        let tiles = (0..length)
            .map(|i| {
                let mut tile = TileTemplate::new(format!("T{i}"), [i as f32 * TILE_SIZE, 0.0, 0.0]);
                if i == 0 {
                    tile.entry = Some(MarkerTemplate::default());
                }
                if i == length - 1 {
                    tile.exit = Some(MarkerTemplate::default());
                }
                tile
            })
            .collect();
        Self {
            name: name.into(),
            tiles,
            spawn: SpawnTemplate::default(),
        }
    }

    pub fn tile(&self, name: &str) -> Option<&TileTemplate> {
        self.tiles.iter().find(|t| t.name == name)
    }

    pub fn tile_mut(&mut self, name: &str) -> Option<&mut TileTemplate> {
        self.tiles.iter_mut().find(|t| t.name == name)
    }

    /// Check everything instantiation relies on
    pub fn validate(&self) -> Result<(), LevelError> {
        let mut names = HashSet::new();
        for tile in &self.tiles {
            if !names.insert(tile.name.as_str()) {
                return Err(LevelError::DuplicateTileName {
                    chunk: self.name.clone(),
                    tile: tile.name.clone(),
                });
            }
        }

        if !self.tiles.iter().any(|t| t.entry.is_some()) {
            return Err(self.missing_markers("entry"));
        }
        if !self.tiles.iter().any(|t| t.exit.is_some()) {
            return Err(self.missing_markers("exit"));
        }

        let unknown = |tile: &str| LevelError::UnknownTileReference {
            chunk: self.name.clone(),
            tile: tile.to_string(),
        };

        for tile in &self.tiles {
            for trigger in &tile.triggers {
                trigger.build()?;
                for effect in &trigger.effects {
                    self.check_effect(tile, effect)?;
                }
            }
            if let Some(wheel) = &tile.wheel {
                if let Some(r) = wheel.rotations.iter().find(|r| !names.contains(r.enter_tile.as_str())) {
                    return Err(unknown(&r.enter_tile));
                }
            }
            if let Some(tube) = &tile.tube {
                if !names.contains(tube.connected.as_str()) {
                    return Err(unknown(&tube.connected));
                }
            }
        }

        self.spawn.build()?;
        Ok(())
    }

    fn missing_markers(&self, marker: &'static str) -> LevelError {
        LevelError::MissingMarkers {
            chunk: self.name.clone(),
            marker,
        }
    }

    fn check_effect(&self, tile: &TileTemplate, effect: &TriggerEffect) -> Result<(), LevelError> {
        let missing = |component: &'static str| LevelError::MissingComponent {
            chunk: self.name.clone(),
            tile: tile.name.clone(),
            effect: effect.name(),
            component,
        };
        match effect {
            TriggerEffect::RotateWheel if tile.wheel.is_none() => Err(missing("wheel")),
            TriggerEffect::RotateWheel
                if !tile.triggers.iter().any(|t| t.kind == TriggerKindTemplate::Button) =>
            {
                Err(missing("button trigger"))
            }
            TriggerEffect::TubeTeleport if tile.tube.is_none() => Err(missing("tube")),
            _ => Ok(()),
        }
    }
}

/// Templates by name
#[derive(Debug, Clone, Default)]
pub struct ChunkLibrary {
    templates: BTreeMap<String, ChunkTemplate>,
}

impl ChunkLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and register a template
    pub fn insert(&mut self, template: ChunkTemplate) -> Result<(), ConfigError> {
        if self.templates.contains_key(&template.name) {
            return Err(ConfigError::DuplicateTemplate(template.name));
        }
        template.validate()?;
        self.templates.insert(template.name.clone(), template);
        Ok(())
    }

    pub fn with(mut self, template: ChunkTemplate) -> Result<Self, ConfigError> {
        self.insert(template)?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&ChunkTemplate> {
        self.templates.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Load every `*.json` file of `dir`, in file name order
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let dir = dir.as_ref();
        let io_err = |source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        };
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(io_err)? {
            let path = entry.map_err(io_err)?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut library = Self::new();
        for path in paths {
            let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
                path: path.clone(),
                source,
            })?;
            library.insert(ChunkTemplate::from_json(&text)?)?;
        }
        info!(dir = %dir.display(), count = library.len(), "chunk templates loaded");
        Ok(library)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkMarker {
    pub tile: TileId,
    pub active: bool,
}

/// A chunk living in the tile graph
#[derive(Debug, Clone)]
pub struct LevChunk {
    pub id: ChunkId,
    pub name: String,
    pub seed: i64,
    pub root: Vec3,
    pub tiles: Vec<TileId>,
    pub entries: Vec<ChunkMarker>,
    pub exits: Vec<ChunkMarker>,
    pub spawn_trigger: TriggerCore,
}

impl LevChunk {
    pub fn active_entries(&self) -> Vec<TileId> {
        self.entries.iter().filter(|m| m.active).map(|m| m.tile).collect()
    }

    pub fn active_exits(&self) -> Vec<TileId> {
        self.exits.iter().filter(|m| m.active).map(|m| m.tile).collect()
    }

    pub fn owns(&self, tile: TileId) -> bool {
        self.tiles.contains(&tile)
    }
}

/// Chosen markers and the new level end after alignment
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aligned {
    pub entry: TileId,
    pub exit: TileId,
    pub exit_position: Vec3,
}

/// Creates, positions and destroys chunks
#[derive(Debug, Default)]
pub struct ChunkAssembler {
    next_id: u64,
}

impl ChunkAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the template's tiles around `connection_point`
    pub fn instantiate(
        &mut self,
        template: &ChunkTemplate,
        seed: i64,
        graph: &mut TileGraph,
        connection_point: Vec3,
    ) -> Result<LevChunk, LevelError> {
        template.validate()?;

        let id = ChunkId(self.next_id);
        self.next_id += 1;

        let mut by_name: HashMap<&str, TileId> = HashMap::with_capacity(template.tiles.len());
        let mut chunk = LevChunk {
            id,
            name: template.name.clone(),
            seed,
            root: connection_point,
            tiles: Vec::with_capacity(template.tiles.len()),
            entries: Vec::new(),
            exits: Vec::new(),
            spawn_trigger: template.spawn.build()?,
        };

        for tile in &template.tiles {
            let tile_id = graph.add(
                tile.name.clone(),
                connection_point + tile.local_position(),
                tile.local_rotation(),
            );
            by_name.insert(tile.name.as_str(), tile_id);
            chunk.tiles.push(tile_id);
        }

        for tile in &template.tiles {
            let tile_id = by_name[tile.name.as_str()];
            let mut triggers = tile
                .triggers
                .iter()
                .map(TriggerTemplate::build)
                .collect::<Result<Vec<_>, _>>()?;

            if let Some(marker) = tile.entry {
                chunk.entries.push(ChunkMarker {
                    tile: tile_id,
                    active: marker.active,
                });
                triggers.push(TileTrigger::simple(TileTriggerKind::ChunkEnter(id)));
            }
            if let Some(marker) = tile.exit {
                chunk.exits.push(ChunkMarker {
                    tile: tile_id,
                    active: marker.active,
                });
                triggers.push(TileTrigger::simple(TileTriggerKind::ChunkExit(id)));
            }

            let wheel = tile.wheel.as_ref().map(|w| {
                w.rotations
                    .iter()
                    .fold(TileWheel::new(w.ease), |wheel, r| {
                        wheel.with_rotation(by_name[r.enter_tile.as_str()], euler_degrees(r.euler_degrees))
                    })
            });
            let tube = tile.tube.as_ref().map(|t| TubeLink {
                connected: by_name[t.connected.as_str()],
            });

            if let Some(created) = graph.get_mut(tile_id) {
                created.chunk = Some(id);
                created.triggers = triggers;
                created.wheel = wheel;
                created.tube = tube;
            }
        }

        debug!(chunk = %id, name = %chunk.name, tiles = chunk.tiles.len(), "chunk instantiated");
        Ok(chunk)
    }

    /// Snap a freshly instantiated chunk to the end of the level.
    ///
    /// Entry and exit are drawn uniformly among the active markers; the
    /// chunk moves so its entry sits one tile past `previous_exit`.
    pub fn align(
        &self,
        chunk: &mut LevChunk,
        graph: &mut TileGraph,
        previous_exit: Vec3,
        rng: &mut impl Rng,
    ) -> Result<Aligned, LevelError> {
        let entries = chunk.active_entries();
        if entries.is_empty() {
            error!(chunk = %chunk.name, "no active entry found in chunk");
            return Err(LevelError::MissingMarkers {
                chunk: chunk.name.clone(),
                marker: "active entry",
            });
        }
        let entry = entries[rng.gen_range(0..entries.len())];

        let exits = chunk.active_exits();
        if exits.is_empty() {
            error!(chunk = %chunk.name, "no active exit found in chunk");
            return Err(LevelError::MissingMarkers {
                chunk: chunk.name.clone(),
                marker: "active exit",
            });
        }
        let exit = exits[rng.gen_range(0..exits.len())];

        let entry_position = graph.get(entry).map(|t| t.position).unwrap_or(chunk.root);
        let offset = previous_exit - entry_position + Vec3::X * TILE_SIZE;
        graph.translate(&chunk.tiles, offset);
        chunk.root += offset;

        let exit_position = graph.get(exit).map(|t| t.position).unwrap_or(chunk.root);
        Ok(Aligned {
            entry,
            exit,
            exit_position,
        })
    }

    /// Remove every tile of the chunk from the graph
    pub fn destroy(&self, chunk: &LevChunk, graph: &mut TileGraph) {
        for tile in &chunk.tiles {
            graph.remove(*tile);
        }
        debug!(chunk = %chunk.id, name = %chunk.name, "chunk destroyed");
    }
}
