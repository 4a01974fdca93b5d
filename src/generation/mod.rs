//! Streaming level generation.
//!
//! The generator keeps the area around a pointer that follows the walker
//! filled with chunks. It runs cooperatively: `pump` is called once per
//! frame and instantiates at most one chunk, aligning it on the following
//! call, so a newly created chunk always gets one frame to settle before it
//! is positioned.

pub mod chunk;
pub mod scheduler;
pub mod segment;

use std::collections::BTreeMap;

use bevy::math::Vec3;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::constants::{DEFAULT_GENERATOR_RADIUS, DEFAULT_LAST_EVER_SEGMENT};
use crate::events::LevelEvent;
use crate::logging::ChunkSpawnSpan;
use crate::tile::{ChunkId, TileGraph, TileId};

use chunk::{ChunkAssembler, ChunkLibrary, LevChunk};
use scheduler::SegmentScheduler;
use segment::SegmentSource;

/// Chunk requests skipped in one pump before it yields
const MAX_SKIPPED_REQUESTS: u32 = 64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Radius around the pointer that must be covered by chunks
    pub pointer_radius: f32,
    /// Missing segments from this index on load the final stub
    pub last_ever_segment: i64,
    pub start_segment: i64,
    /// One of these leads every non-stub segment
    pub checkpoint_chunks: Vec<String>,
    pub final_stub_chunks: Vec<String>,
    /// Destroy chunks far behind the pointer
    pub cleanup_enabled: bool,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            pointer_radius: DEFAULT_GENERATOR_RADIUS,
            last_ever_segment: DEFAULT_LAST_EVER_SEGMENT,
            start_segment: 0,
            checkpoint_chunks: Vec::new(),
            final_stub_chunks: vec!["FinalStubA".to_string(), "FinalStubB".to_string()],
            cleanup_enabled: false,
        }
    }
}

/// What one `pump` changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PumpReport {
    /// Chunks aligned this frame; their spawn triggers are due
    pub positioned: Vec<ChunkId>,
    pub destroyed: Vec<ChunkId>,
}

pub struct LevelGenerator {
    config: GeneratorConfig,
    library: ChunkLibrary,
    assembler: ChunkAssembler,
    scheduler: SegmentScheduler,
    chunks: BTreeMap<ChunkId, LevChunk>,
    pending: Option<LevChunk>,
    pointer: Vec3,
    last_exit: Vec3,
    last_chunk: Option<ChunkId>,
    starting_tile: Option<TileId>,
    first_pack: bool,
    running: bool,
    outbox: Vec<LevelEvent>,
}

impl std::fmt::Debug for LevelGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LevelGenerator")
            .field("running", &self.running)
            .field("chunks", &self.chunks.len())
            .field("pending", &self.pending.as_ref().map(|c| c.id))
            .field("pointer", &self.pointer)
            .field("last_exit", &self.last_exit)
            .field("scheduler", &self.scheduler)
            .finish()
    }
}

impl LevelGenerator {
    pub fn new(
        config: GeneratorConfig,
        library: ChunkLibrary,
        segments: Box<dyn SegmentSource>,
        session_seed: u64,
    ) -> Self {
        let scheduler = SegmentScheduler::new(segments, &config, session_seed);
        Self {
            config,
            library,
            assembler: ChunkAssembler::new(),
            scheduler,
            chunks: BTreeMap::new(),
            pending: None,
            pointer: Vec3::ZERO,
            last_exit: Vec3::ZERO,
            last_chunk: None,
            starting_tile: None,
            first_pack: false,
            running: false,
            outbox: Vec::new(),
        }
    }

    /// Begin a fresh generation at the configured start segment
    pub fn start(&mut self, graph: &mut TileGraph) {
        self.stop(graph);
        self.pointer = Vec3::ZERO;
        self.last_exit = Vec3::ZERO;
        self.last_chunk = None;
        self.starting_tile = None;
        self.first_pack = false;
        self.scheduler.restart(self.config.start_segment);
        self.running = true;
        info!(segment = self.config.start_segment, "level generation started");
    }

    /// Stop generating and purge every chunk. Safe to call repeatedly.
    pub fn stop(&mut self, graph: &mut TileGraph) {
        if self.running {
            info!("level generation stopped");
        }
        self.running = false;
        self.purge(graph);
    }

    fn purge(&mut self, graph: &mut TileGraph) {
        if let Some(pending) = self.pending.take() {
            self.assembler.destroy(&pending, graph);
        }
        for (id, chunk) in std::mem::take(&mut self.chunks) {
            self.assembler.destroy(&chunk, graph);
            self.outbox.push(LevelEvent::ChunkDestroyed { chunk: id });
        }
        self.last_chunk = None;
    }

    /// One cooperative generator iteration.
    ///
    /// `walker_position` drives the pointer; `protected` is the chunk the
    /// walker stands on, never removed by cleanup.
    pub fn pump(
        &mut self,
        graph: &mut TileGraph,
        walker_position: Vec3,
        protected: Option<ChunkId>,
    ) -> PumpReport {
        let mut report = PumpReport::default();
        if !self.running {
            return report;
        }

        if let Some(pending) = self.pending.take() {
            // Resume the inner loop where the last frame yielded
            if let Some(id) = self.position_pending(pending, graph) {
                report.positioned.push(id);
            }
        } else {
            if self.first_pack {
                self.first_pack = false;
                if let Some(starting_tile) = self.starting_tile {
                    info!(tile = %starting_tile, "level loaded");
                    self.outbox.push(LevelEvent::LevelLoaded { starting_tile });
                }
            }
            self.update_pointer(walker_position);
        }

        if self.spawn_next(graph) {
            return report;
        }

        if self.config.cleanup_enabled {
            report.destroyed = self.cleanup(graph, protected);
        }
        report
    }

    fn update_pointer(&mut self, walker_position: Vec3) {
        self.pointer = Vec3::new(
            walker_position.x.max(self.pointer.x),
            walker_position.y,
            walker_position.z,
        );
    }

    /// Instantiate the next chunk if the pointer area needs one.
    /// Returns true when a chunk is waiting for alignment.
    fn spawn_next(&mut self, graph: &mut TileGraph) -> bool {
        let mut skipped = 0;
        while self.last_exit.distance(self.pointer) < self.config.pointer_radius {
            let Some(request) = self.scheduler.next_chunk() else {
                return false;
            };
            self.outbox.append(&mut self.scheduler.take_events());

            let Some(template) = self.library.get(&request.name) else {
                error!(chunk = %request.name, "unknown chunk template, skipping");
                skipped += 1;
                if skipped >= MAX_SKIPPED_REQUESTS {
                    return false;
                }
                continue;
            };

            let segment = self.scheduler.current_index();
            let _span = ChunkSpawnSpan::enter(&request.name, segment);
            info!(chunk = %request.name, segment, "spawning level chunk");
            match self
                .assembler
                .instantiate(template, request.seed, graph, self.last_exit)
            {
                Ok(chunk) => {
                    self.pending = Some(chunk);
                    return true;
                }
                Err(e) => {
                    error!(chunk = %request.name, error = %e, "chunk instantiation failed");
                    skipped += 1;
                    if skipped >= MAX_SKIPPED_REQUESTS {
                        return false;
                    }
                }
            }
        }
        // The scheduler may have switched segments without handing out a chunk
        self.outbox.append(&mut self.scheduler.take_events());
        false
    }

    fn position_pending(&mut self, mut chunk: LevChunk, graph: &mut TileGraph) -> Option<ChunkId> {
        let aligned = match self.assembler.align(
            &mut chunk,
            graph,
            self.last_exit,
            self.scheduler.rng_mut(),
        ) {
            Ok(aligned) => aligned,
            Err(e) => {
                error!(chunk = %chunk.name, error = %e, "chunk aborted");
                self.assembler.destroy(&chunk, graph);
                return None;
            }
        };

        if self.last_chunk.is_none() && self.starting_tile.is_none() {
            self.first_pack = true;
            self.starting_tile = Some(aligned.entry);
        }

        let id = chunk.id;
        self.outbox.push(LevelEvent::ChunkSpawned {
            chunk: id,
            name: chunk.name.clone(),
        });
        self.last_chunk = Some(id);
        self.last_exit = aligned.exit_position;
        self.chunks.insert(id, chunk);
        Some(id)
    }

    fn cleanup(&mut self, graph: &mut TileGraph, protected: Option<ChunkId>) -> Vec<ChunkId> {
        let far: Vec<ChunkId> = self
            .chunks
            .values()
            .filter(|c| Some(c.id) != protected && Some(c.id) != self.last_chunk)
            .filter(|c| c.root.distance(self.pointer) > self.config.pointer_radius)
            .map(|c| c.id)
            .collect();

        for id in &far {
            if let Some(chunk) = self.chunks.remove(id) {
                self.assembler.destroy(&chunk, graph);
                self.outbox.push(LevelEvent::ChunkDestroyed { chunk: *id });
            }
        }
        far
    }

    /// Activate segment `index` now (`setsegcfg`)
    pub fn set_segment(&mut self, index: i64) {
        self.scheduler.set_segment(index);
        self.outbox.append(&mut self.scheduler.take_events());
    }

    /// Replace the rest of the current segment (`levchunkseq`)
    pub fn override_sequence(&mut self, names: &[String]) {
        if let Some(unknown) = names.iter().find(|n| !self.library.contains(n)) {
            warn!(chunk = %unknown, "sequence names an unknown chunk template");
        }
        self.scheduler.override_sequence(names);
    }

    pub fn take_events(&mut self) -> Vec<LevelEvent> {
        self.outbox.append(&mut self.scheduler.take_events());
        std::mem::take(&mut self.outbox)
    }

    pub fn take_hooks(&mut self) -> Vec<String> {
        self.scheduler.take_hooks()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn starting_tile(&self) -> Option<TileId> {
        self.starting_tile
    }

    pub fn pointer(&self) -> Vec3 {
        self.pointer
    }

    pub fn last_exit(&self) -> Vec3 {
        self.last_exit
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn chunk(&self, id: ChunkId) -> Option<&LevChunk> {
        self.chunks.get(&id)
    }

    pub fn chunk_mut(&mut self, id: ChunkId) -> Option<&mut LevChunk> {
        self.chunks.get_mut(&id)
    }

    pub fn chunks(&self) -> impl Iterator<Item = &LevChunk> {
        self.chunks.values()
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn library(&self) -> &ChunkLibrary {
        &self.library
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    pub fn scheduler(&self) -> &SegmentScheduler {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut SegmentScheduler {
        &mut self.scheduler
    }
}
