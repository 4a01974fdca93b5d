//! Segment scheduler: decides which chunk comes next.
//!
//! Each segment gets its own RNG seeded from the segment seed, so a given
//! segment index always yields the same chunk sequence. The queue of a
//! segment is one checkpoint chunk followed by weighted draws from the
//! pool; when it runs dry the scheduler moves to the next index.

use std::collections::VecDeque;

use rand::distributions::{Distribution, WeightedIndex};
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use tracing::{debug, error, info, warn};

use super::segment::{default_segment_seed, SegmentConfiguration, SegmentSource};
use super::GeneratorConfig;
use crate::constants::{DUPLICATE_REDRAW_ATTEMPTS, DYNAMIC_PROBABILITY_DECAY};
use crate::events::LevelEvent;

/// Segments tried in one `next_chunk` call before giving up
const MAX_EMPTY_SEGMENTS: u32 = 64;

/// Identity and seed of the next chunk to spawn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkRequest {
    pub name: String,
    pub seed: i64,
}

pub struct SegmentScheduler {
    source: Box<dyn SegmentSource>,
    last_ever_segment: i64,
    checkpoint_chunks: Vec<String>,
    final_stub_chunks: Vec<String>,
    session_seed: u64,

    current_index: i64,
    configuration: Option<SegmentConfiguration>,
    rng: Xoshiro256PlusPlus,
    weights: Vec<f32>,
    queue: VecDeque<ChunkRequest>,
    chunks_in_segment: usize,
    spawned_in_segment: usize,
    final_stub_reached: bool,
    finished: bool,
    pending_hooks: Vec<String>,
    outbox: Vec<LevelEvent>,
}

impl std::fmt::Debug for SegmentScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentScheduler")
            .field("current_index", &self.current_index)
            .field("queue", &self.queue)
            .field("final_stub_reached", &self.final_stub_reached)
            .field("finished", &self.finished)
            .finish()
    }
}

impl SegmentScheduler {
    pub fn new(source: Box<dyn SegmentSource>, config: &GeneratorConfig, session_seed: u64) -> Self {
        Self {
            source,
            last_ever_segment: config.last_ever_segment,
            checkpoint_chunks: config.checkpoint_chunks.clone(),
            final_stub_chunks: config.final_stub_chunks.clone(),
            session_seed,
            current_index: config.start_segment,
            configuration: None,
            rng: Xoshiro256PlusPlus::seed_from_u64(0),
            weights: Vec::new(),
            queue: VecDeque::new(),
            chunks_in_segment: 0,
            spawned_in_segment: 0,
            final_stub_reached: false,
            finished: false,
            pending_hooks: Vec::new(),
            outbox: Vec::new(),
        }
    }

    /// Forget all progress and activate `index`
    pub fn restart(&mut self, index: i64) {
        self.final_stub_reached = false;
        self.finished = false;
        self.pending_hooks.clear();
        self.set_segment(index);
    }

    /// Load (or synthesize) segment `index` and build its chunk queue
    pub fn set_segment(&mut self, index: i64) {
        self.current_index = index;
        self.finished = false;

        let loaded = match self.source.load(index) {
            Ok(config) => config,
            Err(e) => {
                warn!(segment = index, error = %e, "segment configuration unreadable, ignoring it");
                None
            }
        };

        let mut is_stub = false;
        let mut config = match loaded {
            Some(config) => config,
            None if index >= self.last_ever_segment => {
                info!(segment = index, "final stub reached");
                is_stub = true;
                self.final_stub_reached = true;
                SegmentConfiguration::final_stub(index, &self.final_stub_chunks)
            }
            None => {
                info!(segment = index, "no segment configuration found, loading the default one");
                SegmentConfiguration::default_for(index, default_segment_seed(self.session_seed, index))
            }
        };
        config.resolve_seeds();

        self.rng = Xoshiro256PlusPlus::seed_from_u64(config.seed as u64);
        self.weights = config.chunks_pool.iter().map(|c| c.probability).collect();
        self.queue.clear();
        self.spawned_in_segment = 0;

        if is_stub {
            // Fixed order, no randomness
            self.queue.extend(config.chunks_pool.iter().map(|c| ChunkRequest {
                name: c.chunk_name.clone(),
                seed: c.seed,
            }));
        } else {
            let ChunkRangeBounds { min, max } = ChunkRangeBounds::from(&config);
            let count = if min >= max { min } else { self.rng.gen_range(min..=max) };

            if !self.checkpoint_chunks.is_empty() {
                let pick = self.rng.gen_range(0..self.checkpoint_chunks.len());
                self.queue.push_back(ChunkRequest {
                    name: self.checkpoint_chunks[pick].clone(),
                    seed: config.seed,
                });
            }

            let mut previous: Option<usize> = None;
            for _ in 0..count {
                let Some(drawn) = self.draw(&config, previous) else {
                    error!(segment = index, "chunk pool has no drawable weight left");
                    break;
                };
                self.queue.push_back(ChunkRequest {
                    name: config.chunks_pool[drawn].chunk_name.clone(),
                    seed: config.chunks_pool[drawn].seed,
                });
                if config.dynamic_probability {
                    // A positive floor keeps a lone pool entry drawable
                    self.weights[drawn] =
                        (self.weights[drawn] * DYNAMIC_PROBABILITY_DECAY).max(f32::MIN_POSITIVE);
                }
                previous = Some(drawn);
            }
        }

        self.chunks_in_segment = self.queue.len();
        debug!(segment = index, queue = ?self.queued_names(), "segment queue ready");

        if let Some(hook) = config.on_load.as_ref().filter(|h| !h.trim().is_empty()) {
            self.pending_hooks.push(hook.clone());
        }
        self.configuration = Some(config);
        self.outbox.push(LevelEvent::SegmentChanged { index });
    }

    fn draw(&mut self, config: &SegmentConfiguration, previous: Option<usize>) -> Option<usize> {
        let distribution = WeightedIndex::new(&self.weights).ok()?;
        let mut drawn = distribution.sample(&mut self.rng);
        if config.avoid_sequential_duplicates && config.chunks_pool.len() > 1 {
            let mut attempts = 0;
            while Some(drawn) == previous && attempts < DUPLICATE_REDRAW_ATTEMPTS {
                drawn = distribution.sample(&mut self.rng);
                attempts += 1;
            }
        }
        Some(drawn)
    }

    /// Next chunk to spawn, or `None` once the final stub is consumed
    pub fn next_chunk(&mut self) -> Option<ChunkRequest> {
        if self.finished {
            return None;
        }

        for _ in 0..MAX_EMPTY_SEGMENTS {
            if let Some(request) = self.queue.pop_front() {
                self.spawned_in_segment += 1;
                return Some(request);
            }
            if self.final_stub_reached {
                info!("level generation finished");
                self.finished = true;
                self.outbox.push(LevelEvent::GenerationFinished);
                return None;
            }
            self.set_segment(self.current_index + 1);
        }

        error!(segment = self.current_index, "too many empty segments in a row");
        None
    }

    /// Replace the remaining queue of the active segment
    pub fn override_sequence(&mut self, names: &[String]) {
        let seed = self
            .configuration
            .as_ref()
            .map(|c| c.seed)
            .unwrap_or(self.current_index);
        self.queue = names
            .iter()
            .map(|name| ChunkRequest {
                name: name.clone(),
                seed,
            })
            .collect();
        self.chunks_in_segment = self.spawned_in_segment + self.queue.len();
        info!(segment = self.current_index, queue = ?names, "chunk sequence overridden");
    }

    /// RNG of the active segment, also used to pick entry and exit markers
    pub fn rng_mut(&mut self) -> &mut Xoshiro256PlusPlus {
        &mut self.rng
    }

    pub fn current_index(&self) -> i64 {
        self.current_index
    }

    pub fn configuration(&self) -> Option<&SegmentConfiguration> {
        self.configuration.as_ref()
    }

    pub fn is_final_stub_reached(&self) -> bool {
        self.final_stub_reached
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn chunks_in_segment(&self) -> usize {
        self.chunks_in_segment
    }

    pub fn remaining_in_segment(&self) -> usize {
        self.queue.len()
    }

    pub fn queued_names(&self) -> Vec<&str> {
        self.queue.iter().map(|r| r.name.as_str()).collect()
    }

    /// Console hooks of newly activated segments, oldest first
    pub fn take_hooks(&mut self) -> Vec<String> {
        std::mem::take(&mut self.pending_hooks)
    }

    pub fn take_events(&mut self) -> Vec<LevelEvent> {
        std::mem::take(&mut self.outbox)
    }
}

struct ChunkRangeBounds {
    min: u32,
    max: u32,
}

impl From<&SegmentConfiguration> for ChunkRangeBounds {
    fn from(config: &SegmentConfiguration) -> Self {
        Self {
            min: config.chunks_number.min,
            max: config.chunks_number.max,
        }
    }
}
