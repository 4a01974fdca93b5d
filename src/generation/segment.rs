//! Segment configurations and where they come from.
//!
//! A segment is a themed run of chunks. Authored segments live in
//! `s{index}.json` files; indices without a file fall back to a
//! synthesized default pool or, past the last authored segment, to the
//! final stub.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};

use crate::constants::{DEFAULT_SEGMENT_CHUNKS, DERIVED_SEED};
use crate::error::ConfigError;

fn derived_seed() -> i64 {
    DERIVED_SEED
}

/// One entry of a segment's chunk pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkConfig {
    pub chunk_name: String,
    pub probability: f32,
    #[serde(default = "derived_seed")]
    pub seed: i64,
}

/// Inclusive chunk count range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRange {
    pub min: u32,
    pub max: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentConfiguration {
    /// `-1` derives the seed from `segment_id`
    #[serde(default = "derived_seed")]
    pub seed: i64,
    pub segment_id: i64,
    #[serde(default)]
    pub fantasy_setting: String,
    pub chunks_number: ChunkRange,
    pub chunks_pool: Vec<ChunkConfig>,
    /// Halve a chunk's weight each time it is drawn
    #[serde(default)]
    pub dynamic_probability: bool,
    /// Redraw a chunk that would repeat the previous one
    #[serde(default)]
    pub avoid_sequential_duplicates: bool,
    /// Console lines run once the segment becomes active
    #[serde(default)]
    pub on_load: Option<String>,
}

pub const DEFAULT_FANTASY_SETTING: &str = "Default";

impl SegmentConfiguration {
    /// Parse, expand comma-separated chunk names and validate
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let mut config: SegmentConfiguration = serde_json::from_str(text)?;
        config.expand_aliases();
        config.validate()?;
        Ok(config)
    }

    /// `"A, B"` becomes two pool entries sharing probability and seed
    pub fn expand_aliases(&mut self) {
        self.chunks_pool = self
            .chunks_pool
            .iter()
            .flat_map(|entry| {
                entry
                    .chunk_name
                    .split(',')
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .map(|name| ChunkConfig {
                        chunk_name: name.to_string(),
                        probability: entry.probability,
                        seed: entry.seed,
                    })
                    .collect::<Vec<_>>()
            })
            .collect();
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let ChunkRange { min, max } = self.chunks_number;
        if min > max {
            return Err(ConfigError::InvalidChunkRange {
                segment: self.segment_id,
                min,
                max,
            });
        }
        if self.chunks_pool.is_empty() {
            return Err(ConfigError::EmptyChunkPool(self.segment_id));
        }
        if let Some(bad) = self
            .chunks_pool
            .iter()
            .find(|c| !c.probability.is_finite() || c.probability < 0.0)
        {
            return Err(ConfigError::InvalidProbability {
                segment: self.segment_id,
                chunk: bad.chunk_name.clone(),
            });
        }
        if self.chunks_pool.iter().all(|c| c.probability == 0.0) {
            return Err(ConfigError::EmptyChunkPool(self.segment_id));
        }
        Ok(())
    }

    /// Procedural stand-in for a segment nobody authored
    pub fn default_for(segment_id: i64, seed: i64) -> Self {
        let (min, max) = DEFAULT_SEGMENT_CHUNKS;
        Self {
            seed,
            segment_id,
            fantasy_setting: DEFAULT_FANTASY_SETTING.to_string(),
            chunks_number: ChunkRange { min, max },
            chunks_pool: ["ChunkA", "ChunkB", "ChunkC", "ChunkD", "ChunkE"]
                .into_iter()
                .map(|name| ChunkConfig {
                    chunk_name: name.to_string(),
                    probability: 1.0,
                    seed: DERIVED_SEED,
                })
                .collect(),
            dynamic_probability: false,
            avoid_sequential_duplicates: false,
            on_load: None,
        }
    }

    /// Terminal segment spawning `names` once each, in order
    pub fn final_stub(segment_id: i64, names: &[String]) -> Self {
        let count = names.len() as u32;
        Self {
            seed: DERIVED_SEED,
            segment_id,
            fantasy_setting: DEFAULT_FANTASY_SETTING.to_string(),
            chunks_number: ChunkRange {
                min: count,
                max: count,
            },
            chunks_pool: names
                .iter()
                .map(|name| ChunkConfig {
                    chunk_name: name.clone(),
                    probability: 1.0,
                    seed: DERIVED_SEED,
                })
                .collect(),
            dynamic_probability: false,
            avoid_sequential_duplicates: false,
            on_load: None,
        }
    }

    /// Replace `-1` seeds with the segment id
    pub fn resolve_seeds(&mut self) {
        if self.seed == DERIVED_SEED {
            self.seed = self.segment_id;
        }
        for chunk in &mut self.chunks_pool {
            if chunk.seed == DERIVED_SEED {
                chunk.seed = self.segment_id;
            }
        }
    }
}

/// Deterministic, non-negative seed for a synthesized segment.
///
/// Hashing the session seed with the segment id keeps a session replayable
/// from its config alone, while two sessions with different seeds still get
/// different default segments.
pub fn default_segment_seed(session_seed: u64, segment_id: i64) -> i64 {
    let mut hasher = Sha3_256::new();
    hasher.update(session_seed.to_le_bytes());
    hasher.update(segment_id.to_le_bytes());
    let digest = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[0..8]);
    (u64::from_le_bytes(bytes) & i64::MAX as u64) as i64
}

/// Lookup of authored segment configurations
pub trait SegmentSource: Send + Sync {
    /// `Ok(None)` when nothing is authored for `index`
    fn load(&self, index: i64) -> Result<Option<SegmentConfiguration>, ConfigError>;
}

/// Segment files `s{index}.json` in one directory
#[derive(Debug, Clone)]
pub struct SegmentDirectory {
    root: PathBuf,
}

impl SegmentDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_for(&self, index: i64) -> PathBuf {
        self.root.join(format!("s{index}.json"))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl SegmentSource for SegmentDirectory {
    fn load(&self, index: i64) -> Result<Option<SegmentConfiguration>, ConfigError> {
        let path = self.path_for(index);
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(ConfigError::Io { path, source }),
        };
        SegmentConfiguration::from_json(&text).map(Some)
    }
}

/// Segments kept in memory, for tests and embedded content
#[derive(Debug, Clone, Default)]
pub struct InMemorySegments {
    segments: BTreeMap<i64, SegmentConfiguration>,
}

impl InMemorySegments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, index: i64, mut config: SegmentConfiguration) -> Self {
        config.expand_aliases();
        self.segments.insert(index, config);
        self
    }
}

impl SegmentSource for InMemorySegments {
    fn load(&self, index: i64) -> Result<Option<SegmentConfiguration>, ConfigError> {
        Ok(self.segments.get(&index).cloned())
    }
}
