//! Centralized constants for the tile runner core.
//!
//! Tunables that designers change per session live in `SessionConfig`;
//! these are the fixed values the traversal and generation rules are
//! built around.

// =====================================================
// Tiles
// =====================================================

/// Edge length of a square tile in world units
pub const TILE_SIZE: f32 = 2.0;

/// Half of a tile edge: distance from tile center to tile edge
pub const TILE_HALF_SIZE: f32 = TILE_SIZE * 0.5;

/// Default collider radius used by the overlap query
pub const TILE_COLLIDER_RADIUS: f32 = TILE_HALF_SIZE;

// =====================================================
// Walker
// =====================================================

/// Walker target speed in tiles-units per second (before game speed)
pub const DEFAULT_TARGET_SPEED: f32 = 2.0;

/// Time for the smoothed velocity to catch up with target speed
pub const DEFAULT_VELOCITY_SMOOTH_TIME: f32 = 0.3;

/// Below this effective speed a falling walker is considered at rest
pub const REST_SPEED_EPSILON: f32 = 1.0e-3;

/// Global game speed multiplier applied on top of walker speed
pub const DEFAULT_GAME_SPEED: f32 = 2.0;

// =====================================================
// Triggers
// =====================================================

/// `max_hit_count` value meaning "no limit"
pub const UNLIMITED_HITS: i32 = -1;

/// Active radius that disables the proximity gate
pub const FULL_ACTIVE_RADIUS: f32 = 1.0;

// =====================================================
// Tile entities
// =====================================================

/// Share of the walker's remaining time on a tile spent rotating the wheel
pub const WHEEL_DURATION_FACTOR: f32 = 0.9;

/// Seconds the walker spends inside a tube between two teleports
pub const TUBE_TRAVEL_SECS: f32 = 1.0;

// =====================================================
// Generation
// =====================================================

/// Radius around the generator pointer that must be filled with chunks
pub const DEFAULT_GENERATOR_RADIUS: f32 = 30.0;

/// Segment index after which the final stub replaces missing configurations
pub const DEFAULT_LAST_EVER_SEGMENT: i64 = 10;

/// Chunk count range of a synthesized default segment (inclusive)
pub const DEFAULT_SEGMENT_CHUNKS: (u32, u32) = (6, 8);

/// Weight multiplier applied to a drawn chunk in dynamic probability mode
pub const DYNAMIC_PROBABILITY_DECAY: f32 = 0.5;

/// Redraw attempts when avoiding an immediate chunk repeat
pub const DUPLICATE_REDRAW_ATTEMPTS: u32 = 4;

/// Seed value meaning "derive from the segment id"
pub const DERIVED_SEED: i64 = -1;

// =====================================================
// Events
// =====================================================

/// Number of published events retained for host-side draining
pub const EVENT_JOURNAL_CAPACITY: usize = 1024;
