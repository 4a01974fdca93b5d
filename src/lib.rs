//! Tile Runner - Core Library
//!
//! Deterministic gameplay core of a tile-based runner:
//! - Tile graph with per-tile frames and overlap-based neighbor discovery
//! - Hit-counted, radius-gated tile triggers with scripted handlers
//! - Walker state machine riding tiles edge to center to edge
//! - Tile wheels and tube teleports
//! - Seeded segment scheduling and streaming chunk assembly
//! - Game session composition root with an owned event bus
//! - Bevy plugin for engine integration

pub mod console;
pub mod constants;
pub mod error;
pub mod events;
pub mod generation;
pub mod logging;
pub mod movement;
pub mod script;
pub mod session;
pub mod tile;
pub mod trigger;
pub mod tween;
pub mod walker;

pub use error::{ConfigError, LevelError};
pub use events::{EventBus, LevelEvent, SubscriptionId};
pub use session::{GameSession, SessionConfig};
