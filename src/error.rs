use std::path::PathBuf;

use crate::console::ConsoleError;

/// Structural mistakes in authored content, caught when templates and
/// triggers are built rather than during play.
#[derive(Debug, thiserror::Error)]
pub enum LevelError {
    #[error("invalid max hit count {0}: expected -1 or a positive value")]
    InvalidMaxHitCount(i32),
    #[error("active radius {0} is outside [0, 1]")]
    InvalidActiveRadius(f32),
    #[error("chunk '{chunk}' has no {marker} markers")]
    MissingMarkers { chunk: String, marker: &'static str },
    #[error("chunk '{chunk}' declares tile '{tile}' more than once")]
    DuplicateTileName { chunk: String, tile: String },
    #[error("chunk '{chunk}' references unknown tile '{tile}'")]
    UnknownTileReference { chunk: String, tile: String },
    #[error("tile '{tile}' in chunk '{chunk}' has a {effect} effect but no {component}")]
    MissingComponent {
        chunk: String,
        tile: String,
        effect: &'static str,
        component: &'static str,
    },
    #[error("script line '{line}': {source}")]
    Script {
        line: String,
        #[source]
        source: ConsoleError,
    },
    #[error("script line '{0}' suspends but the script is not suspendable")]
    SuspendInImmediateScript(String),
    #[error("script line '{0}': wait needs a finite, non-negative number of seconds")]
    InvalidWait(String),
}

/// Errors raised while loading configuration and content files
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("RON parse error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("invalid content: {0}")]
    Level(#[from] LevelError),
    #[error("segment {segment}: chunk range {min}..={max} is empty")]
    InvalidChunkRange { segment: i64, min: u32, max: u32 },
    #[error("segment {0} has an empty chunk pool")]
    EmptyChunkPool(i64),
    #[error("segment {segment}: chunk '{chunk}' has an invalid probability")]
    InvalidProbability { segment: i64, chunk: String },
    #[error("duplicate chunk template '{0}'")]
    DuplicateTemplate(String),
}
