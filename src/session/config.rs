use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_GAME_SPEED, TUBE_TRAVEL_SECS, WHEEL_DURATION_FACTOR};
use crate::error::ConfigError;
use crate::generation::GeneratorConfig;
use crate::logging::TracingConfig;
use crate::walker::WalkerConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Global multiplier on walker speed and timings
    pub game_speed: f32,
    /// Seeds the synthesized default segments
    pub session_seed: u64,
    pub tube_travel_secs: f32,
    pub wheel_duration_factor: f32,
    pub walker: WalkerConfig,
    pub generator: GeneratorConfig,
    pub tracing: TracingConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            game_speed: DEFAULT_GAME_SPEED,
            session_seed: 42,
            tube_travel_secs: TUBE_TRAVEL_SECS,
            wheel_duration_factor: WHEEL_DURATION_FACTOR,
            walker: WalkerConfig::default(),
            generator: GeneratorConfig::default(),
            tracing: TracingConfig::default(),
        }
    }
}

impl SessionConfig {
    pub fn from_ron(text: &str) -> Result<Self, ConfigError> {
        Ok(ron::from_str(text)?)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Load by extension: `.json` is JSON, anything else RON
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json(&text),
            _ => Self::from_ron(&text),
        }
    }

    pub fn to_ron(&self) -> Result<String, ron::Error> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
    }
}
