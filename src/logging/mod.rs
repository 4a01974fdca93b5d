//! Subscriber setup for the simulation binary and for hosts that do not
//! install their own.
//!
//! Filtering is per channel: each channel maps to one module of this crate,
//! so a run can keep the walker quiet while tracing generation in detail.
//! `RUST_LOG`, when set, replaces the configured filter entirely.

use std::collections::BTreeMap;
use std::sync::Once;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;
use tracing::span::EnteredSpan;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => LevelFilter::OFF,
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

/// Areas of the runner that can be filtered on their own
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogChannel {
    Walker,
    Triggers,
    Scripts,
    Generation,
    Session,
}

impl LogChannel {
    pub fn target(self) -> &'static str {
        match self {
            LogChannel::Walker => "runner_core::walker",
            LogChannel::Triggers => "runner_core::trigger",
            LogChannel::Scripts => "runner_core::script",
            LogChannel::Generation => "runner_core::generation",
            LogChannel::Session => "runner_core::session",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TracingConfig {
    /// Level for everything without a channel override
    pub level: LogLevel,
    pub channels: BTreeMap<LogChannel, LogLevel>,
    pub show_targets: bool,
}

impl Default for TracingConfig {
    /// Chunk streaming and segment changes at info. The walker logs at
    /// warn only, so a sim run is not drowned in per-tile chatter.
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            channels: BTreeMap::from([(LogChannel::Walker, LogLevel::Warn)]),
            show_targets: true,
        }
    }
}

impl TracingConfig {
    pub fn with_channel(mut self, channel: LogChannel, level: LogLevel) -> Self {
        self.channels.insert(channel, level);
        self
    }

    /// `EnvFilter` directives, the global level first
    pub fn directives(&self) -> Vec<String> {
        let mut directives = vec![LevelFilter::from(self.level).to_string()];
        directives.extend(
            self.channels
                .iter()
                .map(|(channel, level)| format!("{}={}", channel.target(), LevelFilter::from(*level))),
        );
        directives
    }

    pub fn env_filter(&self) -> EnvFilter {
        EnvFilter::builder().parse_lossy(self.directives().join(","))
    }
}

static TRACING_INIT: Once = Once::new();

/// Install the global fmt subscriber. Only the first call has any effect.
pub fn init_tracing(config: &TracingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| config.env_filter());
    let show_targets = config.show_targets;
    TRACING_INIT.call_once(move || {
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(show_targets)
            .compact();

        // A bevy host may already own the global subscriber
        let _ = subscriber.try_init();
    });
}

/// Span around one chunk spawn. Logs the elapsed time when dropped.
pub struct ChunkSpawnSpan {
    _span: EnteredSpan,
    started: Instant,
}

impl ChunkSpawnSpan {
    pub fn enter(chunk: &str, segment: i64) -> Self {
        Self {
            _span: tracing::debug_span!("spawn_chunk", chunk, segment).entered(),
            started: Instant::now(),
        }
    }
}

impl Drop for ChunkSpawnSpan {
    fn drop(&mut self) {
        tracing::debug!(elapsed_us = self.started.elapsed().as_micros() as u64, "chunk spawn finished");
    }
}
