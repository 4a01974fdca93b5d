use std::path::PathBuf;

use anyhow::Context;
use tracing::info;

use runner_core::logging::init_tracing;
use runner_core::{GameSession, LevelEvent, SessionConfig};

const DEFAULT_TICKS: u64 = 3600;
const TICK_SECS: f32 = 1.0 / 60.0;

/// Usage: `tile-runner-sim [assets_dir] [ticks]`
fn main() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1);
    let assets = PathBuf::from(args.next().unwrap_or_else(|| "assets".to_string()));
    let ticks = match args.next() {
        Some(raw) => raw
            .parse::<u64>()
            .with_context(|| format!("invalid tick count '{raw}'"))?,
        None => DEFAULT_TICKS,
    };

    let config_path = assets.join("session.ron");
    let config = if config_path.exists() {
        SessionConfig::load(&config_path)
            .with_context(|| format!("loading {}", config_path.display()))?
    } else {
        SessionConfig::default()
    };
    init_tracing(&config.tracing);

    let mut session = GameSession::from_assets(config, &assets)
        .with_context(|| format!("loading assets from {}", assets.display()))?;
    session.subscribe(|event| match event {
        LevelEvent::LevelLoaded { .. }
        | LevelEvent::ChunkSpawned { .. }
        | LevelEvent::SegmentChanged { .. }
        | LevelEvent::GenerationFinished
        | LevelEvent::WalkerFall => info!(event = event.kind(), ?event, "level event"),
        _ => tracing::debug!(event = event.kind(), ?event, "level event"),
    });

    session.start();
    for _ in 0..ticks {
        session.tick(TICK_SECS);
        if session.walker().state() == runner_core::walker::WalkerState::Awake {
            info!(tick = session.tick_count(), "walker is out of the level, stopping");
            break;
        }
    }

    let delivered = session.bus().published_count();
    info!(
        ticks = session.tick_count(),
        chunks = session.generator().chunk_count(),
        tiles = session.graph().len(),
        segment = session.generator().scheduler().current_index(),
        events = delivered,
        "simulation finished"
    );
    session.stop();
    Ok(())
}
