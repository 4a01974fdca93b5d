//! Tile wheels: tiles that turn under the walker when their button fires.

use bevy::math::Quat;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::movement::Ease;
use crate::tile::{TileGraph, TileId};
use crate::trigger::TileTriggerKind;
use crate::tween::{RotationTween, TweenCompletion, TweenRunner};
use crate::walker::Walker;

/// Rotation applied when the walker entered from `enter_tile`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WheelRotation {
    pub enter_tile: TileId,
    pub offset: Quat,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TileWheel {
    pub rotations: Vec<WheelRotation>,
    pub ease: Ease,
}

impl TileWheel {
    pub fn new(ease: Ease) -> Self {
        Self {
            rotations: Vec::new(),
            ease,
        }
    }

    pub fn with_rotation(mut self, enter_tile: TileId, offset: Quat) -> Self {
        self.rotations.push(WheelRotation { enter_tile, offset });
        self
    }

    pub fn rotation_for(&self, entered_from: TileId) -> Option<Quat> {
        self.rotations
            .iter()
            .find(|r| r.enter_tile == entered_from)
            .map(|r| r.offset)
    }
}

/// Why a wheel request did nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WheelSkip {
    NoWheel,
    NoButton,
    WalkerNotEntered,
    WalkerElsewhere,
    NoRotationForEntry,
}

/// Start rotating `tile` for the walker standing on it.
///
/// The rotation lasts `duration_factor` of the walker's remaining time on
/// the tile and keeps the walker stuck to the tile until it completes.
pub fn rotate_wheel(
    tile: TileId,
    graph: &TileGraph,
    walker: &mut Walker,
    tweens: &mut TweenRunner,
    game_speed: f32,
    duration_factor: f32,
) -> Result<f32, WheelSkip> {
    let Some(owner) = graph.get(tile) else {
        return Err(WheelSkip::NoWheel);
    };
    let Some(wheel) = owner.wheel.as_ref() else {
        warn!(tile = %owner.name, "rotate_wheel on a tile without a wheel");
        return Err(WheelSkip::NoWheel);
    };
    let Some(button) = owner
        .triggers
        .iter()
        .find(|t| t.kind == TileTriggerKind::Button)
    else {
        warn!(tile = %owner.name, "wheel tile has no button trigger");
        return Err(WheelSkip::NoButton);
    };
    if !button.is_walker_entered() {
        warn!(tile = %owner.name, "no registered walker entered the tile");
        return Err(WheelSkip::WalkerNotEntered);
    }
    if walker.current_tile() != Some(tile) {
        warn!(tile = %owner.name, "can't find the walker on the wheel tile");
        return Err(WheelSkip::WalkerElsewhere);
    }

    let offset = button
        .entered_from()
        .and_then(|from| wheel.rotation_for(from));
    let Some(offset) = offset else {
        let from = button
            .entered_from()
            .and_then(|id| graph.get(id))
            .map(|t| t.name.as_str())
            .unwrap_or("<none>");
        warn!(tile = %owner.name, from, "entry tile has no configured rotation");
        return Err(WheelSkip::NoRotationForEntry);
    };

    let target = owner.rotation * offset;
    let duration = walker.time_left_to_quit_current_tile(graph, game_speed) * duration_factor;
    walker.set_stick_to_tile(true);

    let replaced = tweens.start(
        RotationTween::new(tile, owner.rotation, target, duration, wheel.ease)
            .on_complete(TweenCompletion::ReleaseWalker { tile }),
    );
    if replaced.is_some() {
        warn!(tile = %owner.name, "wheel restarted while still rotating");
    }
    Ok(duration)
}
