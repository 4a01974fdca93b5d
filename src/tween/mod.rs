//! Gameplay-relevant tweens.
//!
//! Only tile rotations live here: the walker rides the rotating tile, so
//! the rotation has to advance inside the session tick. Completion is
//! returned as a value instead of a callback.

use bevy::math::Quat;
use tracing::trace;

use crate::movement::Ease;
use crate::tile::{TileGraph, TileId};

/// Follow-up to run once a tween ends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TweenCompletion {
    /// Clear `stick_to_tile` and refresh the walker look-ahead
    ReleaseWalker { tile: TileId },
    Nothing,
}

#[derive(Debug, Clone)]
pub struct RotationTween {
    pub tile: TileId,
    pub from: Quat,
    pub to: Quat,
    pub duration: f32,
    pub ease: Ease,
    pub completion: TweenCompletion,
    elapsed: f32,
}

impl RotationTween {
    pub fn new(tile: TileId, from: Quat, to: Quat, duration: f32, ease: Ease) -> Self {
        Self {
            tile,
            from,
            to,
            duration: duration.max(0.0),
            ease,
            completion: TweenCompletion::Nothing,
            elapsed: 0.0,
        }
    }

    pub fn on_complete(mut self, completion: TweenCompletion) -> Self {
        self.completion = completion;
        self
    }

    pub fn progress(&self) -> f32 {
        if self.duration <= 0.0 {
            1.0
        } else {
            (self.elapsed / self.duration).min(1.0)
        }
    }

    fn sample(&self) -> Quat {
        let t = self.progress();
        if t >= 1.0 {
            self.to
        } else {
            self.from.slerp(self.to, self.ease.apply(t))
        }
    }
}

#[derive(Debug, Default)]
pub struct TweenRunner {
    tweens: Vec<RotationTween>,
}

impl TweenRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a tween; a running tween on the same tile is replaced and its
    /// completion is returned so the caller can still run it
    pub fn start(&mut self, tween: RotationTween) -> Option<TweenCompletion> {
        let replaced = self
            .tweens
            .iter()
            .position(|t| t.tile == tween.tile)
            .map(|i| self.tweens.swap_remove(i).completion);
        self.tweens.push(tween);
        replaced
    }

    /// Advance every tween and write rotations into the graph.
    /// Tweens whose tile disappeared end immediately.
    pub fn advance(&mut self, dt: f32, graph: &mut TileGraph) -> Vec<TweenCompletion> {
        let mut completed = Vec::new();
        self.tweens.retain_mut(|tween| {
            tween.elapsed += dt;
            if !graph.set_rotation(tween.tile, tween.sample()) {
                trace!(tile = %tween.tile, "tween target gone");
                completed.push(tween.completion);
                return false;
            }
            if tween.progress() >= 1.0 {
                completed.push(tween.completion);
                return false;
            }
            true
        });
        completed
    }

    pub fn is_rotating(&self, tile: TileId) -> bool {
        self.tweens.iter().any(|t| t.tile == tile)
    }

    pub fn len(&self) -> usize {
        self.tweens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tweens.is_empty()
    }

    pub fn clear(&mut self) {
        self.tweens.clear();
    }
}
