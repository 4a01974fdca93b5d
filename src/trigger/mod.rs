//! Hit-counted, radius-gated triggers.
//!
//! `TriggerCore` holds the rules every trigger shares (activity flag, hit
//! budget, in-flight script latch). `TileTrigger` adds the per-tile
//! concerns: which walker lifecycle event fires it, the active-radius gate
//! and the one-hit-per-visit latch.
//!
//! Lifecycle of a tile trigger:
//! - Idle: walker not on the tile
//! - ArmedOnTile: walker registered on the tile
//! - Activated: a scripted sequence is still running
//! - Exhausted: hit budget spent (terminal until `reset_hit_count`)

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constants::{FULL_ACTIVE_RADIUS, TILE_HALF_SIZE, UNLIMITED_HITS};
use crate::error::LevelError;
use crate::events::LevelEvent;
use crate::script::TriggerScript;
use crate::tile::{ChunkId, TileId};

/// Budget of activations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HitLimit {
    Unlimited,
    Limited(u32),
}

impl HitLimit {
    /// `-1` means unlimited; zero and anything below `-1` are authoring errors
    pub fn from_max_hit_count(max_hit_count: i32) -> Result<Self, LevelError> {
        match max_hit_count {
            UNLIMITED_HITS => Ok(HitLimit::Unlimited),
            n if n > 0 => Ok(HitLimit::Limited(n as u32)),
            n => Err(LevelError::InvalidMaxHitCount(n)),
        }
    }

    pub fn allows(&self, hit_count: u32) -> bool {
        match self {
            HitLimit::Unlimited => true,
            HitLimit::Limited(max) => hit_count < *max,
        }
    }
}

/// Side effect run synchronously, in order, when a trigger fires
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TriggerEffect {
    /// Rotate the wheel of the owning tile
    RotateWheel,
    /// Send the walker through the owning tile's tube
    TubeTeleport,
    /// Fire-and-forget visual cue
    Animate { cue: String },
}

impl TriggerEffect {
    pub fn name(&self) -> &'static str {
        match self {
            TriggerEffect::RotateWheel => "rotate_wheel",
            TriggerEffect::TubeTeleport => "tube_teleport",
            TriggerEffect::Animate { .. } => "animate",
        }
    }
}

/// What a successful activation hands back to the caller
#[derive(Debug, Clone)]
pub struct Activation {
    pub effects: Vec<TriggerEffect>,
    pub script: Option<TriggerScript>,
}

/// Rules shared by tile triggers and chunk spawn triggers
#[derive(Debug, Clone)]
pub struct TriggerCore {
    hit_count: u32,
    limit: HitLimit,
    pub is_active: bool,
    effects: Vec<TriggerEffect>,
    script: Option<TriggerScript>,
    in_flight: bool,
}

impl TriggerCore {
    pub fn new(max_hit_count: i32) -> Result<Self, LevelError> {
        Ok(Self {
            hit_count: 0,
            limit: HitLimit::from_max_hit_count(max_hit_count)?,
            is_active: true,
            effects: Vec::new(),
            script: None,
            in_flight: false,
        })
    }

    pub fn unlimited() -> Self {
        Self {
            hit_count: 0,
            limit: HitLimit::Unlimited,
            is_active: true,
            effects: Vec::new(),
            script: None,
            in_flight: false,
        }
    }

    pub fn with_effects(mut self, effects: Vec<TriggerEffect>) -> Self {
        self.effects = effects;
        self
    }

    pub fn with_script(mut self, script: Option<TriggerScript>) -> Self {
        self.script = script;
        self
    }

    pub fn hit_count(&self) -> u32 {
        self.hit_count
    }

    pub fn limit(&self) -> HitLimit {
        self.limit
    }

    pub fn effects(&self) -> &[TriggerEffect] {
        &self.effects
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn is_exhausted(&self) -> bool {
        !self.limit.allows(self.hit_count)
    }

    pub fn will_activate(&self) -> bool {
        self.is_active && self.limit.allows(self.hit_count) && !self.in_flight
    }

    /// Spend one hit. Over-limit and re-entrant calls return `None`.
    pub fn trigger(&mut self) -> Option<Activation> {
        if !self.will_activate() {
            debug!(
                hit_count = self.hit_count,
                in_flight = self.in_flight,
                is_active = self.is_active,
                "trigger rejected"
            );
            return None;
        }

        self.hit_count += 1;
        if self.script.as_ref().is_some_and(TriggerScript::is_suspendable) {
            self.in_flight = true;
        }

        Some(Activation {
            effects: self.effects.clone(),
            script: self.script.clone(),
        })
    }

    /// Release the in-flight latch once the scripted sequence ends
    pub fn finish_script(&mut self) {
        self.in_flight = false;
    }

    pub fn reset_hit_count(&mut self) {
        self.hit_count = 0;
    }
}

/// Which walker lifecycle moment fires a tile trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TileTriggerKind {
    Enter,
    Exit,
    ReachCenter,
    Button,
    ChunkEnter(ChunkId),
    ChunkExit(ChunkId),
}

impl TileTriggerKind {
    /// Fired when the walker attaches to the owning tile
    pub fn fires_on_attach(&self) -> bool {
        matches!(self, TileTriggerKind::Enter | TileTriggerKind::ChunkEnter(_))
    }

    /// Fired when the walker detaches from the owning tile
    pub fn fires_on_detach(&self) -> bool {
        matches!(self, TileTriggerKind::Exit | TileTriggerKind::ChunkExit(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerPhase {
    Idle,
    ArmedOnTile,
    Activated,
    Exhausted,
}

/// A trigger owned by a tile
#[derive(Debug, Clone)]
pub struct TileTrigger {
    pub kind: TileTriggerKind,
    pub core: TriggerCore,
    active_radius: f32,
    pub one_hit_max_per_visit: bool,
    entered_from: Option<TileId>,
    walker_entered: bool,
    activated_this_visit: bool,
}

impl TileTrigger {
    pub fn new(kind: TileTriggerKind, core: TriggerCore, active_radius: f32) -> Result<Self, LevelError> {
        if !(0.0..=FULL_ACTIVE_RADIUS).contains(&active_radius) {
            return Err(LevelError::InvalidActiveRadius(active_radius));
        }
        Ok(Self {
            kind,
            core,
            active_radius,
            one_hit_max_per_visit: true,
            entered_from: None,
            walker_entered: false,
            activated_this_visit: false,
        })
    }

    /// Unlimited trigger, full radius, one hit per visit
    pub fn simple(kind: TileTriggerKind) -> Self {
        Self {
            kind,
            core: TriggerCore::unlimited(),
            active_radius: FULL_ACTIVE_RADIUS,
            one_hit_max_per_visit: true,
            entered_from: None,
            walker_entered: false,
            activated_this_visit: false,
        }
    }

    pub fn with_one_hit_max_per_visit(mut self, flag: bool) -> Self {
        self.one_hit_max_per_visit = flag;
        self
    }

    pub fn active_radius(&self) -> f32 {
        self.active_radius
    }

    pub fn entered_from(&self) -> Option<TileId> {
        self.entered_from
    }

    pub fn is_walker_entered(&self) -> bool {
        self.walker_entered
    }

    pub fn was_activated_this_visit(&self) -> bool {
        self.activated_this_visit
    }

    /// Walker distance from the tile center, as a share of the tile half size
    pub fn is_within_active_radius(&self, walker_distance: f32) -> bool {
        if (self.active_radius - FULL_ACTIVE_RADIUS).abs() <= f32::EPSILON {
            return true;
        }
        walker_distance / TILE_HALF_SIZE <= self.active_radius
    }

    /// Fire if the hit budget, radius gate and per-visit latch allow it
    pub fn trigger(&mut self, walker_distance: f32) -> Option<Activation> {
        if !self.core.will_activate() {
            debug!(kind = ?self.kind, "tile trigger not ready");
            return None;
        }
        if !self.is_within_active_radius(walker_distance) {
            return None;
        }
        if self.one_hit_max_per_visit && self.activated_this_visit {
            return None;
        }

        let activation = self.core.trigger()?;
        self.activated_this_visit = true;
        Some(activation)
    }

    pub fn register_walker_enter(&mut self, from: Option<TileId>) {
        self.entered_from = from;
        self.walker_entered = true;
    }

    pub fn register_walker_exit(&mut self) {
        self.walker_entered = false;
        self.activated_this_visit = false;
        self.entered_from = None;
    }

    /// Block further activations until the walker leaves
    pub fn latch_for_visit(&mut self) {
        self.activated_this_visit = true;
    }

    pub fn reset_hit_count(&mut self) {
        self.core.reset_hit_count();
    }

    pub fn phase(&self) -> TriggerPhase {
        if self.core.is_exhausted() {
            TriggerPhase::Exhausted
        } else if self.core.is_in_flight() {
            TriggerPhase::Activated
        } else if self.walker_entered {
            TriggerPhase::ArmedOnTile
        } else {
            TriggerPhase::Idle
        }
    }

    /// Event published after a successful activation
    pub fn fired_event(&self, tile: TileId) -> LevelEvent {
        match self.kind {
            TileTriggerKind::Enter => LevelEvent::TileEnterTriggered { tile },
            TileTriggerKind::Exit => LevelEvent::TileExitTriggered { tile },
            TileTriggerKind::ReachCenter => LevelEvent::TileReachCenterTriggered { tile },
            TileTriggerKind::Button => LevelEvent::TileButtonTriggered { tile },
            TileTriggerKind::ChunkEnter(chunk) => LevelEvent::ChunkEnterTriggered { chunk, tile },
            TileTriggerKind::ChunkExit(chunk) => LevelEvent::ChunkExitTriggered { chunk, tile },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::TriggerScript;

    #[test]
    fn test_hit_limit_validation() {
        assert_eq!(HitLimit::from_max_hit_count(-1).unwrap(), HitLimit::Unlimited);
        assert_eq!(HitLimit::from_max_hit_count(3).unwrap(), HitLimit::Limited(3));
        assert!(matches!(
            HitLimit::from_max_hit_count(0),
            Err(LevelError::InvalidMaxHitCount(0))
        ));
        assert!(HitLimit::from_max_hit_count(-2).is_err());
    }

    #[test]
    fn test_core_stops_at_max_hits() {
        let mut core = TriggerCore::new(2).unwrap();
        assert!(core.trigger().is_some());
        assert!(core.trigger().is_some());
        assert!(core.trigger().is_none());
        assert_eq!(core.hit_count(), 2);
        assert!(core.is_exhausted());

        core.reset_hit_count();
        assert!(core.trigger().is_some());
    }

    #[test]
    fn test_inactive_core_never_fires() {
        let mut core = TriggerCore::unlimited();
        core.is_active = false;
        assert!(core.trigger().is_none());
        assert_eq!(core.hit_count(), 0);
    }

    #[test]
    fn test_suspendable_script_blocks_reentry() {
        let script = TriggerScript::parse("wait 1\nprint done", true).unwrap();
        let mut core = TriggerCore::unlimited().with_script(Some(script));
        assert!(core.trigger().is_some());
        assert!(core.is_in_flight());
        assert!(core.trigger().is_none());
        assert_eq!(core.hit_count(), 1);

        core.finish_script();
        assert!(core.trigger().is_some());
    }

    #[test]
    fn test_immediate_script_does_not_latch() {
        let script = TriggerScript::parse("print hi", false).unwrap();
        let mut core = TriggerCore::unlimited().with_script(Some(script));
        assert!(core.trigger().is_some());
        assert!(!core.is_in_flight());
    }

    #[test]
    fn test_activation_returns_effects_in_order() {
        let mut core = TriggerCore::unlimited().with_effects(vec![
            TriggerEffect::Animate { cue: "press".into() },
            TriggerEffect::RotateWheel,
        ]);
        let activation = core.trigger().unwrap();
        assert_eq!(activation.effects[0].name(), "animate");
        assert_eq!(activation.effects[1], TriggerEffect::RotateWheel);
    }

    #[test]
    fn test_active_radius_gate() {
        let mut trigger =
            TileTrigger::new(TileTriggerKind::Button, TriggerCore::unlimited(), 0.5).unwrap();
        assert!(trigger.trigger(0.6 * TILE_HALF_SIZE).is_none());
        assert!(trigger.trigger(0.0).is_some());
    }

    #[test]
    fn test_full_radius_ignores_distance() {
        let mut trigger = TileTrigger::simple(TileTriggerKind::Enter);
        assert!(trigger.trigger(100.0).is_some());
    }

    #[test]
    fn test_invalid_active_radius_rejected() {
        assert!(matches!(
            TileTrigger::new(TileTriggerKind::Enter, TriggerCore::unlimited(), 1.5),
            Err(LevelError::InvalidActiveRadius(_))
        ));
    }

    #[test]
    fn test_one_hit_per_visit() {
        let mut trigger = TileTrigger::simple(TileTriggerKind::Button);
        trigger.register_walker_enter(Some(TileId(7)));
        assert!(trigger.trigger(0.0).is_some());
        assert!(trigger.trigger(0.0).is_none());

        trigger.register_walker_exit();
        assert_eq!(trigger.entered_from(), None);
        trigger.register_walker_enter(Some(TileId(8)));
        assert!(trigger.trigger(0.0).is_some());
        assert_eq!(trigger.core.hit_count(), 2);
    }

    #[test]
    fn test_repeat_hits_without_visit_latch() {
        let mut trigger =
            TileTrigger::simple(TileTriggerKind::Button).with_one_hit_max_per_visit(false);
        assert!(trigger.trigger(0.0).is_some());
        assert!(trigger.trigger(0.0).is_some());
    }

    #[test]
    fn test_phases() {
        let core = TriggerCore::new(1)
            .unwrap()
            .with_script(Some(TriggerScript::parse("yield", true).unwrap()));
        let mut trigger = TileTrigger::new(TileTriggerKind::Enter, core, 1.0).unwrap();
        assert_eq!(trigger.phase(), TriggerPhase::Idle);

        trigger.register_walker_enter(None);
        assert_eq!(trigger.phase(), TriggerPhase::ArmedOnTile);

        trigger.trigger(0.0).unwrap();
        // Budget spent outranks the running script
        assert_eq!(trigger.phase(), TriggerPhase::Exhausted);
        trigger.core.finish_script();
        trigger.reset_hit_count();
        assert_eq!(trigger.phase(), TriggerPhase::ArmedOnTile);
    }

    #[test]
    fn test_fired_event_payloads() {
        let tile = TileId(3);
        let chunk = ChunkId(9);
        let trigger = TileTrigger::simple(TileTriggerKind::ChunkEnter(chunk));
        assert_eq!(
            trigger.fired_event(tile),
            LevelEvent::ChunkEnterTriggered { chunk, tile }
        );
        assert!(trigger.kind.fires_on_attach());
        assert!(!trigger.kind.fires_on_detach());
    }
}
