//! Tube teleports between two linked tiles.
//!
//! A teleport is a small job polled by the session: it waits one tick,
//! hides the walker, travels for a fixed time and reveals the walker on
//! the connected tube.

use crate::tile::TileId;

/// Link from a tube tile to its partner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TubeLink {
    pub connected: TileId,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum TeleportPhase {
    Starting,
    Travelling { arrive_at: f64 },
}

/// Action the session performs for a polled teleport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeleportStep {
    /// Deactivate and detach the walker
    Disappear,
    /// Still inside the tube
    Travel,
    /// Put the walker on the destination tube and resume walking
    Reveal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TeleportJob {
    pub from: TileId,
    pub to: TileId,
    travel_secs: f32,
    phase: TeleportPhase,
}

impl TeleportJob {
    pub fn new(from: TileId, to: TileId, travel_secs: f32) -> Self {
        Self {
            from,
            to,
            travel_secs: travel_secs.max(0.0),
            phase: TeleportPhase::Starting,
        }
    }

    pub fn is_travelling(&self) -> bool {
        matches!(self.phase, TeleportPhase::Travelling { .. })
    }

    /// Advance the job. `Reveal` is returned once; the job is done after it.
    pub fn poll(&mut self, now: f64) -> TeleportStep {
        match self.phase {
            TeleportPhase::Starting => {
                self.phase = TeleportPhase::Travelling {
                    arrive_at: now + f64::from(self.travel_secs),
                };
                TeleportStep::Disappear
            }
            TeleportPhase::Travelling { arrive_at } if now >= arrive_at => TeleportStep::Reveal,
            TeleportPhase::Travelling { .. } => TeleportStep::Travel,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_teleport_phases() {
        let mut job = TeleportJob::new(TileId(1), TileId(2), 1.0);
        assert!(!job.is_travelling());
        assert_eq!(job.poll(10.0), TeleportStep::Disappear);
        assert!(job.is_travelling());
        assert_eq!(job.poll(10.5), TeleportStep::Travel);
        assert_eq!(job.poll(11.0), TeleportStep::Reveal);
    }

    #[test]
    fn test_zero_travel_reveals_next_poll() {
        let mut job = TeleportJob::new(TileId(1), TileId(2), 0.0);
        assert_eq!(job.poll(0.0), TeleportStep::Disappear);
        assert_eq!(job.poll(0.0), TeleportStep::Reveal);
    }
}
