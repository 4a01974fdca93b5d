//! Property-based tests using proptest
//!
//! Invariants that must hold for all inputs:
//! - Tile frames: the closest cardinal direction maximizes the dot product
//! - Triggers: hit budgets and per-visit latches are never exceeded
//! - Walker: no tile transition before the destination is reached
//! - Segments: the same seeds always produce the same chunk queue

use bevy::math::{EulerRot, Quat, Vec3};
use proptest::prelude::*;

use runner_core::generation::scheduler::SegmentScheduler;
use runner_core::generation::segment::{
    default_segment_seed, ChunkConfig, ChunkRange, InMemorySegments, SegmentConfiguration,
};
use runner_core::generation::GeneratorConfig;
use runner_core::tile::{Tile, TileId};
use runner_core::trigger::{HitLimit, TileTrigger, TileTriggerKind, TriggerCore};
use runner_core::walker::reaches_destination;

fn rotation(yaw: f32, pitch: f32, roll: f32) -> Quat {
    Quat::from_euler(EulerRot::XYZ, roll, pitch, yaw)
}

fn pool_segment(seed: i64, min: u32, max: u32, names: &[&str]) -> SegmentConfiguration {
    SegmentConfiguration {
        seed,
        segment_id: 0,
        fantasy_setting: "Test".into(),
        chunks_number: ChunkRange { min, max },
        chunks_pool: names
            .iter()
            .map(|name| ChunkConfig {
                chunk_name: name.to_string(),
                probability: 1.0,
                seed: -1,
            })
            .collect(),
        dynamic_probability: false,
        avoid_sequential_duplicates: false,
        on_load: None,
    }
}

fn drain_segment(config: SegmentConfiguration, session_seed: u64) -> Vec<String> {
    let generator = GeneratorConfig {
        last_ever_segment: 1,
        final_stub_chunks: Vec::new(),
        ..GeneratorConfig::default()
    };
    let segments = InMemorySegments::new().with(0, config);
    let mut scheduler = SegmentScheduler::new(Box::new(segments), &generator, session_seed);
    scheduler.restart(0);
    let mut names = Vec::new();
    while let Some(request) = scheduler.next_chunk() {
        names.push(request.name);
        if names.len() > 64 {
            break;
        }
    }
    names
}

// ============================================================
// Tile Frame Properties
// ============================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn prop_closest_direction_is_a_maximal_cardinal_axis(
        yaw in -3.2f32..3.2,
        pitch in -3.2f32..3.2,
        roll in -3.2f32..3.2,
        x in -1.0f32..1.0,
        y in -1.0f32..1.0,
        z in -1.0f32..1.0,
    ) {
        let tile = Tile::new(TileId(0), "T", Vec3::ZERO, rotation(yaw, pitch, roll));
        let direction = Vec3::new(x, y, z);
        let closest = tile.closest_direction(direction);
        let axes = tile.cardinal_axes();

        prop_assert!(axes.contains(&closest));
        let best = closest.dot(direction);
        for axis in axes {
            prop_assert!(best >= axis.dot(direction));
        }
    }

    #[test]
    fn prop_frame_roundtrip_preserves_points(
        yaw in -3.2f32..3.2,
        px in -50.0f32..50.0,
        py in -50.0f32..50.0,
        lx in -2.0f32..2.0,
        ly in -2.0f32..2.0,
    ) {
        let tile = Tile::new(
            TileId(0),
            "T",
            Vec3::new(px, py, 0.0),
            Quat::from_rotation_z(yaw),
        );
        let local = Vec3::new(lx, ly, 0.0);
        let back = tile.to_local(tile.to_world(local));
        prop_assert!(back.distance(local) < 1e-3);
    }
}

// ============================================================
// Trigger Properties
// ============================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_hit_count_never_exceeds_limit(max in 1i32..20, attempts in 0usize..60) {
        let mut core = TriggerCore::new(max).unwrap();
        let fired = (0..attempts).filter(|_| core.trigger().is_some()).count();

        prop_assert_eq!(fired, attempts.min(max as usize));
        prop_assert!(core.hit_count() <= max as u32);
        prop_assert_eq!(core.is_exhausted(), attempts >= max as usize);
    }

    #[test]
    fn prop_unlimited_trigger_always_fires(attempts in 0usize..100) {
        let mut core = TriggerCore::new(-1).unwrap();
        prop_assert_eq!(core.limit(), HitLimit::Unlimited);
        let fired = (0..attempts).filter(|_| core.trigger().is_some()).count();
        prop_assert_eq!(fired, attempts);
    }

    #[test]
    fn prop_other_non_positive_limits_are_rejected(max in i32::MIN..-1) {
        prop_assert!(TriggerCore::new(max).is_err());
        prop_assert!(TriggerCore::new(0).is_err());
    }

    #[test]
    fn prop_one_hit_per_visit(visits in 1usize..8, calls_per_visit in 1usize..10) {
        let mut trigger = TileTrigger::simple(TileTriggerKind::Enter);
        let mut fired = 0;
        for _ in 0..visits {
            trigger.register_walker_enter(None);
            for _ in 0..calls_per_visit {
                if trigger.trigger(0.0).is_some() {
                    fired += 1;
                }
            }
            trigger.register_walker_exit();
        }
        prop_assert_eq!(fired, visits);
    }

    #[test]
    fn prop_active_radius_gates_by_distance(radius in 0.0f32..0.99, distance in 0.0f32..2.0) {
        let mut trigger = TileTrigger::new(TileTriggerKind::ReachCenter, TriggerCore::unlimited(), radius).unwrap();
        let fired = trigger.trigger(distance).is_some();
        // The tile half size is 1, so the share equals the distance
        prop_assert_eq!(fired, distance <= radius);
    }

    #[test]
    fn prop_out_of_range_radius_is_rejected(radius in 1.001f32..100.0) {
        prop_assert!(TileTrigger::new(TileTriggerKind::Enter, TriggerCore::unlimited(), radius).is_err());
        prop_assert!(TileTrigger::new(TileTriggerKind::Enter, TriggerCore::unlimited(), -radius).is_err());
    }
}

// ============================================================
// Walker Properties
// ============================================================

proptest! {
    #[test]
    fn prop_short_steps_never_reach_destination(remaining in 0.001f32..10.0, share in 0.0f32..0.999) {
        prop_assert!(!reaches_destination(remaining * share, remaining));
        prop_assert!(reaches_destination(remaining, remaining));
        prop_assert!(reaches_destination(remaining * (1.0 + share), remaining));
    }
}

// ============================================================
// Segment Scheduling Properties
// ============================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_segment_queue_is_deterministic(seed in 0i64..1_000_000, session_seed in any::<u64>()) {
        let names = ["A", "B", "C", "D"];
        let first = drain_segment(pool_segment(seed, 3, 7, &names), session_seed);
        let second = drain_segment(pool_segment(seed, 3, 7, &names), session_seed);
        prop_assert_eq!(&first, &second);
        prop_assert!((3..=7).contains(&first.len()));
        prop_assert!(first.iter().all(|n| names.contains(&n.as_str())));
    }

    #[test]
    fn prop_chunk_count_within_range(seed in 0i64..1_000_000, min in 0u32..6, extra in 0u32..6) {
        let max = min + extra;
        let queue = drain_segment(pool_segment(seed, min, max, &["A", "B"]), 0);
        prop_assert!(queue.len() >= min as usize && queue.len() <= max as usize);
    }

    #[test]
    fn prop_default_segment_seed_is_stable_and_non_negative(session_seed in any::<u64>(), segment in -100i64..100) {
        let seed = default_segment_seed(session_seed, segment);
        prop_assert!(seed >= 0);
        prop_assert_eq!(seed, default_segment_seed(session_seed, segment));
    }
}
