use bevy::math::{Quat, Vec3};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;

use runner_core::generation::chunk::{ChunkAssembler, ChunkLibrary, ChunkTemplate};
use runner_core::generation::scheduler::SegmentScheduler;
use runner_core::generation::segment::InMemorySegments;
use runner_core::generation::GeneratorConfig;
use runner_core::tile::TileGraph;
use runner_core::{GameSession, SessionConfig};

const DT: f32 = 1.0 / 60.0;

fn library() -> ChunkLibrary {
    let mut library = ChunkLibrary::new();
    for name in ["ChunkA", "ChunkB", "ChunkC", "ChunkD", "ChunkE", "FinalStubA", "FinalStubB"] {
        library.insert(ChunkTemplate::straight(name, 4)).unwrap();
    }
    library
}

fn bench_scheduler(c: &mut Criterion) {
    let config = GeneratorConfig::default();

    c.bench_function("segment_scheduler_drain", |b| {
        b.iter(|| {
            let mut scheduler = SegmentScheduler::new(Box::new(InMemorySegments::new()), &config, black_box(42));
            scheduler.restart(0);
            let mut spawned = 0;
            while scheduler.next_chunk().is_some() {
                spawned += 1;
            }
            spawned
        })
    });
}

fn bench_assembly(c: &mut Criterion) {
    let template = ChunkTemplate::straight("Bench", 8);

    c.bench_function("chunk_instantiate_align", |b| {
        b.iter(|| {
            let mut graph = TileGraph::new();
            let mut assembler = ChunkAssembler::new();
            let mut rng = Xoshiro256PlusPlus::seed_from_u64(7);
            let mut chunk = assembler
                .instantiate(&template, 0, &mut graph, Vec3::ZERO)
                .unwrap();
            assembler
                .align(&mut chunk, &mut graph, black_box(Vec3::new(10.0, 0.0, 0.0)), &mut rng)
                .unwrap()
        })
    });

    let mut graph = TileGraph::new();
    for i in 0..2_000 {
        graph.add(format!("T{i}"), Vec3::new(i as f32 * 2.0, 0.0, 0.0), Quat::IDENTITY);
    }
    c.bench_function("find_neighbor_2000_tiles", |b| {
        b.iter(|| graph.find_neighbor(None, black_box(Vec3::new(1_001.0, 0.0, 0.0))))
    });
}

fn bench_session(c: &mut Criterion) {
    c.bench_function("session_600_ticks", |b| {
        b.iter(|| {
            let mut session = GameSession::new(
                SessionConfig::default(),
                library(),
                Box::new(InMemorySegments::new()),
            );
            session.start();
            for _ in 0..600 {
                session.tick(DT);
            }
            session.drain_journal().len()
        })
    });
}

criterion_group!(benches, bench_scheduler, bench_assembly, bench_session);
criterion_main!(benches);
