//! Perft benchmarks over the bundled validation positions.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use chess_movegen::{legal_moves, perft, Position};

const KIWIPETE: &str = "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1";

fn bench_perft(c: &mut Criterion) {
    let mut group = c.benchmark_group("perft");
    group.sample_size(10);

    for depth in [5u32, 6] {
        group.bench_with_input(BenchmarkId::new("startpos", depth), &depth, |b, &depth| {
            let mut position = Position::startpos();
            b.iter(|| perft(&mut position, black_box(depth)))
        });
    }

    for depth in [3u32, 4] {
        group.bench_with_input(BenchmarkId::new("kiwipete", depth), &depth, |b, &depth| {
            let mut position = Position::from_fen(KIWIPETE).unwrap();
            b.iter(|| perft(&mut position, black_box(depth)))
        });
    }

    group.finish();
}

fn bench_movegen(c: &mut Criterion) {
    let mut group = c.benchmark_group("movegen");

    let startpos = Position::startpos();
    group.bench_function("startpos", |b| {
        b.iter(|| black_box(legal_moves(&startpos)))
    });

    let kiwipete = Position::from_fen(KIWIPETE).unwrap();
    group.bench_function("kiwipete", |b| {
        b.iter(|| black_box(legal_moves(&kiwipete)))
    });

    group.finish();
}

criterion_group!(benches, bench_perft, bench_movegen);
criterion_main!(benches);
