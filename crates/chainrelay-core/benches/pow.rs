use chainrelay_core::{chain, mine::solve_parallel, pow::solve, Ledger};
use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use rand::{rngs::StdRng, Rng, SeedableRng};

fn bench_pow(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(42);
    let previous_proofs: Vec<u64> = (0..8).map(|_| rng.gen_range(1..1_000_000)).collect();

    c.bench_function("solve_difficulty_4", |b| {
        let mut i = 0;
        b.iter(|| {
            i = (i + 1) % previous_proofs.len();
            solve(previous_proofs[i], 4)
        });
    });

    c.bench_function("solve_parallel_difficulty_4", |b| {
        let mut i = 0;
        b.iter(|| {
            i = (i + 1) % previous_proofs.len();
            solve_parallel(previous_proofs[i], 4)
        });
    });
}

fn bench_validate(c: &mut Criterion) {
    let mut ledger = Ledger::with_difficulty(3);
    for i in 0..32 {
        ledger.add_transaction(format!("alice-{i}"), "bob", i as f64);
        ledger.mine();
    }
    let blocks = ledger.chain();

    c.bench_function("validate_chain_33_blocks", |b| {
        b.iter_batched(
            || blocks.clone(),
            |blocks| chain::is_valid(&blocks, 3),
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(benches, bench_pow, bench_validate);
criterion_main!(benches);
