// Transition engine benchmarks for the escrow ledger.
//
// Covers record encode/decode, a single `initiate_escrow` transition, and
// the full initiate + confirm cycle through an in-memory host at various
// ledger sizes.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use escrow_contracts::engine::{apply, EngineConfig, Invocation, LifecycleEvent};
use escrow_contracts::escrow::EscrowRecord;
use escrow_contracts::host::{execute, MemoryHost};
use escrow_protocol::Address;

const ADMIN: Address = Address::new([0xAD; 32]);
const BUYER: Address = Address::new([0xB0; 32]);
const SELLER: Address = Address::new([0x5E; 32]);

fn host_with_escrows(count: u64) -> MemoryHost {
    let cfg = EngineConfig::new(ADMIN);
    let mut host = MemoryHost::new();
    execute(
        &mut host,
        &cfg,
        &Invocation::lifecycle(ADMIN, LifecycleEvent::Creation),
    )
    .expect("bootstrap");
    for i in 0..count {
        execute(
            &mut host,
            &cfg,
            &Invocation::initiate_escrow(BUYER, SELLER, b"sku-0001", i),
        )
        .expect("initiate");
    }
    host
}

fn bench_record_codec(c: &mut Criterion) {
    let record = EscrowRecord::open(BUYER, SELLER, 500, b"sku-0001".to_vec(), 42);
    let bytes = record.encode().expect("encode");

    c.bench_function("record/encode", |b| b.iter(|| black_box(&record).encode()));
    c.bench_function("record/decode", |b| {
        b.iter(|| EscrowRecord::decode(black_box(&bytes)))
    });
}

fn bench_initiate_transition(c: &mut Criterion) {
    let cfg = EngineConfig::new(ADMIN);
    let host = host_with_escrows(0);
    let inv = Invocation::initiate_escrow(BUYER, SELLER, b"sku-0001", 500);

    c.bench_function("engine/initiate_escrow", |b| {
        b.iter(|| apply(&cfg, black_box(&inv), 1, &host.store))
    });
}

fn bench_full_cycle(c: &mut Criterion) {
    let cfg = EngineConfig::new(ADMIN);
    let mut group = c.benchmark_group("engine/initiate_then_confirm");

    for size in [0u64, 1_000, 10_000] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter_batched(
                || host_with_escrows(size),
                |mut host| {
                    let receipt = execute(
                        &mut host,
                        &cfg,
                        &Invocation::initiate_escrow(BUYER, SELLER, b"sku-0001", 500),
                    )
                    .expect("initiate");
                    let id = receipt.escrow_id.expect("id");
                    execute(&mut host, &cfg, &Invocation::confirm_delivery(BUYER, id))
                        .expect("confirm")
                },
                criterion::BatchSize::LargeInput,
            );
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_record_codec,
    bench_initiate_transition,
    bench_full_cycle
);
criterion_main!(benches);
