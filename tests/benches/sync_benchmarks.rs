//! # Delegate-Chain Sync Benchmarks
//!
//! | Path | Operation | Target |
//! |------|-----------|--------|
//! | block verification | id recompute + Ed25519 verify | < 100us per block |
//! | slot clock | forging info for a timestamp | < 100ns |
//! | chain store | highest common block among 10 ids, 10k chain | < 10us |
//! | chaining | `is_chain` over a 400 block download | < 1ms |

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use dc_01_peer_network::{BlockVerifier, ChainReader};
use dc_02_block_sync::{is_chain, MemoryChainStore};
use dc_tests::fixtures::Cluster;
use node_runtime::adapters::Ed25519BlockVerifier;
use shared_types::SlotClock;
use std::time::Duration;

fn bench_block_verification(c: &mut Criterion) {
    let mut group = c.benchmark_group("block-verification");
    group.measurement_time(Duration::from_secs(5));

    let cluster = Cluster::new();
    let chain = cluster.chain(101);
    let verifier = Ed25519BlockVerifier::new(Some(chain[0].id()));

    group.throughput(Throughput::Elements(100));
    group.bench_function("verify_100_blocks", |b| {
        b.iter(|| {
            for block in &chain[1..] {
                black_box(verifier.verify_signature(black_box(block)));
            }
        })
    });
    group.finish();
}

fn bench_slot_clock(c: &mut Criterion) {
    let slots = SlotClock::new(0, 8, 51);
    c.bench_function("slot-clock/forging_info", |b| {
        let mut t = 0u64;
        b.iter(|| {
            t = t.wrapping_add(3);
            black_box(slots.forging_info(black_box(t)))
        })
    });
}

fn bench_common_block(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("runtime");
    let mut group = c.benchmark_group("chain-store");

    for len in [1_000u64, 10_000] {
        let cluster = Cluster::new();
        let chain = cluster.chain(len);
        let store = MemoryChainStore::with_blocks(chain.clone(), vec![cluster.delegate()]);
        let step = (len / 10) as usize;
        let ids: Vec<_> = chain.iter().step_by(step).map(|block| block.id()).collect();

        group.bench_with_input(BenchmarkId::new("common_block", len), &ids, |b, ids| {
            b.iter(|| runtime.block_on(store.common_block(black_box(ids))))
        });
    }
    group.finish();
}

fn bench_chaining(c: &mut Criterion) {
    let cluster = Cluster::new();
    let chain = cluster.chain(401);
    let headers: Vec<_> = chain.iter().map(|block| block.header.clone()).collect();
    let slots = SlotClock::new(0, 8, 51);

    c.bench_function("chaining/is_chain_400", |b| {
        b.iter(|| black_box(is_chain(&slots, black_box(&headers))))
    });
}

criterion_group!(
    benches,
    bench_block_verification,
    bench_slot_clock,
    bench_common_block,
    bench_chaining
);
criterion_main!(benches);
