//! # Protocol State Benchmarks
//!
//! | Operation | Shape |
//! |-----------|-------|
//! | Extend | empty child on a short and a long unsealed fork |
//! | Finalize | one block on top of the finalized head |
//! | Snapshot | lookup by id and by height, epoch queries |

use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use qc_protocol_state::test_utils::*;
use qc_protocol_state::{MutatorApi, StateApi};
use shared_types::{Block, Payload};

/// Chain of `length` empty blocks on top of the root, optionally finalized.
fn build_chain(length: usize, finalize: bool) -> (TestState, Vec<Block>) {
    let fixture = RootFixture::new();
    let state = fixture.bootstrapped_state();
    let mut blocks = Vec::with_capacity(length);
    let mut parent = fixture.root.header.clone();
    for _ in 0..length {
        let block = child_with_payload(&parent, parent.view + 1, Payload::default());
        state.extend(&block).expect("extend chain");
        if finalize {
            state.finalize(&block.id()).expect("finalize chain");
        }
        parent = block.header.clone();
        blocks.push(block);
    }
    (state, blocks)
}

fn bench_extend(c: &mut Criterion) {
    let mut group = c.benchmark_group("protocol-state-extend");

    // Unfinalized forks make the ancestor walk longer.
    for length in [1usize, 64, 256] {
        group.bench_with_input(BenchmarkId::new("extend_on_fork", length), &length, |b, &length| {
            b.iter_batched(
                || {
                    let (state, blocks) = build_chain(length, false);
                    let tip = &blocks[blocks.len() - 1].header;
                    let child = child_of(tip);
                    (state, child)
                },
                |(state, child)| black_box(state.extend(&child).is_ok()),
                BatchSize::LargeInput,
            )
        });
    }

    group.bench_function("header_extend_on_finalized_tip", |b| {
        b.iter_batched(
            || {
                let (state, blocks) = build_chain(64, true);
                let child = child_of(&blocks[blocks.len() - 1].header);
                (state, child)
            },
            |(state, child)| black_box(state.header_extend(&child).is_ok()),
            BatchSize::LargeInput,
        )
    });

    group.finish();
}

fn bench_finalize(c: &mut Criterion) {
    c.bench_function("protocol-state-finalize", |b| {
        b.iter_batched(
            || build_chain(16, false),
            |(state, blocks)| {
                for block in &blocks {
                    black_box(state.finalize(&block.id()).is_ok());
                }
            },
            BatchSize::LargeInput,
        )
    });
}

fn bench_snapshots(c: &mut Criterion) {
    let mut group = c.benchmark_group("protocol-state-snapshot");
    let (state, blocks) = build_chain(256, true);
    let middle = blocks[128].id();

    group.bench_function("at_block_id", |b| {
        b.iter(|| black_box(state.at_block_id(&middle).map(|s| s.head().height)))
    });
    group.bench_function("at_height", |b| {
        b.iter(|| black_box(state.at_height(128).map(|s| s.block_id())))
    });
    group.bench_function("final_current_epoch", |b| {
        b.iter(|| {
            let snapshot = state.final_snapshot().expect("final snapshot");
            black_box(snapshot.epochs().current().map(|epoch| epoch.counter()))
        })
    });
    group.bench_function("identities_by_role", |b| {
        b.iter(|| {
            let snapshot = state.final_snapshot().expect("final snapshot");
            black_box(snapshot.identities(|identity| identity.stake > 0).map(|ids| ids.len()))
        })
    });

    group.finish();
}

criterion_group!(benches, bench_extend, bench_finalize, bench_snapshots);
criterion_main!(benches);
