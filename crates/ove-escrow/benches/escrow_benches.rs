//! Criterion benchmarks for ove-escrow hot paths.
//!
//! Covers: lock creation with a long checkpoint replay, current supply
//! queries, and historical block queries over a populated history.

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};

use ove_core::asset::MemoryAsset;
use ove_core::constants::{DAY, UNIT, WEEK};
use ove_core::traits::AssetLedger;
use ove_core::types::{Address, BlockContext};
use ove_decay::LedgerView;
use ove_escrow::VotingEscrow;

const T0: u64 = 3_000 * WEEK;

fn users(n: usize) -> Vec<Address> {
    (0..n).map(|i| Address::from_label(&format!("user-{i}"))).collect()
}

/// Escrow with `n` users, each locking once a day for `n` days.
fn populated(n: usize) -> (VotingEscrow<MemoryAsset>, BlockContext) {
    let escrow = Address::from_label("escrow");
    let users = users(n);
    let mut asset = MemoryAsset::new();
    for u in &users {
        asset.mint(u, 1_000_000 * UNIT).unwrap();
        asset.approve(u, &escrow, u128::MAX);
    }
    let mut ctx = BlockContext::new(0, T0);
    let mut ve = VotingEscrow::new(escrow, asset, &ctx);
    for (i, u) in users.iter().enumerate() {
        ctx = ctx.advance(DAY / 12, 12);
        let unlock = ctx.timestamp + (4 + i as u64 % 50) * WEEK;
        ve.create_lock_for(u, u, 1_000 * UNIT, unlock, &ctx).unwrap();
    }
    (ve, ctx)
}

fn bench_create_after_idle_year(c: &mut Criterion) {
    let (ve, ctx) = populated(50);
    let late = ctx.advance(52 * WEEK / 12, 12);
    let newcomer = Address::from_label("newcomer");

    c.bench_function("create_lock_after_52_week_gap", |b| {
        b.iter_batched(
            || {
                let mut ve = ve.clone();
                let escrow = *ve.address();
                ve.asset_mut().mint(&newcomer, UNIT).unwrap();
                ve.asset_mut().approve(&newcomer, &escrow, UNIT);
                ve
            },
            |mut ve| {
                ve.create_lock_for(&newcomer, &newcomer, UNIT, late.timestamp + WEEK, black_box(&late))
                    .unwrap()
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_total_supply(c: &mut Criterion) {
    let (ve, ctx) = populated(200);
    let t = ctx.timestamp + 30 * WEEK;

    c.bench_function("total_supply_30_weeks_ahead", |b| {
        b.iter(|| ve.total_supply(black_box(t)))
    });
}

fn bench_total_supply_at(c: &mut Criterion) {
    let (ve, ctx) = populated(200);
    let block = ctx.number / 2;

    c.bench_function("total_supply_at_historical_block", |b| {
        b.iter(|| ve.total_supply_at(black_box(block), &ctx).unwrap())
    });
}

fn bench_balance_of_at(c: &mut Criterion) {
    let (ve, ctx) = populated(200);
    let user = users(200)[100];
    let block = ctx.number - 10;

    c.bench_function("balance_of_at_historical_block", |b| {
        b.iter(|| ve.balance_of_at(&user, black_box(block), &ctx).unwrap())
    });
}

criterion_group!(
    benches,
    bench_create_after_idle_year,
    bench_total_supply,
    bench_total_supply_at,
    bench_balance_of_at,
);
criterion_main!(benches);
