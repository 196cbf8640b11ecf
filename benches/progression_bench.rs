//! 成长引擎性能基准测试
//!
//! 测试覆盖：
//! - 等级查找（默认表与大表）
//! - 跨级入账的奖励累计
//! - 进度百分比计算

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use rewards_engine::{LevelTable, ProgressionEngine};
use std::hint::black_box;

/// 构造 n 级的等差阈值表
fn create_engine(levels: usize) -> ProgressionEngine {
    let thresholds: Vec<i64> = (0..levels as i64).map(|i| i * 100).collect();
    let bonuses: Vec<i64> = (0..levels as i64).map(|i| i * 5).collect();
    ProgressionEngine::new(LevelTable::new(thresholds, bonuses).expect("valid table"))
}

/// 基准测试：默认表等级查找
fn bench_level_lookup(c: &mut Criterion) {
    let engine = ProgressionEngine::default();

    c.bench_function("level_lookup_default_table", |b| {
        b.iter(|| {
            for xp in [0, 49, 50, 700, 2999, 3000, 10_000] {
                black_box(engine.level(black_box(xp)));
            }
        })
    });
}

/// 基准测试：不同大小阈值表的等级查找
fn bench_level_lookup_by_table_size(c: &mut Criterion) {
    let mut group = c.benchmark_group("level_lookup_by_table_size");

    for levels in [10usize, 100, 1_000, 10_000] {
        let engine = create_engine(levels);
        let max_xp = (levels as i64) * 100;

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::from_parameter(levels), &engine, |b, engine| {
            b.iter(|| black_box(engine.level(black_box(max_xp / 2))))
        });
    }

    group.finish();
}

/// 基准测试：入账与跨级奖励累计
fn bench_on_earn(c: &mut Criterion) {
    let mut group = c.benchmark_group("on_earn");
    let engine = ProgressionEngine::default();

    group.bench_function("no_level_up", |b| {
        b.iter(|| black_box(engine.on_earn(black_box(10), black_box(20))))
    });

    group.bench_function("multi_level_jump", |b| {
        b.iter(|| black_box(engine.on_earn(black_box(0), black_box(2_500))))
    });

    let large = create_engine(10_000);
    group.bench_function("jump_across_10000_levels", |b| {
        b.iter(|| black_box(large.on_earn(black_box(0), black_box(1_000_000))))
    });

    group.finish();
}

/// 基准测试：进度百分比与重量换算
fn bench_progress(c: &mut Criterion) {
    let mut group = c.benchmark_group("progress");
    let engine = ProgressionEngine::default();

    group.bench_function("progress_percent", |b| {
        b.iter(|| {
            let xp = black_box(1_234);
            black_box(engine.progress_percent(xp, engine.level(xp)))
        })
    });

    group.bench_function("xp_from_kilograms", |b| {
        b.iter(|| black_box(engine.xp_from_kilograms(black_box(2.5))))
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_level_lookup,
    bench_level_lookup_by_table_size,
    bench_on_earn,
    bench_progress,
);
criterion_main!(benches);
