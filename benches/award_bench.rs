//! 颁发路径性能基准测试
//!
//! 测试覆盖：
//! - 可重复成就的手动颁发（锁 + 内存存储提交 + outbox 投递）
//! - 进度累加（不跨阈值）
//! - 不同用户规模下的排行榜计算

use std::hint::black_box;
use std::sync::Arc;

use achievement_engine::AchievementEngine;
use achievement_engine::events::InMemoryEventSink;
use achievement_engine::models::LeaderboardFilter;
use achievement_engine::repository::MemoryStore;
use achievement_engine::service::{AwardCommand, CreateAchievementCommand, UpdateProgressCommand};
use achievement_shared::config::EngineConfig;
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use tokio::runtime::Runtime;
use uuid::Uuid;

const TENANT: &str = "bench";

fn setup(rt: &Runtime, repeatable: bool) -> (AchievementEngine<MemoryStore>, Uuid) {
    let config = EngineConfig {
        max_progress: i64::MAX / 2,
        ..EngineConfig::default()
    };
    let engine = AchievementEngine::local(
        Arc::new(MemoryStore::new()),
        Arc::new(InMemoryEventSink::new()),
        &config,
    );
    let id = rt
        .block_on(engine.create_achievement(
            TENANT,
            CreateAchievementCommand {
                name: "Bench".to_string(),
                category: "bench".to_string(),
                achievement_type: "milestone".to_string(),
                points: 10,
                is_active: true,
                is_repeatable: repeatable,
                ..Default::default()
            },
            None,
        ))
        .expect("create achievement")
        .achievement
        .id;
    (engine, id)
}

fn bench_award(c: &mut Criterion) {
    let rt = Runtime::new().expect("tokio runtime");
    let (engine, id) = setup(&rt, true);
    let cmd = AwardCommand::simple(TENANT, "u1", id);

    c.bench_function("award_repeatable", |b| {
        b.iter(|| rt.block_on(async { black_box(engine.award(&cmd).await) }))
    });
}

fn bench_progress(c: &mut Criterion) {
    let rt = Runtime::new().expect("tokio runtime");
    let (engine, id) = setup(&rt, false);
    // 首次更新即跨阈值，之后的更新都在已完成状态上累加
    let cmd = UpdateProgressCommand::new(TENANT, "u1", id, 1);

    c.bench_function("update_progress", |b| {
        b.iter(|| rt.block_on(async { black_box(engine.update_progress(&cmd).await) }))
    });
}

fn bench_leaderboard(c: &mut Criterion) {
    let rt = Runtime::new().expect("tokio runtime");
    let mut group = c.benchmark_group("leaderboard");

    for users in [100usize, 1_000, 10_000] {
        let (engine, id) = setup(&rt, true);
        rt.block_on(async {
            for i in 0..users {
                let user = format!("user-{i}");
                for _ in 0..(i % 3 + 1) {
                    let _ = engine.award(&AwardCommand::simple(TENANT, &user, id)).await;
                }
            }
        });

        group.throughput(Throughput::Elements(users as u64));
        group.bench_with_input(BenchmarkId::from_parameter(users), &users, |b, _| {
            b.iter(|| {
                rt.block_on(async {
                    black_box(
                        engine
                            .get_leaderboard(TENANT, &LeaderboardFilter::default(), 10)
                            .await,
                    )
                })
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_award, bench_progress, bench_leaderboard);
criterion_main!(benches);
