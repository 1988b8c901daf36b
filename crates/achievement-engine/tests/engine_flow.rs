//! 引擎端到端流程测试（内存存储）

mod common;

use achievement_engine::ErrorKind;
use achievement_engine::events::{AchievementEarned, AchievementRevoked, ProgressUpdated};
use achievement_engine::models::LeaderboardFilter;
use achievement_engine::repository::AchievementStore;
use achievement_engine::service::{
    AwardCommand, PageRequest, RemovalOutcome, SortDirection, UpdateProgressCommand,
    UserAchievementFilter, UserAchievementSort,
};
use achievement_shared::events::EventType;
use common::{TENANT, TestContext};
use fake::Fake;
use fake::faker::internet::en::Username;

#[tokio::test]
async fn first_win_award_conflict_and_revoke() {
    let ctx = TestContext::new();
    let first_win = ctx.create("FirstWin", 10, false).await;

    let award = ctx
        .engine
        .award(&AwardCommand::simple(TENANT, "U1", first_win.id))
        .await
        .unwrap();
    assert_eq!(award.points_earned, 10);
    assert_eq!(ctx.total_points("U1").await, 10);

    let err = ctx
        .engine
        .award(&AwardCommand::simple(TENANT, "U1", first_win.id))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    ctx.engine
        .revoke(TENANT, award.id, Some("test"), Some("admin"))
        .await
        .unwrap();
    assert_eq!(ctx.total_points("U1").await, 0);
}

#[tokio::test]
async fn duplicate_award_leaves_single_row() {
    let ctx = TestContext::new();
    let a = ctx.create("Once", 5, false).await;

    let results = [
        ctx.engine
            .award(&AwardCommand::simple(TENANT, "u1", a.id))
            .await,
        ctx.engine
            .award(&AwardCommand::simple(TENANT, "u1", a.id))
            .await,
    ];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);

    let rows = ctx
        .engine
        .store()
        .list_awards_for(TENANT, "u1", a.id)
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].earn_count, 1);
}

#[tokio::test]
async fn progress_is_monotonic_and_sums_increments() {
    let ctx = TestContext::new();
    let a = ctx.create("Grinder", 1, false).await;

    for round in 0..5 {
        let user = format!("{}-{round}", Username().fake::<String>());
        let mut expected = 0i64;
        let mut last = 0i64;

        for _ in 0..20 {
            let increment: i64 = (0i64..50).fake();
            let outcome = ctx
                .engine
                .update_progress(&UpdateProgressCommand::new(TENANT, &user, a.id, increment))
                .await
                .unwrap();

            expected += increment;
            assert!(outcome.current_progress >= last);
            assert_eq!(outcome.previous_progress, last);
            last = outcome.current_progress;
        }

        assert_eq!(last, expected);
    }
}

#[tokio::test]
async fn threshold_crossing_reported_exactly_once() {
    let ctx = TestContext::new();
    let a = ctx.create("Ten", 10, false).await;
    ctx.seed_target("u1", a.id, 10).await;

    let update = |inc| UpdateProgressCommand::new(TENANT, "u1", a.id, inc);

    let first = ctx.engine.update_progress(&update(4)).await.unwrap();
    assert!(!first.crossed);
    assert!(!first.is_completed);

    let second = ctx.engine.update_progress(&update(6)).await.unwrap();
    assert!(second.crossed);
    assert!(second.is_completed);
    assert_eq!(second.percentage, 100.0);

    let third = ctx.engine.update_progress(&update(1)).await.unwrap();
    assert!(!third.crossed);
    assert!(third.is_completed);

    // 每次更新都发布进度事件，无论是否跨阈值
    ctx.flush().await;
    let events = ctx.sink.events_of(EventType::AchievementProgressUpdated);
    assert_eq!(events.len(), 3);
    let crossed: Vec<bool> = events
        .iter()
        .map(|e| e.decode::<ProgressUpdated>().unwrap().crossed)
        .collect();
    assert_eq!(crossed, vec![false, true, false]);
}

#[tokio::test]
async fn auto_award_cascade_fires_once() {
    let ctx = TestContext::new();
    let a = ctx.create("Ten", 10, false).await;
    ctx.seed_target("u1", a.id, 10).await;

    let update = |inc| UpdateProgressCommand::new(TENANT, "u1", a.id, inc).with_auto_award();

    let first = ctx.engine.update_progress(&update(4)).await.unwrap();
    assert!(first.award.is_none());

    let second = ctx.engine.update_progress(&update(6)).await.unwrap();
    let award = second.award.expect("crossing should award");
    assert_eq!(award.progress, 10);
    assert_eq!(award.max_progress, 10);
    assert!(award.is_completed);

    let third = ctx.engine.update_progress(&update(1)).await.unwrap();
    assert!(third.award.is_none());

    let rows = ctx
        .engine
        .store()
        .list_awards_for(TENANT, "u1", a.id)
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);

    ctx.flush().await;
    let earned = ctx.sink.events_of(EventType::AchievementEarned);
    assert_eq!(earned.len(), 1);
    let payload: AchievementEarned = earned[0].decode().unwrap();
    assert_eq!(payload.points, 10);
    assert_eq!(earned[0].partition_key, "u1");
}

#[tokio::test]
async fn repeatable_awards_accumulate_earn_count() {
    let ctx = TestContext::new();
    let a = ctx.create("Daily", 3, true).await;

    let mut counts = Vec::new();
    for _ in 0..3 {
        let award = ctx
            .engine
            .award(&AwardCommand::simple(TENANT, "u1", a.id))
            .await
            .unwrap();
        counts.push(award.earn_count);
    }

    assert_eq!(counts, vec![1, 2, 3]);
    assert_eq!(ctx.total_points("u1").await, 9);

    let page = ctx
        .engine
        .list_user_achievements(
            TENANT,
            "u1",
            &UserAchievementFilter::default(),
            UserAchievementSort::EarnedAt,
            SortDirection::Asc,
            PageRequest::default(),
        )
        .await
        .unwrap();
    assert_eq!(page.total, 3);
}

#[tokio::test]
async fn repeatable_cascade_awards_once_per_crossing() {
    let ctx = TestContext::new();
    let a = ctx.create("Streak", 2, true).await;
    ctx.seed_target("u1", a.id, 10).await;

    let step = |increment| {
        UpdateProgressCommand::new(TENANT, "u1", a.id, increment).with_auto_award()
    };

    let first = ctx.engine.update_progress(&step(4)).await.unwrap();
    assert!(!first.crossed);
    assert!(first.award.is_none());

    let second = ctx.engine.update_progress(&step(6)).await.unwrap();
    assert!(second.crossed);
    let award = second.award.unwrap();
    assert_eq!(award.earn_count, 1);
    assert_eq!(award.progress, 10);
    let progress = ctx.stored_progress("u1", a.id).await;
    assert_eq!(progress.current_progress, 0);
    assert!(!progress.is_completed);
    assert_eq!(progress.target_progress, 10);

    // 一次大增量跨越多个目标值也只颁发一次，余量封顶为目标值减一
    let third = ctx.engine.update_progress(&step(25)).await.unwrap();
    assert!(third.crossed);
    let award = third.award.unwrap();
    assert_eq!(award.earn_count, 2);
    assert_eq!(award.progress, 25);
    assert_eq!(ctx.stored_progress("u1", a.id).await.current_progress, 9);

    let idle = ctx.engine.update_progress(&step(0)).await.unwrap();
    assert!(!idle.crossed);
    assert!(idle.award.is_none());

    let fourth = ctx.engine.update_progress(&step(1)).await.unwrap();
    assert!(fourth.crossed);
    assert_eq!(fourth.award.unwrap().earn_count, 3);
    assert_eq!(ctx.stored_progress("u1", a.id).await.current_progress, 0);

    assert_eq!(ctx.total_points("u1").await, 6);
}

#[tokio::test]
async fn revoke_restores_points_and_keeps_progress_value() {
    let ctx = TestContext::new();
    let keep = ctx.create("Keep", 7, false).await;
    let lose = ctx.create("Lose", 12, false).await;

    ctx.engine
        .award(&AwardCommand::simple(TENANT, "u1", keep.id))
        .await
        .unwrap();
    let award = ctx
        .engine
        .award(&AwardCommand {
            progress: 5,
            max_progress: 5,
            ..AwardCommand::simple(TENANT, "u1", lose.id)
        })
        .await
        .unwrap();
    assert_eq!(ctx.total_points("u1").await, 19);

    let revoked = ctx
        .engine
        .revoke(TENANT, award.id, Some("cheating"), Some("moderator"))
        .await
        .unwrap();
    assert_eq!(revoked.id, award.id);
    assert_eq!(ctx.total_points("u1").await, 19 - award.points_earned as i64);

    let progress = ctx
        .engine
        .store()
        .get_progress(TENANT, "u1", lose.id)
        .await
        .unwrap()
        .unwrap();
    assert!(!progress.is_completed);
    assert_eq!(progress.current_progress, 5);

    ctx.flush().await;
    let events = ctx.sink.events_of(EventType::AchievementRevoked);
    assert_eq!(events.len(), 1);
    let payload: AchievementRevoked = events[0].decode().unwrap();
    assert_eq!(payload.points_lost, 12);
    assert_eq!(payload.reason.as_deref(), Some("cheating"));
    assert_eq!(events[0].actor.as_deref(), Some("moderator"));

    // 撤销后可再次获得
    assert!(
        ctx.engine
            .award(&AwardCommand::simple(TENANT, "u1", lose.id))
            .await
            .is_ok()
    );
}

#[tokio::test]
async fn revoke_unknown_award_is_not_found() {
    let ctx = TestContext::new();
    let err = ctx
        .engine
        .revoke(TENANT, uuid::Uuid::now_v7(), None, None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn leaderboard_orders_by_points_then_count() {
    let ctx = TestContext::new();
    let big = ctx.create("Big", 30, false).await;
    let small = ctx.create("Small", 10, true).await;

    // alice: 30 分 1 个；bob: 30 分 3 个；carol: 10 分 1 个
    ctx.engine
        .award(&AwardCommand::simple(TENANT, "alice", big.id))
        .await
        .unwrap();
    for _ in 0..3 {
        ctx.engine
            .award(&AwardCommand::simple(TENANT, "bob", small.id))
            .await
            .unwrap();
    }
    ctx.engine
        .award(&AwardCommand::simple(TENANT, "carol", small.id))
        .await
        .unwrap();

    let board = ctx
        .engine
        .get_leaderboard(TENANT, &LeaderboardFilter::default(), 10)
        .await
        .unwrap();

    let order: Vec<(&str, u32)> = board.iter().map(|e| (e.user_id.as_str(), e.rank)).collect();
    assert_eq!(order, vec![("bob", 1), ("alice", 2), ("carol", 3)]);
    assert_eq!(board[0].total_points, 30);
    assert_eq!(board[0].total_achievements, 3);

    let top = ctx
        .engine
        .get_leaderboard(TENANT, &LeaderboardFilter::default(), 1)
        .await
        .unwrap();
    assert_eq!(top.len(), 1);
}

#[tokio::test]
async fn non_completion_edges_still_gate_can_earn() {
    let ctx = TestContext::new();
    let a = ctx.create("A", 1, false).await;
    let b = ctx.create("B", 1, false).await;
    let master = ctx.create("Master", 50, false).await;

    for id in [a.id, b.id] {
        ctx.engine
            .add_prerequisite(TENANT, master.id, id, false)
            .await
            .unwrap();
    }

    let check = ctx
        .engine
        .check_prerequisites(TENANT, "u1", master.id)
        .await
        .unwrap();
    assert!(!check.can_earn);
    assert_eq!(check.prerequisites.len(), 2);
    assert!(
        check
            .prerequisites
            .iter()
            .all(|p| !p.is_met && !p.requires_completion)
    );

    for id in [a.id, b.id] {
        ctx.engine
            .award(&AwardCommand::simple(TENANT, "u1", id))
            .await
            .unwrap();
    }
    let check = ctx
        .engine
        .check_prerequisites(TENANT, "u1", master.id)
        .await
        .unwrap();
    assert!(check.can_earn);
}

#[tokio::test]
async fn prerequisites_gate_can_earn() {
    let ctx = TestContext::new();
    let a = ctx.create("A", 1, false).await;
    let b = ctx.create("B", 1, false).await;
    let master = ctx.create("Master", 50, false).await;

    ctx.engine
        .add_prerequisite(TENANT, master.id, a.id, true)
        .await
        .unwrap();
    ctx.engine
        .add_prerequisite(TENANT, master.id, b.id, true)
        .await
        .unwrap();

    ctx.engine
        .award(&AwardCommand::simple(TENANT, "u1", a.id))
        .await
        .unwrap();

    let check = ctx
        .engine
        .check_prerequisites(TENANT, "u1", master.id)
        .await
        .unwrap();
    assert!(!check.can_earn);
    let met = |id| {
        check
            .prerequisites
            .iter()
            .find(|p| p.id == id)
            .map(|p| p.is_met)
    };
    assert_eq!(met(a.id), Some(true));
    assert_eq!(met(b.id), Some(false));

    ctx.engine
        .award(&AwardCommand::simple(TENANT, "u1", b.id))
        .await
        .unwrap();
    let check = ctx
        .engine
        .check_prerequisites(TENANT, "u1", master.id)
        .await
        .unwrap();
    assert!(check.can_earn);

    // 无前置条件时恒为可获得
    let free = ctx
        .engine
        .check_prerequisites(TENANT, "u2", a.id)
        .await
        .unwrap();
    assert!(free.can_earn);
    assert!(free.prerequisites.is_empty());
}

#[tokio::test]
async fn prerequisite_cycle_is_rejected() {
    let ctx = TestContext::new();
    let a = ctx.create("A", 1, false).await;
    let b = ctx.create("B", 1, false).await;

    ctx.engine
        .add_prerequisite(TENANT, b.id, a.id, true)
        .await
        .unwrap();
    let err = ctx
        .engine
        .add_prerequisite(TENANT, a.id, b.id, true)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Invalid);

    let err = ctx
        .engine
        .add_prerequisite(TENANT, a.id, a.id, true)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Invalid);
}

#[tokio::test]
async fn earned_achievement_is_deactivated_not_deleted() {
    let ctx = TestContext::new();
    let earned = ctx.create("Earned", 5, false).await;
    let unused = ctx.create("Unused", 5, false).await;

    ctx.engine
        .award(&AwardCommand::simple(TENANT, "u1", earned.id))
        .await
        .unwrap();

    let outcome = ctx
        .engine
        .deactivate_or_delete_achievement(TENANT, earned.id, Some("admin"))
        .await
        .unwrap();
    assert_eq!(outcome, RemovalOutcome::Deactivated);
    let detail = ctx
        .engine
        .get_achievement(TENANT, earned.id, false, false)
        .await
        .unwrap();
    assert!(!detail.achievement.is_active);

    // 停用后不再接受进度与颁发
    let err = ctx
        .engine
        .update_progress(&UpdateProgressCommand::new(TENANT, "u2", earned.id, 1))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let outcome = ctx
        .engine
        .deactivate_or_delete_achievement(TENANT, unused.id, Some("admin"))
        .await
        .unwrap();
    assert_eq!(outcome, RemovalOutcome::Deleted);
    ctx.flush().await;
    assert_eq!(ctx.sink.events_of(EventType::AchievementDeleted).len(), 1);
}

#[tokio::test]
async fn summary_and_available_reflect_awards() {
    let ctx = TestContext::new();
    let done = ctx.create("Done", 10, false).await;
    let near = ctx.create("Near", 10, false).await;
    let daily = ctx.create("Daily", 1, true).await;

    ctx.engine
        .award(&AwardCommand::simple(TENANT, "u1", done.id))
        .await
        .unwrap();
    ctx.engine
        .award(&AwardCommand::simple(TENANT, "u1", daily.id))
        .await
        .unwrap();
    ctx.seed_target("u1", near.id, 10).await;
    ctx.engine
        .update_progress(&UpdateProgressCommand::new(TENANT, "u1", near.id, 9))
        .await
        .unwrap();

    let summary = ctx
        .engine
        .get_user_summary(TENANT, "u1", Some(1), Some(80))
        .await
        .unwrap();
    assert_eq!(summary.total_achievements, 2);
    assert_eq!(summary.total_points, 11);
    assert_eq!(summary.completed_count, 2);
    assert_eq!(summary.in_progress_count, 1);
    assert_eq!(summary.recent_achievements.len(), 1);
    assert_eq!(summary.near_completion.len(), 1);
    assert_eq!(summary.near_completion[0].achievement_id, near.id);
    assert_eq!(summary.category_breakdown.get("general"), Some(&2));

    let available = ctx
        .engine
        .list_available_achievements(TENANT, "u1", &Default::default(), PageRequest::default())
        .await
        .unwrap();
    let ids: Vec<_> = available.items.iter().map(|a| a.id).collect();
    assert!(!ids.contains(&done.id));
    assert!(ids.contains(&near.id));
    assert!(ids.contains(&daily.id));
}

#[tokio::test]
async fn statistics_count_earners_and_progress() {
    let ctx = TestContext::new();
    let a = ctx.create("Stat", 5, false).await;

    ctx.engine
        .award(&AwardCommand::simple(TENANT, "u1", a.id))
        .await
        .unwrap();
    ctx.seed_target("u2", a.id, 10).await;
    ctx.engine
        .update_progress(&UpdateProgressCommand::new(TENANT, "u2", a.id, 3))
        .await
        .unwrap();

    let stats = ctx.engine.get_statistics(TENANT, a.id).await.unwrap();
    assert_eq!(stats.total_earned, 1);
    assert_eq!(stats.eligible_users, 2);
    assert_eq!(stats.in_progress, 1);
    assert_eq!(stats.completion_rate, 0.5);
    assert!(stats.first_earned_at.is_some());
    assert_eq!(stats.first_earned_at, stats.last_earned_at);
}

#[tokio::test]
async fn tenants_are_isolated() {
    let ctx = TestContext::new();
    let a = ctx.create("Shared", 5, false).await;

    let err = ctx
        .engine
        .award(&AwardCommand::simple("tenant-b", "u1", a.id))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}
