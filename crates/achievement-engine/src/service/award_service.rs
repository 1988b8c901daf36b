//! 成就颁发服务
//!
//! 处理颁发的核心流程：
//! - 成就有效性检查
//! - 不可重复成就的重复颁发检查（锁内检查，唯一约束兜底）
//! - 分值计算（等级分值覆盖基础分值）
//! - 获得次数计算
//! - 颁发记录、进度行与事件在同一次提交中写入
//!
//! ## 自动颁发
//!
//! `update_achievement_progress` 在同一把锁内完成进度累加与颁发，
//! 进度变化和颁发记录一起提交，不会出现只有一半生效的状态。

use std::sync::Arc;
use std::time::Instant;

use achievement_shared::observability::metrics as app_metrics;
use chrono::Utc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::error::{AchievementError, Result};
use crate::events::AchievementEvent;
use crate::lock::LockManager;
use crate::models::{Achievement, AchievementProgress, UserAchievement};
use crate::repository::AchievementStore;
use crate::service::dto::{AwardCommand, ProgressOutcome, UpdateProgressCommand};
use crate::service::progress_service::ProgressTracker;

/// 颁发来源（指标标签）
const SOURCE_MANUAL: &str = "manual";
const SOURCE_AUTO: &str = "auto";

/// 成就颁发服务
pub struct AwardService<S: AchievementStore> {
    store: Arc<S>,
    locks: Arc<LockManager>,
    tracker: Arc<ProgressTracker<S>>,
    max_progress: i64,
}

impl<S: AchievementStore> AwardService<S> {
    pub fn new(
        store: Arc<S>,
        locks: Arc<LockManager>,
        tracker: Arc<ProgressTracker<S>>,
        max_progress: i64,
    ) -> Self {
        Self {
            store,
            locks,
            tracker,
            max_progress,
        }
    }

    /// 颁发成就
    ///
    /// 1. 成就有效性 -> 2. 重复检查 -> 3. 分值 -> 4. 获得次数
    ///    -> 5. 构建颁发记录 -> 6. 同步进度行 -> 7. 写入事件 -> 8. 返回记录
    #[instrument(
        skip(self, cmd),
        fields(
            tenant_id = %cmd.tenant_id,
            user_id = %cmd.user_id,
            achievement_id = %cmd.achievement_id
        )
    )]
    pub async fn award(&self, cmd: &AwardCommand) -> Result<UserAchievement> {
        let started = Instant::now();
        let key = LockManager::progress_key(&cmd.tenant_id, &cmd.user_id, cmd.achievement_id);
        let guard = self.locks.acquire(&key).await?;

        let result = self.award_locked(cmd).await;

        if let Err(e) = guard.release().await {
            warn!(error = %e, "释放颁发锁失败");
        }

        let elapsed = started.elapsed().as_secs_f64();
        match &result {
            Ok(award) => {
                app_metrics::record_award(SOURCE_MANUAL, "success", elapsed);
                info!(
                    user_achievement_id = %award.id,
                    points = award.points_earned,
                    earn_count = award.earn_count,
                    "成就颁发成功"
                );
            }
            Err(e) => {
                app_metrics::record_award(SOURCE_MANUAL, e.error_code(), elapsed);
                warn!(
                    operation = "award",
                    error_code = e.error_code(),
                    error = %e,
                    "成就颁发失败"
                );
            }
        }
        result
    }

    async fn award_locked(&self, cmd: &AwardCommand) -> Result<UserAchievement> {
        validate_award(cmd)?;

        let achievement = self
            .tracker
            .load_active(&cmd.tenant_id, cmd.achievement_id)
            .await?;

        let existing = self
            .store
            .list_awards_for(&cmd.tenant_id, &cmd.user_id, cmd.achievement_id)
            .await?;
        ensure_not_earned(&achievement, &cmd.user_id, &existing)?;

        let tracked = self
            .store
            .get_progress(&cmd.tenant_id, &cmd.user_id, cmd.achievement_id)
            .await?;

        let (award, progress) = self
            .build_award(&achievement, cmd, &existing, tracked)
            .await?;

        let events =
            [AchievementEvent::earned(&award, &achievement, cmd.notify_user)
                .into_outbox(&cmd.tenant_id, cmd.awarded_by.as_deref())?];

        self.store.commit_award(&award, &progress, &events).await?;
        Ok(award)
    }

    /// 更新进度，跨越阈值且 `auto_award` 为 true 时自动颁发
    #[instrument(
        skip(self, cmd),
        fields(
            tenant_id = %cmd.tenant_id,
            user_id = %cmd.user_id,
            achievement_id = %cmd.achievement_id,
            increment = cmd.increment
        )
    )]
    pub async fn update_achievement_progress(
        &self,
        cmd: &UpdateProgressCommand,
    ) -> Result<ProgressOutcome> {
        if !cmd.auto_award {
            return self.tracker.update_progress(cmd).await;
        }

        let started = Instant::now();
        let key = LockManager::progress_key(&cmd.tenant_id, &cmd.user_id, cmd.achievement_id);
        let guard = self.locks.acquire(&key).await?;

        let result = self.progress_with_award_locked(cmd).await;

        if let Err(e) = guard.release().await {
            warn!(error = %e, "释放进度锁失败");
        }

        match &result {
            Ok(outcome) => {
                app_metrics::record_progress_update(outcome.crossed);
                if let Some(award) = &outcome.award {
                    app_metrics::record_award(
                        SOURCE_AUTO,
                        "success",
                        started.elapsed().as_secs_f64(),
                    );
                    info!(
                        user_achievement_id = %award.id,
                        progress = outcome.current_progress,
                        "跨越阈值，已自动颁发"
                    );
                }
            }
            Err(e) => warn!(
                operation = "update_achievement_progress",
                error_code = e.error_code(),
                error = %e,
                "进度更新失败"
            ),
        }
        result
    }

    async fn progress_with_award_locked(
        &self,
        cmd: &UpdateProgressCommand,
    ) -> Result<ProgressOutcome> {
        let step = self.tracker.compute(cmd).await?;
        let progress_event = step.event(cmd.actor.as_deref())?;
        let mut outcome = step.outcome();

        if !step.crossed {
            self.store
                .save_progress(&step.progress, &[progress_event])
                .await?;
            return Ok(outcome);
        }

        let existing = self
            .store
            .list_awards_for(&cmd.tenant_id, &cmd.user_id, cmd.achievement_id)
            .await?;

        if ensure_not_earned(&step.achievement, &cmd.user_id, &existing).is_err() {
            // 手动颁发时进度未满，之后跨越阈值不再重复颁发
            info!("用户已拥有该成就，跳过自动颁发");
            self.store
                .save_progress(&step.progress, &[progress_event])
                .await?;
            return Ok(outcome);
        }

        let award_cmd = AwardCommand {
            tenant_id: cmd.tenant_id.clone(),
            user_id: cmd.user_id.clone(),
            achievement_id: cmd.achievement_id,
            progress: step.progress.current_progress,
            max_progress: step.progress.target_progress,
            level: None,
            context: cmd.context.clone(),
            notify_user: true,
            awarded_by: cmd.actor.clone(),
        };

        let (award, progress) = self
            .build_award(
                &step.achievement,
                &award_cmd,
                &existing,
                Some(step.progress.clone()),
            )
            .await?;

        let earned_event = AchievementEvent::earned(&award, &step.achievement, true)
            .into_outbox(&cmd.tenant_id, cmd.actor.as_deref())?;

        self.store
            .commit_award(&award, &progress, &[progress_event, earned_event])
            .await?;

        outcome.award = Some(award);
        Ok(outcome)
    }

    /// 构建颁发记录与同步后的进度行
    ///
    /// - 实际进度取已跟踪进度与请求进度的较大者，颁发不会让进度倒退
    /// - 可重复成就完成后进度行扣除一次目标值并重新置为未完成，以便再次累积；
    ///   余量不超过目标值减一，下一次颁发至少需要一次新的正增量
    async fn build_award(
        &self,
        achievement: &Achievement,
        cmd: &AwardCommand,
        existing: &[UserAchievement],
        tracked: Option<AchievementProgress>,
    ) -> Result<(UserAchievement, AchievementProgress)> {
        let tracked_value = tracked.as_ref().map_or(0, |p| p.current_progress);
        let effective = cmd.progress.max(tracked_value).min(self.max_progress);
        let is_completed = effective >= cmd.max_progress;

        let points_earned = self.resolve_points(achievement, cmd.level).await?;
        let earn_count = next_earn_count(achievement, existing);
        let now = Utc::now();

        let award = UserAchievement {
            id: Uuid::now_v7(),
            tenant_id: cmd.tenant_id.clone(),
            user_id: cmd.user_id.clone(),
            achievement_id: achievement.id,
            earned_at: now,
            level: cmd.level,
            progress: effective,
            max_progress: cmd.max_progress,
            is_completed,
            is_notified: !cmd.notify_user,
            context: cmd.context.clone(),
            points_earned,
            earn_count,
            awarded_by: cmd.awarded_by.clone(),
        };

        let mut progress = tracked.unwrap_or_else(|| {
            AchievementProgress::new(&cmd.tenant_id, &cmd.user_id, achievement.id)
        });
        progress.current_progress = effective;
        progress.target_progress = cmd.max_progress;
        progress.is_completed = is_completed;
        progress.last_updated = now;
        if !cmd.context.is_null() {
            progress.context = cmd.context.clone();
        }

        // 一次跨越只颁发一次，余量最多保留到目标值减一
        if achievement.is_repeatable && is_completed {
            progress.current_progress =
                (effective - cmd.max_progress).clamp(0, cmd.max_progress - 1);
            progress.is_completed = false;
        }

        Ok((award, progress))
    }

    /// 等级存在时使用等级分值，否则使用基础分值
    async fn resolve_points(&self, achievement: &Achievement, level: Option<i32>) -> Result<i32> {
        let Some(level) = level else {
            return Ok(achievement.points);
        };

        let levels = self
            .store
            .list_levels(&achievement.tenant_id, achievement.id)
            .await?;

        Ok(levels
            .iter()
            .find(|l| l.level == level)
            .map_or(achievement.points, |l| l.points))
    }
}

fn validate_award(cmd: &AwardCommand) -> Result<()> {
    if cmd.user_id.trim().is_empty() {
        return Err(AchievementError::Validation("userId 不能为空".to_string()));
    }
    if cmd.progress < 0 {
        return Err(AchievementError::Validation(format!(
            "progress 不能为负数: {}",
            cmd.progress
        )));
    }
    if cmd.max_progress < 1 {
        return Err(AchievementError::Validation(format!(
            "maxProgress 必须大于 0: {}",
            cmd.max_progress
        )));
    }
    Ok(())
}

fn ensure_not_earned(
    achievement: &Achievement,
    user_id: &str,
    existing: &[UserAchievement],
) -> Result<()> {
    if !achievement.is_repeatable && !existing.is_empty() {
        return Err(AchievementError::AlreadyEarned {
            user_id: user_id.to_string(),
            achievement_id: achievement.id,
        });
    }
    Ok(())
}

/// 可重复成就取已有最大序号加一，撤销中间记录后也不会与现存记录冲突
fn next_earn_count(achievement: &Achievement, existing: &[UserAchievement]) -> i32 {
    if !achievement.is_repeatable {
        return 1;
    }
    existing
        .iter()
        .map(|a| a.earn_count)
        .max()
        .unwrap_or(0)
        .saturating_add(1)
}
