//! 进度跟踪服务
//!
//! 累加进度并检测完成阈值的跨越。每次更新都会产生进度事件，
//! 无论是否跨越阈值。

use std::sync::Arc;

use achievement_shared::observability::metrics as app_metrics;
use chrono::Utc;
use tracing::{debug, instrument, warn};

use crate::error::{AchievementError, Result};
use crate::events::{AchievementEvent, OutboxEvent};
use crate::lock::LockManager;
use crate::models::{Achievement, AchievementProgress};
use crate::repository::AchievementStore;
use crate::service::dto::{ProgressOutcome, UpdateProgressCommand};

/// 一次进度计算的结果（尚未写入）
#[derive(Debug, Clone)]
pub struct ProgressStep {
    pub achievement: Achievement,
    /// 更新后的进度行
    pub progress: AchievementProgress,
    pub previous_progress: i64,
    /// 由未完成变为完成
    pub crossed: bool,
}

impl ProgressStep {
    pub fn event(&self, actor: Option<&str>) -> Result<OutboxEvent> {
        AchievementEvent::progress_updated(
            &self.achievement,
            &self.progress,
            self.previous_progress,
            self.crossed,
        )
        .into_outbox(&self.progress.tenant_id, actor)
    }

    pub fn outcome(&self) -> ProgressOutcome {
        ProgressOutcome {
            previous_progress: self.previous_progress,
            current_progress: self.progress.current_progress,
            target_progress: self.progress.target_progress,
            percentage: self.progress.percentage(),
            is_completed: self.progress.is_completed,
            crossed: self.crossed,
            award: None,
        }
    }
}

/// 进度跟踪服务
pub struct ProgressTracker<S: AchievementStore> {
    store: Arc<S>,
    locks: Arc<LockManager>,
    max_progress: i64,
}

impl<S: AchievementStore> ProgressTracker<S> {
    pub fn new(store: Arc<S>, locks: Arc<LockManager>, max_progress: i64) -> Self {
        Self {
            store,
            locks,
            max_progress: max_progress.max(1),
        }
    }

    /// 加载启用中的成就，不存在或已停用返回 NotFound
    pub(crate) async fn load_active(
        &self,
        tenant_id: &str,
        achievement_id: uuid::Uuid,
    ) -> Result<Achievement> {
        let achievement = self
            .store
            .get_achievement(tenant_id, achievement_id)
            .await?
            .ok_or(AchievementError::AchievementNotFound(achievement_id))?;

        if !achievement.is_active {
            return Err(AchievementError::AchievementInactive(achievement_id));
        }
        Ok(achievement)
    }

    /// 计算累加后的进度，不写入存储
    ///
    /// 调用方必须已持有该 (用户, 成就) 的锁。
    pub(crate) async fn compute(&self, cmd: &UpdateProgressCommand) -> Result<ProgressStep> {
        if cmd.increment < 0 {
            return Err(AchievementError::NegativeIncrement(cmd.increment));
        }

        let achievement = self.load_active(&cmd.tenant_id, cmd.achievement_id).await?;

        let mut progress = self
            .store
            .get_progress(&cmd.tenant_id, &cmd.user_id, cmd.achievement_id)
            .await?
            .unwrap_or_else(|| {
                AchievementProgress::new(&cmd.tenant_id, &cmd.user_id, cmd.achievement_id)
            });

        let previous_progress = progress.current_progress;
        let was_completed = progress.is_completed;

        progress.current_progress = previous_progress
            .saturating_add(cmd.increment)
            .clamp(0, self.max_progress);
        progress.is_completed = progress.current_progress >= progress.target_progress;
        progress.last_updated = Utc::now();
        if !cmd.context.is_null() {
            progress.context = cmd.context.clone();
        }

        Ok(ProgressStep {
            crossed: !was_completed && progress.is_completed,
            achievement,
            progress,
            previous_progress,
        })
    }

    /// 更新进度（不自动颁发）
    #[instrument(
        skip(self, cmd),
        fields(
            tenant_id = %cmd.tenant_id,
            user_id = %cmd.user_id,
            achievement_id = %cmd.achievement_id,
            increment = cmd.increment
        )
    )]
    pub async fn update_progress(&self, cmd: &UpdateProgressCommand) -> Result<ProgressOutcome> {
        let key = LockManager::progress_key(&cmd.tenant_id, &cmd.user_id, cmd.achievement_id);
        let guard = self.locks.acquire(&key).await?;

        let result = self.apply(cmd).await;

        if let Err(e) = guard.release().await {
            warn!(error = %e, "释放进度锁失败");
        }

        match &result {
            Ok(outcome) => debug!(
                previous = outcome.previous_progress,
                current = outcome.current_progress,
                crossed = outcome.crossed,
                "进度已更新"
            ),
            Err(e) => warn!(
                operation = "update_progress",
                error_code = e.error_code(),
                error = %e,
                "进度更新失败"
            ),
        }
        result
    }

    async fn apply(&self, cmd: &UpdateProgressCommand) -> Result<ProgressOutcome> {
        let step = self.compute(cmd).await?;
        let events = [step.event(cmd.actor.as_deref())?];
        self.store.save_progress(&step.progress, &events).await?;
        app_metrics::record_progress_update(step.crossed);
        Ok(step.outcome())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::lock::LockConfig;
    use crate::models::ContextValue;
    use crate::repository::{MemoryStore, MockAchievementStore};
    use uuid::Uuid;

    fn achievement(tenant: &str, active: bool) -> Achievement {
        Achievement {
            id: Uuid::now_v7(),
            tenant_id: tenant.to_string(),
            name: "Reader".to_string(),
            description: "read lessons".to_string(),
            category: "learning".to_string(),
            achievement_type: "progress".to_string(),
            points: 10,
            is_active: active,
            is_secret: false,
            is_repeatable: false,
            conditions: ContextValue::Null,
            display_order: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    async fn tracker_with(a: &Achievement) -> (Arc<MemoryStore>, ProgressTracker<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        store.insert_achievement(a, &[], &[]).await.unwrap();
        let tracker = ProgressTracker::new(
            store.clone(),
            Arc::new(LockManager::local_only(LockConfig::default())),
            1_000,
        );
        (store, tracker)
    }

    #[tokio::test]
    async fn test_first_update_creates_row_with_default_target() {
        let a = achievement("t1", true);
        let (store, tracker) = tracker_with(&a).await;

        let outcome = tracker
            .update_progress(&UpdateProgressCommand::new("t1", "u1", a.id, 1))
            .await
            .unwrap();

        assert_eq!(outcome.previous_progress, 0);
        assert_eq!(outcome.target_progress, 1);
        assert!(outcome.crossed);
        assert_eq!(store.pending_event_count(), 1);
    }

    #[tokio::test]
    async fn test_non_positive_bound_does_not_panic() {
        let a = achievement("t1", true);
        let store = Arc::new(MemoryStore::new());
        store.insert_achievement(&a, &[], &[]).await.unwrap();
        let tracker = ProgressTracker::new(
            store.clone(),
            Arc::new(LockManager::local_only(LockConfig::default())),
            -10,
        );

        let outcome = tracker
            .update_progress(&UpdateProgressCommand::new("t1", "u1", a.id, 5))
            .await
            .unwrap();
        assert_eq!(outcome.current_progress, 1);
    }

    #[tokio::test]
    async fn test_negative_increment_rejected() {
        let a = achievement("t1", true);
        let (store, tracker) = tracker_with(&a).await;

        let err = tracker
            .update_progress(&UpdateProgressCommand::new("t1", "u1", a.id, -3))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Invalid);
        assert!(store.get_progress("t1", "u1", a.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_inactive_achievement_is_not_found() {
        let a = achievement("t1", false);
        let (_, tracker) = tracker_with(&a).await;

        let err = tracker
            .update_progress(&UpdateProgressCommand::new("t1", "u1", a.id, 1))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_progress_clamped_to_bound() {
        let a = achievement("t1", true);
        let (_, tracker) = tracker_with(&a).await;

        let outcome = tracker
            .update_progress(&UpdateProgressCommand::new("t1", "u1", a.id, i64::MAX))
            .await
            .unwrap();
        assert_eq!(outcome.current_progress, 1_000);

        let outcome = tracker
            .update_progress(&UpdateProgressCommand::new("t1", "u1", a.id, 5))
            .await
            .unwrap();
        assert_eq!(outcome.current_progress, 1_000);
        assert!(!outcome.crossed);
    }

    #[tokio::test]
    async fn test_store_error_surfaces_as_failure() {
        let mut store = MockAchievementStore::new();
        store
            .expect_get_achievement()
            .returning(|_, _| Err(AchievementError::Database(sqlx::Error::PoolTimedOut)));
        let tracker = ProgressTracker::new(
            Arc::new(store),
            Arc::new(LockManager::local_only(LockConfig::default())),
            1_000,
        );

        let err = tracker
            .update_progress(&UpdateProgressCommand::new("t1", "u1", Uuid::now_v7(), 1))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Failure);
        assert!(err.is_retryable());
    }
}
