//! 成就撤销服务
//!
//! 删除颁发记录并把对应进度行重新置为未完成。进度值保持不变，
//! 撤销只回滚完成与颁发状态，不回滚已累积的进度。

use std::sync::Arc;

use achievement_shared::observability::metrics as app_metrics;
use chrono::Utc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::error::{AchievementError, Result};
use crate::events::AchievementEvent;
use crate::lock::LockManager;
use crate::models::UserAchievement;
use crate::repository::AchievementStore;

/// 成就撤销服务
pub struct RevokeService<S: AchievementStore> {
    store: Arc<S>,
    locks: Arc<LockManager>,
}

impl<S: AchievementStore> RevokeService<S> {
    pub fn new(store: Arc<S>, locks: Arc<LockManager>) -> Self {
        Self { store, locks }
    }

    /// 撤销一条颁发记录，返回被撤销的记录
    #[instrument(skip(self))]
    pub async fn revoke(
        &self,
        tenant_id: &str,
        user_achievement_id: Uuid,
        reason: Option<&str>,
        revoked_by: Option<&str>,
    ) -> Result<UserAchievement> {
        let award = self.load_award(tenant_id, user_achievement_id).await?;

        let key = LockManager::progress_key(tenant_id, &award.user_id, award.achievement_id);
        let guard = self.locks.acquire(&key).await?;

        let result = self
            .revoke_locked(tenant_id, user_achievement_id, reason, revoked_by)
            .await;

        if let Err(e) = guard.release().await {
            warn!(error = %e, "释放撤销锁失败");
        }

        match &result {
            Ok(revoked) => {
                app_metrics::record_revocation("success");
                info!(
                    user_id = %revoked.user_id,
                    achievement_id = %revoked.achievement_id,
                    points_lost = revoked.points_earned,
                    "成就已撤销"
                );
            }
            Err(e) => {
                app_metrics::record_revocation(e.error_code());
                warn!(
                    operation = "revoke",
                    user_id = %award.user_id,
                    achievement_id = %award.achievement_id,
                    error_code = e.error_code(),
                    error = %e,
                    "成就撤销失败"
                );
            }
        }
        result
    }

    async fn load_award(&self, tenant_id: &str, id: Uuid) -> Result<UserAchievement> {
        self.store
            .get_user_achievement(tenant_id, id)
            .await?
            .ok_or(AchievementError::UserAchievementNotFound(id))
    }

    async fn revoke_locked(
        &self,
        tenant_id: &str,
        user_achievement_id: Uuid,
        reason: Option<&str>,
        revoked_by: Option<&str>,
    ) -> Result<UserAchievement> {
        // 加锁前读取的记录可能已被并发撤销
        let award = self.load_award(tenant_id, user_achievement_id).await?;

        let progress = self
            .store
            .get_progress(tenant_id, &award.user_id, award.achievement_id)
            .await?
            .map(|mut p| {
                p.is_completed = false;
                p.last_updated = Utc::now();
                p
            });

        // 成就可能已停用，事件中的名称与分类尽量补全
        let achievement = self
            .store
            .get_achievement(tenant_id, award.achievement_id)
            .await?;

        let events = [
            AchievementEvent::revoked(&award, achievement.as_ref(), reason)
                .into_outbox(tenant_id, revoked_by)?,
        ];

        let removed = self.store.commit_revoke(&award, progress, &events).await?;
        if !removed {
            return Err(AchievementError::UserAchievementNotFound(user_achievement_id));
        }
        Ok(award)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::lock::LockConfig;

    #[tokio::test]
    async fn test_revoke_missing_award_is_not_found() {
        let service = RevokeService::new(
            Arc::new(crate::repository::MemoryStore::new()),
            Arc::new(LockManager::local_only(LockConfig::default())),
        );

        let err = service
            .revoke("t1", Uuid::now_v7(), None, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
