//! 带超时的存储装饰器
//!
//! 引擎发出的每个存储调用都受 `store_timeout_ms` 约束，超时返回可重试的 `Timeout`。

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;
use uuid::Uuid;

use super::traits::AchievementStore;
use crate::error::{AchievementError, Result};
use crate::events::OutboxEvent;
use crate::models::{
    Achievement, AchievementLevel, AchievementPrerequisite, AchievementProgress,
    LeaderboardFilter, UserAchievement, UserPoints,
};

pub struct TimeoutStore<S> {
    inner: S,
    timeout: Duration,
}

impl<S: AchievementStore> TimeoutStore<S> {
    pub fn new(inner: S, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    async fn bounded<T>(
        &self,
        operation: &'static str,
        fut: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    operation,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "存储调用超时"
                );
                Err(AchievementError::Timeout {
                    operation: operation.to_string(),
                })
            }
        }
    }
}

#[async_trait]
impl<S: AchievementStore> AchievementStore for TimeoutStore<S> {
    async fn get_achievement(&self, tenant_id: &str, id: Uuid) -> Result<Option<Achievement>> {
        self.bounded("get_achievement", self.inner.get_achievement(tenant_id, id))
            .await
    }

    async fn list_achievements(&self, tenant_id: &str) -> Result<Vec<Achievement>> {
        self.bounded("list_achievements", self.inner.list_achievements(tenant_id))
            .await
    }

    async fn find_achievement_by_name(
        &self,
        tenant_id: &str,
        name: &str,
    ) -> Result<Option<Achievement>> {
        self.bounded(
            "find_achievement_by_name",
            self.inner.find_achievement_by_name(tenant_id, name),
        )
        .await
    }

    async fn insert_achievement(
        &self,
        achievement: &Achievement,
        levels: &[AchievementLevel],
        events: &[OutboxEvent],
    ) -> Result<()> {
        self.bounded(
            "insert_achievement",
            self.inner.insert_achievement(achievement, levels, events),
        )
        .await
    }

    async fn update_achievement(
        &self,
        achievement: &Achievement,
        levels: Option<Vec<AchievementLevel>>,
        events: &[OutboxEvent],
    ) -> Result<()> {
        self.bounded(
            "update_achievement",
            self.inner.update_achievement(achievement, levels, events),
        )
        .await
    }

    async fn delete_achievement_if_unearned(
        &self,
        tenant_id: &str,
        id: Uuid,
        events: &[OutboxEvent],
    ) -> Result<bool> {
        self.bounded(
            "delete_achievement_if_unearned",
            self.inner.delete_achievement_if_unearned(tenant_id, id, events),
        )
        .await
    }

    async fn list_levels(
        &self,
        tenant_id: &str,
        achievement_id: Uuid,
    ) -> Result<Vec<AchievementLevel>> {
        self.bounded("list_levels", self.inner.list_levels(tenant_id, achievement_id))
            .await
    }

    async fn list_prerequisites(
        &self,
        tenant_id: &str,
        achievement_id: Uuid,
    ) -> Result<Vec<AchievementPrerequisite>> {
        self.bounded(
            "list_prerequisites",
            self.inner.list_prerequisites(tenant_id, achievement_id),
        )
        .await
    }

    async fn list_all_prerequisites(&self, tenant_id: &str) -> Result<Vec<AchievementPrerequisite>> {
        self.bounded(
            "list_all_prerequisites",
            self.inner.list_all_prerequisites(tenant_id),
        )
        .await
    }

    async fn insert_prerequisite(&self, edge: &AchievementPrerequisite) -> Result<()> {
        self.bounded("insert_prerequisite", self.inner.insert_prerequisite(edge))
            .await
    }

    async fn delete_prerequisite(
        &self,
        tenant_id: &str,
        achievement_id: Uuid,
        prerequisite_id: Uuid,
    ) -> Result<bool> {
        self.bounded(
            "delete_prerequisite",
            self.inner
                .delete_prerequisite(tenant_id, achievement_id, prerequisite_id),
        )
        .await
    }

    async fn get_progress(
        &self,
        tenant_id: &str,
        user_id: &str,
        achievement_id: Uuid,
    ) -> Result<Option<AchievementProgress>> {
        self.bounded(
            "get_progress",
            self.inner.get_progress(tenant_id, user_id, achievement_id),
        )
        .await
    }

    async fn list_user_progress(
        &self,
        tenant_id: &str,
        user_id: &str,
    ) -> Result<Vec<AchievementProgress>> {
        self.bounded(
            "list_user_progress",
            self.inner.list_user_progress(tenant_id, user_id),
        )
        .await
    }

    async fn list_achievement_progress(
        &self,
        tenant_id: &str,
        achievement_id: Uuid,
    ) -> Result<Vec<AchievementProgress>> {
        self.bounded(
            "list_achievement_progress",
            self.inner.list_achievement_progress(tenant_id, achievement_id),
        )
        .await
    }

    async fn save_progress(
        &self,
        progress: &AchievementProgress,
        events: &[OutboxEvent],
    ) -> Result<()> {
        self.bounded("save_progress", self.inner.save_progress(progress, events))
            .await
    }

    async fn get_user_achievement(
        &self,
        tenant_id: &str,
        id: Uuid,
    ) -> Result<Option<UserAchievement>> {
        self.bounded(
            "get_user_achievement",
            self.inner.get_user_achievement(tenant_id, id),
        )
        .await
    }

    async fn list_awards_for(
        &self,
        tenant_id: &str,
        user_id: &str,
        achievement_id: Uuid,
    ) -> Result<Vec<UserAchievement>> {
        self.bounded(
            "list_awards_for",
            self.inner.list_awards_for(tenant_id, user_id, achievement_id),
        )
        .await
    }

    async fn list_user_achievements(
        &self,
        tenant_id: &str,
        user_id: &str,
    ) -> Result<Vec<UserAchievement>> {
        self.bounded(
            "list_user_achievements",
            self.inner.list_user_achievements(tenant_id, user_id),
        )
        .await
    }

    async fn list_achievement_awards(
        &self,
        tenant_id: &str,
        achievement_id: Uuid,
    ) -> Result<Vec<UserAchievement>> {
        self.bounded(
            "list_achievement_awards",
            self.inner.list_achievement_awards(tenant_id, achievement_id),
        )
        .await
    }

    async fn commit_award(
        &self,
        award: &UserAchievement,
        progress: &AchievementProgress,
        events: &[OutboxEvent],
    ) -> Result<()> {
        self.bounded(
            "commit_award",
            self.inner.commit_award(award, progress, events),
        )
        .await
    }

    async fn commit_revoke(
        &self,
        award: &UserAchievement,
        progress: Option<AchievementProgress>,
        events: &[OutboxEvent],
    ) -> Result<bool> {
        self.bounded(
            "commit_revoke",
            self.inner.commit_revoke(award, progress, events),
        )
        .await
    }

    async fn aggregate_user_points(
        &self,
        tenant_id: &str,
        filter: &LeaderboardFilter,
    ) -> Result<Vec<UserPoints>> {
        self.bounded(
            "aggregate_user_points",
            self.inner.aggregate_user_points(tenant_id, filter),
        )
        .await
    }

    async fn fetch_pending_events(&self, limit: i64) -> Result<Vec<OutboxEvent>> {
        self.bounded("fetch_pending_events", self.inner.fetch_pending_events(limit))
            .await
    }

    async fn mark_events_published(&self, ids: &[Uuid]) -> Result<()> {
        self.bounded("mark_events_published", self.inner.mark_events_published(ids))
            .await
    }
}
