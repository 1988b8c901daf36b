//! 成就引擎门面
//!
//! 对外暴露全部公开操作（租户 id 显式传入），组装各服务并在写操作提交后：
//! - 在后台任务中尝试投递 outbox 事件（失败只记录，后台轮询会补投）
//! - 颁发与撤销后清除租户排行榜缓存

use std::sync::Arc;

use achievement_shared::cache::Cache;
use achievement_shared::config::EngineConfig;
use tracing::warn;
use uuid::Uuid;

use crate::error::Result;
use crate::events::{EventSink, OutboxDispatcher};
use crate::lock::{LockConfig, LockManager};
use crate::models::{Achievement, AchievementPrerequisite, LeaderboardFilter, UserAchievement};
use crate::repository::AchievementStore;
use crate::service::{
    AchievementDetail, AchievementFilter, AchievementSort, AchievementStatistics, AwardCommand,
    AwardService, CatalogService, CreateAchievementCommand, LeaderboardEntry, PageRequest,
    PageResponse, PrerequisiteCheck, PrerequisiteResolver, ProgressFilter, ProgressOutcome,
    ProgressTracker, ProgressView, QueryService, RemovalOutcome, RevokeService, SortDirection,
    UpdateAchievementCommand, UpdateProgressCommand, UserAchievementFilter, UserAchievementSort,
    UserAchievementView, UserSummary,
};

/// 成就引擎
pub struct AchievementEngine<S: AchievementStore> {
    store: Arc<S>,
    catalog: CatalogService<S>,
    awards: AwardService<S>,
    prerequisites: PrerequisiteResolver<S>,
    revocations: RevokeService<S>,
    queries: QueryService<S>,
    dispatcher: Arc<OutboxDispatcher<S>>,
    default_recent_limit: usize,
    default_near_completion_pct: u8,
}

impl<S: AchievementStore + 'static> AchievementEngine<S> {
    pub fn new(
        store: Arc<S>,
        sink: Arc<dyn EventSink>,
        locks: Arc<LockManager>,
        config: &EngineConfig,
    ) -> Self {
        let tracker = Arc::new(ProgressTracker::new(
            store.clone(),
            locks.clone(),
            config.max_progress,
        ));

        Self {
            catalog: CatalogService::new(store.clone()),
            awards: AwardService::new(
                store.clone(),
                locks.clone(),
                tracker,
                config.max_progress,
            ),
            prerequisites: PrerequisiteResolver::new(store.clone()),
            revocations: RevokeService::new(store.clone(), locks),
            queries: QueryService::new(store.clone()),
            dispatcher: Arc::new(OutboxDispatcher::new(
                store.clone(),
                sink,
                config.outbox_batch_size,
                config.outbox_poll_interval(),
            )),
            store,
            default_recent_limit: config.default_recent_limit,
            default_near_completion_pct: config.default_near_completion_pct,
        }
    }

    /// 单进程默认组装：仅本地锁
    pub fn local(store: Arc<S>, sink: Arc<dyn EventSink>, config: &EngineConfig) -> Self {
        let locks = Arc::new(LockManager::local_only(LockConfig::from(config)));
        Self::new(store, sink, locks, config)
    }

    /// 启用排行榜缓存，ttl 为 None 时不缓存
    pub fn with_leaderboard_cache(mut self, cache: Arc<Cache>, config: &EngineConfig) -> Self {
        if let Some(ttl) = config.leaderboard_cache_ttl() {
            self.queries = self.queries.with_cache(cache, ttl);
        }
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn dispatcher(&self) -> Arc<OutboxDispatcher<S>> {
        self.dispatcher.clone()
    }

    /// 提交后在独立任务中投递，请求不等待下游
    fn after_commit(&self) {
        let dispatcher = self.dispatcher.clone();
        tokio::spawn(async move {
            if let Err(e) = dispatcher.try_dispatch_pending().await {
                warn!(error = %e, "提交后投递事件失败，等待后台补投");
            }
        });
    }

    // ==================== 目录管理 ====================

    pub async fn create_achievement(
        &self,
        tenant_id: &str,
        cmd: CreateAchievementCommand,
        actor: Option<&str>,
    ) -> Result<AchievementDetail> {
        let detail = self.catalog.create_achievement(tenant_id, cmd, actor).await?;
        self.after_commit();
        Ok(detail)
    }

    pub async fn update_achievement(
        &self,
        tenant_id: &str,
        achievement_id: Uuid,
        cmd: UpdateAchievementCommand,
        actor: Option<&str>,
    ) -> Result<Achievement> {
        let achievement = self
            .catalog
            .update_achievement(tenant_id, achievement_id, cmd, actor)
            .await?;
        self.after_commit();
        Ok(achievement)
    }

    pub async fn deactivate_or_delete_achievement(
        &self,
        tenant_id: &str,
        achievement_id: Uuid,
        actor: Option<&str>,
    ) -> Result<RemovalOutcome> {
        let outcome = self
            .catalog
            .deactivate_or_delete(tenant_id, achievement_id, actor)
            .await?;
        self.after_commit();
        Ok(outcome)
    }

    pub async fn get_achievement(
        &self,
        tenant_id: &str,
        achievement_id: Uuid,
        include_levels: bool,
        include_prerequisites: bool,
    ) -> Result<AchievementDetail> {
        self.catalog
            .get_achievement(
                tenant_id,
                achievement_id,
                include_levels,
                include_prerequisites,
            )
            .await
    }

    pub async fn list_achievements(
        &self,
        tenant_id: &str,
        filter: &AchievementFilter,
        sort: AchievementSort,
        direction: SortDirection,
        page: PageRequest,
    ) -> Result<PageResponse<Achievement>> {
        self.queries
            .list_achievements(tenant_id, filter, sort, direction, page)
            .await
    }

    // ==================== 前置条件 ====================

    pub async fn add_prerequisite(
        &self,
        tenant_id: &str,
        achievement_id: Uuid,
        prerequisite_id: Uuid,
        requires_completion: bool,
    ) -> Result<AchievementPrerequisite> {
        self.prerequisites
            .add_prerequisite(tenant_id, achievement_id, prerequisite_id, requires_completion)
            .await
    }

    pub async fn remove_prerequisite(
        &self,
        tenant_id: &str,
        achievement_id: Uuid,
        prerequisite_id: Uuid,
    ) -> Result<bool> {
        self.prerequisites
            .remove_prerequisite(tenant_id, achievement_id, prerequisite_id)
            .await
    }

    pub async fn check_prerequisites(
        &self,
        tenant_id: &str,
        user_id: &str,
        achievement_id: Uuid,
    ) -> Result<PrerequisiteCheck> {
        self.prerequisites
            .check_prerequisites(tenant_id, user_id, achievement_id)
            .await
    }

    // ==================== 颁发、进度与撤销 ====================

    pub async fn award(&self, cmd: &AwardCommand) -> Result<UserAchievement> {
        let award = self.awards.award(cmd).await?;
        self.after_commit();
        self.queries.invalidate_leaderboard(&cmd.tenant_id).await;
        Ok(award)
    }

    pub async fn update_progress(&self, cmd: &UpdateProgressCommand) -> Result<ProgressOutcome> {
        let outcome = self.awards.update_achievement_progress(cmd).await?;
        self.after_commit();
        if outcome.award.is_some() {
            self.queries.invalidate_leaderboard(&cmd.tenant_id).await;
        }
        Ok(outcome)
    }

    pub async fn revoke(
        &self,
        tenant_id: &str,
        user_achievement_id: Uuid,
        reason: Option<&str>,
        revoked_by: Option<&str>,
    ) -> Result<UserAchievement> {
        let revoked = self
            .revocations
            .revoke(tenant_id, user_achievement_id, reason, revoked_by)
            .await?;
        self.after_commit();
        self.queries.invalidate_leaderboard(tenant_id).await;
        Ok(revoked)
    }

    // ==================== 查询 ====================

    pub async fn list_user_achievements(
        &self,
        tenant_id: &str,
        user_id: &str,
        filter: &UserAchievementFilter,
        sort: UserAchievementSort,
        direction: SortDirection,
        page: PageRequest,
    ) -> Result<PageResponse<UserAchievementView>> {
        self.queries
            .list_user_achievements(tenant_id, user_id, filter, sort, direction, page)
            .await
    }

    pub async fn get_user_progress(
        &self,
        tenant_id: &str,
        user_id: &str,
        filter: &ProgressFilter,
    ) -> Result<Vec<ProgressView>> {
        self.queries
            .get_user_progress(tenant_id, user_id, filter)
            .await
    }

    /// 未指定时使用配置中的最近条数与接近完成阈值
    pub async fn get_user_summary(
        &self,
        tenant_id: &str,
        user_id: &str,
        recent_limit: Option<usize>,
        near_completion_pct: Option<u8>,
    ) -> Result<UserSummary> {
        self.queries
            .get_user_summary(
                tenant_id,
                user_id,
                recent_limit.unwrap_or(self.default_recent_limit),
                near_completion_pct.unwrap_or(self.default_near_completion_pct),
            )
            .await
    }

    pub async fn list_available_achievements(
        &self,
        tenant_id: &str,
        user_id: &str,
        filter: &AchievementFilter,
        page: PageRequest,
    ) -> Result<PageResponse<Achievement>> {
        self.queries
            .list_available_achievements(tenant_id, user_id, filter, page)
            .await
    }

    pub async fn get_leaderboard(
        &self,
        tenant_id: &str,
        filter: &LeaderboardFilter,
        limit: usize,
    ) -> Result<Vec<LeaderboardEntry>> {
        self.queries.get_leaderboard(tenant_id, filter, limit).await
    }

    pub async fn get_statistics(
        &self,
        tenant_id: &str,
        achievement_id: Uuid,
    ) -> Result<AchievementStatistics> {
        self.queries.get_statistics(tenant_id, achievement_id).await
    }
}
