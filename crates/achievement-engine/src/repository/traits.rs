//! 存储 Trait 定义
//!
//! 服务层依赖抽象而非具体实现，支持内存实现、PostgreSQL 实现与 mock 测试。
//!
//! 需要原子性的写操作都接收 `events` 参数：事件与状态变更在同一事务内写入
//! outbox，提交成功即保证事件最终会被投递。

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::events::OutboxEvent;
use crate::models::{
    Achievement, AchievementLevel, AchievementPrerequisite, AchievementProgress,
    LeaderboardFilter, UserAchievement, UserPoints,
};

/// 成就存储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AchievementStore: Send + Sync {
    // ==================== 成就目录 ====================

    async fn get_achievement(&self, tenant_id: &str, id: Uuid) -> Result<Option<Achievement>>;
    async fn list_achievements(&self, tenant_id: &str) -> Result<Vec<Achievement>>;
    async fn find_achievement_by_name(
        &self,
        tenant_id: &str,
        name: &str,
    ) -> Result<Option<Achievement>>;

    /// 名称冲突时返回 `DuplicateName`
    async fn insert_achievement(
        &self,
        achievement: &Achievement,
        levels: &[AchievementLevel],
        events: &[OutboxEvent],
    ) -> Result<()>;

    /// `levels` 为 Some 时整体替换等级列表
    async fn update_achievement(
        &self,
        achievement: &Achievement,
        levels: Option<Vec<AchievementLevel>>,
        events: &[OutboxEvent],
    ) -> Result<()>;

    /// 仅当没有任何颁发记录时删除（连同等级、前置边和进度），返回是否删除
    async fn delete_achievement_if_unearned(
        &self,
        tenant_id: &str,
        id: Uuid,
        events: &[OutboxEvent],
    ) -> Result<bool>;

    // ==================== 等级与前置条件 ====================

    async fn list_levels(&self, tenant_id: &str, achievement_id: Uuid)
    -> Result<Vec<AchievementLevel>>;
    async fn list_prerequisites(
        &self,
        tenant_id: &str,
        achievement_id: Uuid,
    ) -> Result<Vec<AchievementPrerequisite>>;
    async fn list_all_prerequisites(&self, tenant_id: &str)
    -> Result<Vec<AchievementPrerequisite>>;
    /// 同一条边已存在时不做任何修改
    async fn insert_prerequisite(&self, edge: &AchievementPrerequisite) -> Result<()>;
    async fn delete_prerequisite(
        &self,
        tenant_id: &str,
        achievement_id: Uuid,
        prerequisite_id: Uuid,
    ) -> Result<bool>;

    // ==================== 进度 ====================

    async fn get_progress(
        &self,
        tenant_id: &str,
        user_id: &str,
        achievement_id: Uuid,
    ) -> Result<Option<AchievementProgress>>;
    async fn list_user_progress(
        &self,
        tenant_id: &str,
        user_id: &str,
    ) -> Result<Vec<AchievementProgress>>;
    async fn list_achievement_progress(
        &self,
        tenant_id: &str,
        achievement_id: Uuid,
    ) -> Result<Vec<AchievementProgress>>;
    /// 按 (tenant, user, achievement) upsert
    async fn save_progress(
        &self,
        progress: &AchievementProgress,
        events: &[OutboxEvent],
    ) -> Result<()>;

    // ==================== 颁发记录 ====================

    async fn get_user_achievement(
        &self,
        tenant_id: &str,
        id: Uuid,
    ) -> Result<Option<UserAchievement>>;
    async fn list_awards_for(
        &self,
        tenant_id: &str,
        user_id: &str,
        achievement_id: Uuid,
    ) -> Result<Vec<UserAchievement>>;
    async fn list_user_achievements(
        &self,
        tenant_id: &str,
        user_id: &str,
    ) -> Result<Vec<UserAchievement>>;
    async fn list_achievement_awards(
        &self,
        tenant_id: &str,
        achievement_id: Uuid,
    ) -> Result<Vec<UserAchievement>>;

    /// 原子写入颁发记录、进度行与事件
    ///
    /// 颁发记录在 (tenant, user, achievement, earn_count) 上唯一，
    /// 冲突时整体回滚并返回 `AlreadyEarned`。
    async fn commit_award(
        &self,
        award: &UserAchievement,
        progress: &AchievementProgress,
        events: &[OutboxEvent],
    ) -> Result<()>;

    /// 原子删除颁发记录、更新进度行（若有）并写入事件，记录不存在时返回 false
    async fn commit_revoke(
        &self,
        award: &UserAchievement,
        progress: Option<AchievementProgress>,
        events: &[OutboxEvent],
    ) -> Result<bool>;

    /// 按用户聚合分值与数量（未排序）
    async fn aggregate_user_points(
        &self,
        tenant_id: &str,
        filter: &LeaderboardFilter,
    ) -> Result<Vec<UserPoints>>;

    // ==================== Outbox ====================

    /// 按创建顺序取出未发布事件
    async fn fetch_pending_events(&self, limit: i64) -> Result<Vec<OutboxEvent>>;
    async fn mark_events_published(&self, ids: &[Uuid]) -> Result<()>;
}
